//! multientry - shared-body functions with several typed entry points.
//!
//! A [`MultiEntryBody`](core::MultiEntryBody) is one control-flow graph that
//! any number of independently typed [`EntryPoint`](core::EntryPoint)s enter
//! at different blocks. Each entry owns an exclusive prologue and every entry
//! converges on shared blocks, where per-entry values arrive through merge
//! nodes or body-wide slots.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use multientry::core::CompilationSession;
//! use multientry::lower::{lower, Interpreter};
//! use multientry::x64::X64Backend;
//!
//! let add = multientry::build_add_module("add").unwrap();
//!
//! let program = lower(&add.module, add.body, &mut Interpreter::new()).unwrap();
//! assert_eq!(program.call("add1", &[3, 4]).unwrap(), Some(7));
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let compiled = lower(&add.module, add.body, &mut X64Backend::new(&session)).unwrap();
//! assert_eq!(compiled.entries.len(), 2);
//! ```
//!
//! # Architecture
//!
//! - [`core`] - IR construction, control-flow analysis, verification, printing
//! - [`lower`] - lowering contract and the interpreting backend
//! - [`x64`] - x86-64 code generation and ELF output

pub mod add_module;
pub mod core;
pub mod lower;
pub mod x64;

pub use crate::add_module::{build_add_module, AddModule};
pub use crate::core::{
    // Construction
    Block, BodyId, Cursor, EntryId, FrozenBody, Module, Type, Value,
    // Instructions
    BinaryOp, InstKind, IntPredicate,
    // Analysis and verification
    ControlFlow, Region, verify, verify_module,
    // Errors
    ConstructionError, LoweringError, VerificationError,
    // Session management
    CompilationSession, SessionStats,
};
pub use crate::lower::{lower, LoweringBackend, LoweringPlan};
