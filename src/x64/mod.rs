//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Instruction encoding using iced-x86
//! - System V argument registers and the shared frame layout
//! - The multi-entry lowering backend
//! - ELF object emission

pub mod backend;
pub mod calling_convention;
pub mod elf;
pub mod encoder;

pub use backend::{CompiledBody, CompiledEntry, X64Backend, X64Error, X64Options, X64Result};
pub use calling_convention::{FunctionFrame, SysVAssigner};
pub use elf::{ElfWriter, ObjectError};
pub use encoder::{AsmReg, EncodingError, X64Encoder};
