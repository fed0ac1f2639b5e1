// This module is the hub of the multi-entry IR: the type interner and value arena of a
// Module, the closed instruction set, blocks and bodies stored as index arenas, entry points
// with their independent signatures, the explicit insertion cursor, the control-flow
// analysis that classifies blocks into entry-exclusive and shared regions, the verifier
// that gates lowering, a textual printer, and the bumpalo-backed session that lowering
// backends allocate in. Construction mutates a Module through exclusive borrows; everything
// after finalize only reads it.

//! Multi-entry IR core.
//!
//! # Phases
//!
//! 1. **Build**: [`Module::create_body`], [`Module::add_block`],
//!    [`Module::create_entry`], [`Module::register_entry`] and a [`Cursor`].
//! 2. **Finalize**: [`Module::finalize`] freezes a body.
//! 3. **Verify**: [`verify`] reports the first violation.
//! 4. **Lower**: see [`crate::lower`].

pub mod body;
pub mod builder;
pub mod cfg;
pub mod entry;
pub mod error;
pub mod inst;
pub mod module;
pub mod printer;
pub mod session;
pub mod types;
pub mod value;
pub mod verify;

pub use body::{BasicBlock, Block, BodyId, FrozenBody, MultiEntryBody, Slot};
pub use builder::Cursor;
pub use cfg::{ControlFlow, Region};
pub use entry::{EntryId, EntryPoint};
pub use error::{
    ConstructionError, ConstructionResult, LoweringError, LoweringResult, VerificationError,
    VerificationResult,
};
pub use inst::{BinaryOp, InstKind, Instruction, IntPredicate, OpInfo};
pub use module::Module;
pub use printer::ModulePrinter;
pub use session::{CompilationSession, SessionStats};
pub use types::{Type, TypeKind};
pub use value::{Value, ValueKind};
pub use verify::{verify, verify_module};
