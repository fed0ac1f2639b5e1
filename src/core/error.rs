// This module defines the error taxonomy for building, verifying and lowering multi-entry
// bodies, using the thiserror crate. ConstructionError covers every synchronous failure of
// the builder API: mutating a frozen body, registering an entry twice, binding an entry to a
// block of another body, clashing external names, and out-of-range argument access.
// VerificationError is the single first-violation diagnostic of the verifier; every variant
// carries the body name together with the offending block or entry name so tooling can
// localize the fault. LoweringError wraps either a verification failure discovered when
// lowering is attempted or an opaque backend failure, which is fatal for that body.

//! Error types for construction, verification and lowering.

use thiserror::Error;

/// Failure of a construction-phase operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("body {body} is unknown or already finalized")]
    InvalidBody { body: String },

    #[error("entry `{entry}` is already registered")]
    AlreadyRegistered { entry: String },

    #[error("block `{block}` belongs to body `{owner}`, expected body `{expected}`")]
    ForeignBlock {
        block: String,
        owner: String,
        expected: String,
    },

    #[error("an entry named `{name}` is already registered in module `{module}`")]
    DuplicateName { name: String, module: String },

    #[error("entry `{entry}` has {arity} parameters, argument {index} is out of range")]
    ArityError {
        entry: String,
        index: usize,
        arity: usize,
    },

    #[error("unknown entry handle {0}")]
    UnknownEntry(u32),

    #[error("unknown block handle {index} in body `{body}`")]
    UnknownBlock { body: String, index: u32 },

    #[error("unknown value handle {0}")]
    UnknownValue(u32),

    #[error("value {0} is not a merge node")]
    NotAMerge(u32),

    #[error("`{0}` does not define a value")]
    NotADefinition(&'static str),

    #[error("cursor has no insertion point")]
    NoInsertionPoint,
}

/// First violation found by the verifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("body handle {0} does not belong to this module")]
    UnknownBody(u32),

    #[error("{body}: entry `{entry}` is bound to a block outside this body")]
    ForeignEntryBlock { body: String, entry: String },

    #[error("{body}: block `{block}` does not end in a terminator")]
    MissingTerminator { body: String, block: String },

    #[error("{body}: block `{block}` has a terminator before its last instruction")]
    MisplacedTerminator { body: String, block: String },

    #[error("{body}: block `{block}` has a merge node after a non-merge instruction")]
    MisplacedMerge { body: String, block: String },

    #[error("{body}: block `{block}` is not reachable from any entry")]
    UnreachableBlock { body: String, block: String },

    #[error("{body}: block `{block}` is reached by entries {entries:?} but not by all entries")]
    OverlappingPrologue {
        body: String,
        block: String,
        entries: Vec<String>,
    },

    #[error(
        "{body}: merge in block `{block}` does not match its predecessors \
         (missing {missing:?}, unexpected {unexpected:?})"
    )]
    MergeMismatch {
        body: String,
        block: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("{body}: instruction {inst} in block `{block}` expects {expected}, found {found}")]
    TypeMismatch {
        body: String,
        block: String,
        inst: usize,
        expected: String,
        found: String,
    },

    #[error("{body}: block `{block}` returns {found} but entry `{entry}` returns {expected}")]
    ReturnMismatch {
        body: String,
        block: String,
        entry: String,
        expected: String,
        found: String,
    },

    #[error("{body}: argument of entry `{entry}` is used in block `{block}` outside its exclusive prologue")]
    ArgumentLeak {
        body: String,
        entry: String,
        block: String,
    },

    #[error("{body}: value defined in block `{def}` is used in block `{block}`, which entry `{entry}` reaches without passing `{def}`")]
    ValueLeak {
        body: String,
        entry: String,
        def: String,
        block: String,
    },

    #[error("{body}: instruction {inst} in block `{block}` uses a value owned by another body")]
    ForeignValue {
        body: String,
        block: String,
        inst: usize,
    },
}

/// Failure while handing a body to a backend.
#[derive(Error, Debug)]
pub enum LoweringError {
    #[error("body failed verification: {0}")]
    Verification(#[from] VerificationError),

    #[error("{backend} backend failed: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type ConstructionResult<T> = Result<T, ConstructionError>;
pub type VerificationResult<T> = Result<T, VerificationError>;
pub type LoweringResult<T> = Result<T, LoweringError>;
