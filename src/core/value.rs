//! SSA values and their definition sites.

use super::body::{Block, BodyId};
use super::entry::EntryId;
use super::types::Type;

/// Handle to a value in the module value arena.
///
/// Values are never owned by their users; instructions refer to them by
/// handle and any number of instructions may consume the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(pub(crate) u32);

impl Value {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// The single definition site of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Integer constant, already normalized to its type width.
    Const(i64),
    /// The `index`-th parameter of an entry.
    Arg { entry: EntryId, index: u32 },
    /// Address of a body-wide stack slot.
    Slot { body: BodyId, index: u32 },
    /// Result of the `index`-th instruction of `block`.
    Inst { block: Block, index: u32 },
}

#[derive(Debug, Clone)]
pub(crate) struct ValueData {
    pub(crate) ty: Type,
    pub(crate) kind: ValueKind,
    pub(crate) name: Option<String>,
}

/// Sign-extend `value` from `bits` wide, `i1` stays 0 or 1.
pub fn normalize_int(value: i64, bits: u32) -> i64 {
    match bits {
        1 => value & 1,
        bits if bits == 0 || bits >= 64 => value,
        _ => {
            let shift = 64 - bits;
            (value << shift) >> shift
        }
    }
}
