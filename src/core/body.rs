//! Multi-entry bodies and the basic blocks they own.
//!
//! A [`MultiEntryBody`] is an arena: it owns its blocks by stable index and
//! every edge in the graph is expressed as a [`Block`] handle rather than a
//! reference, so back-edges and merge points never form ownership cycles.
//! Predecessors are not stored; they are recomputed on demand by
//! [`ControlFlow`](super::cfg::ControlFlow).

use super::entry::EntryId;
use super::inst::Instruction;
use super::types::Type;
use super::value::Value;

/// Handle to a body owned by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub(crate) u32);

impl BodyId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a block: the owning body plus the block's stable index in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block {
    pub(crate) body: BodyId,
    pub(crate) index: u32,
}

impl Block {
    #[inline]
    pub fn body(self) -> BodyId {
        self.body
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Proof that a body has been finalized and can no longer change.
///
/// Finalizing the same body again yields an equal handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrozenBody(pub(crate) BodyId);

impl FrozenBody {
    #[inline]
    pub fn id(self) -> BodyId {
        self.0
    }
}

/// Ordered instructions ending in one terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) name: String,
    pub(crate) insts: Vec<Instruction>,
}

impl BasicBlock {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            insts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.insts
    }

    /// The last instruction if it is a terminator.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.insts.last().filter(|inst| inst.kind.is_terminator())
    }

    /// Leading merge nodes.
    pub fn merges(&self) -> impl Iterator<Item = &Instruction> {
        self.insts.iter().take_while(|inst| inst.kind.is_merge())
    }

    /// Successors named by the terminator, in operand order.
    pub fn successors(&self) -> Vec<Block> {
        self.terminator()
            .map(|inst| inst.kind.successors())
            .unwrap_or_default()
    }
}

/// Addressable storage shared by every block of a body.
#[derive(Debug, Clone)]
pub struct Slot {
    pub(crate) name: String,
    pub(crate) ty: Type,
    pub(crate) value: Value,
}

impl Slot {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the stored value.
    pub fn ty(&self) -> Type {
        self.ty
    }

    /// The pointer value addressing this slot.
    pub fn value(&self) -> Value {
        self.value
    }
}

/// Shared control-flow graph reachable from one or more entries.
#[derive(Debug, Clone)]
pub struct MultiEntryBody {
    pub(crate) name: String,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) entries: Vec<EntryId>,
    pub(crate) frozen: bool,
}

impl MultiEntryBody {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: Vec::new(),
            slots: Vec::new(),
            entries: Vec::new(),
            frozen: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Registered entries in registration order.
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
