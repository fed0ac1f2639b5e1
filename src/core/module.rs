// This module implements Module, the module-equivalent context that owns everything a
// multi-entry body refers to: the type interner, the value arena (constants, entry
// arguments, slot addresses and instruction results), every MultiEntryBody and every
// EntryPoint, plus the registry of external entry names. All mutation goes through
// `&mut Module`, which gives single-writer construction by exclusive borrow instead of a
// lock; verification and lowering only need `&Module` and can run on any thread.
// Construction rejects structural misuse synchronously (frozen bodies, unknown handles,
// blocks of another body used as branch targets) and leaves graph-wide consistency such
// as merge arity or type agreement to the verifier.

//! Module context: ownership root of bodies, entries, types and values.

use hashbrown::HashMap;
use log::debug;

use super::body::{BasicBlock, Block, BodyId, FrozenBody, MultiEntryBody, Slot};
use super::entry::{EntryId, EntryPoint};
use super::error::{ConstructionError, ConstructionResult};
use super::inst::{InstKind, Instruction};
use super::types::{Type, TypeInterner, TypeKind};
use super::value::{normalize_int, Value, ValueData, ValueKind};

/// Ownership root for bodies, entries, types and values.
#[derive(Debug)]
pub struct Module {
    name: String,
    pub(crate) types: TypeInterner,
    pub(crate) values: Vec<ValueData>,
    constants: HashMap<(Type, i64), Value>,
    pub(crate) bodies: Vec<MultiEntryBody>,
    pub(crate) entries: Vec<EntryPoint>,
    pub(crate) registered: HashMap<String, EntryId>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            types: TypeInterner::new(),
            values: Vec::new(),
            constants: HashMap::new(),
            bodies: Vec::new(),
            entries: Vec::new(),
            registered: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ==== TYPES ====

    pub fn types(&self) -> &TypeInterner {
        &self.types
    }

    /// Integer type of `bits` width; `bits` must be in `1..=64`.
    pub fn int_type(&mut self, bits: u32) -> Type {
        assert!((1..=64).contains(&bits), "unsupported integer width {bits}");
        self.types.intern(TypeKind::Int(bits))
    }

    pub fn i1(&mut self) -> Type {
        self.int_type(1)
    }

    pub fn i32(&mut self) -> Type {
        self.int_type(32)
    }

    pub fn i64(&mut self) -> Type {
        self.int_type(64)
    }

    pub fn ptr_type(&mut self) -> Type {
        self.types.intern(TypeKind::Ptr)
    }

    pub fn void_type(&mut self) -> Type {
        self.types.intern(TypeKind::Void)
    }

    pub fn func_type(&mut self, params: &[Type], ret: Type) -> Type {
        self.types.intern(TypeKind::Func {
            params: params.to_vec(),
            ret,
        })
    }

    /// Printable name of a type.
    pub fn type_name(&self, ty: Type) -> String {
        self.types.display(ty).to_string()
    }

    // ==== VALUES ====

    /// Materialize an integer constant; equal constants share one value.
    pub fn const_int(&mut self, ty: Type, value: i64) -> Value {
        let value = self
            .types
            .int_bits(ty)
            .map_or(value, |bits| normalize_int(value, bits));
        if let Some(&existing) = self.constants.get(&(ty, value)) {
            return existing;
        }
        let handle = self.push_value(ty, ValueKind::Const(value));
        self.constants.insert((ty, value), handle);
        handle
    }

    pub(crate) fn push_value(&mut self, ty: Type, kind: ValueKind) -> Value {
        let handle = Value(self.values.len() as u32);
        self.values.push(ValueData {
            ty,
            kind,
            name: None,
        });
        handle
    }

    pub fn contains_value(&self, value: Value) -> bool {
        value.index() < self.values.len()
    }

    /// Type of a value. Panics on a handle from another module.
    pub fn value_type(&self, value: Value) -> Type {
        self.values[value.index()].ty
    }

    /// Definition site of a value. Panics on a handle from another module.
    pub fn value_kind(&self, value: Value) -> ValueKind {
        self.values[value.index()].kind
    }

    pub fn value_name(&self, value: Value) -> Option<&str> {
        self.values.get(value.index())?.name.as_deref()
    }

    /// Attach a debug name to a value.
    pub fn set_value_name(&mut self, value: Value, name: &str) -> ConstructionResult<()> {
        let data = self
            .values
            .get_mut(value.index())
            .ok_or(ConstructionError::UnknownValue(value.raw()))?;
        data.name = Some(name.to_string());
        Ok(())
    }

    // ==== BODIES ====

    /// Allocate an empty shared graph.
    pub fn create_body(&mut self, name: &str) -> BodyId {
        let id = BodyId(self.bodies.len() as u32);
        self.bodies.push(MultiEntryBody::new(name));
        debug!("created body {} ({:?})", name, id);
        id
    }

    pub fn body(&self, id: BodyId) -> Option<&MultiEntryBody> {
        self.bodies.get(id.index())
    }

    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        (0..self.bodies.len() as u32).map(BodyId)
    }

    pub fn body_name(&self, id: BodyId) -> &str {
        self.bodies
            .get(id.index())
            .map_or("<invalid body>", |body| body.name.as_str())
    }

    pub(crate) fn invalid_body(&self, id: BodyId) -> ConstructionError {
        ConstructionError::InvalidBody {
            body: self
                .bodies
                .get(id.index())
                .map_or_else(|| format!("#{}", id.0), |body| body.name.clone()),
        }
    }

    /// Mutable access to a body that is still under construction.
    pub(crate) fn open_body_mut(&mut self, id: BodyId) -> ConstructionResult<&mut MultiEntryBody> {
        let open = self.bodies.get(id.index()).is_some_and(|body| !body.frozen);
        if !open {
            return Err(self.invalid_body(id));
        }
        Ok(&mut self.bodies[id.index()])
    }

    /// Append an empty block to `body`.
    pub fn add_block(&mut self, body: BodyId, name: &str) -> ConstructionResult<Block> {
        let owner = self.open_body_mut(body)?;
        let block = Block {
            body,
            index: owner.blocks.len() as u32,
        };
        owner.blocks.push(BasicBlock::new(name));
        debug!("added block {} to {}", name, self.body_name(body));
        Ok(block)
    }

    /// Add a body-wide slot holding a value of type `ty`, returning its address.
    pub fn add_slot(&mut self, body: BodyId, name: &str, ty: Type) -> ConstructionResult<Value> {
        let index = self.open_body_mut(body)?.slots.len() as u32;
        let ptr = self.ptr_type();
        let value = self.push_value(ptr, ValueKind::Slot { body, index });
        self.values[value.index()].name = Some(name.to_string());
        self.bodies[body.index()].slots.push(Slot {
            name: name.to_string(),
            ty,
            value,
        });
        Ok(value)
    }

    /// Mark `body` immutable. Finalizing twice returns the same handle.
    pub fn finalize(&mut self, body: BodyId) -> ConstructionResult<FrozenBody> {
        let owner = self
            .bodies
            .get_mut(body.index())
            .ok_or_else(|| ConstructionError::InvalidBody {
                body: format!("#{}", body.0),
            })?;
        if !owner.frozen {
            owner.frozen = true;
            debug!(
                "finalized body {} with {} blocks and {} entries",
                owner.name,
                owner.blocks.len(),
                owner.entries.len()
            );
        }
        Ok(FrozenBody(body))
    }

    /// Every finalized body, in creation order.
    pub fn frozen_bodies(&self) -> Vec<FrozenBody> {
        self.body_ids()
            .filter(|id| self.bodies[id.index()].frozen)
            .map(FrozenBody)
            .collect()
    }

    // ==== BLOCKS ====

    pub fn block(&self, block: Block) -> Option<&BasicBlock> {
        self.bodies.get(block.body.index())?.blocks.get(block.index())
    }

    pub fn block_name(&self, block: Block) -> &str {
        self.block(block).map_or("<invalid block>", |b| b.name.as_str())
    }

    fn check_block(&self, block: Block, expected: BodyId) -> ConstructionResult<()> {
        if block.body != expected {
            return Err(ConstructionError::ForeignBlock {
                block: self.block_name(block).to_string(),
                owner: self.body_name(block.body).to_string(),
                expected: self.body_name(expected).to_string(),
            });
        }
        if self.block(block).is_none() {
            return Err(ConstructionError::UnknownBlock {
                body: self.body_name(expected).to_string(),
                index: block.index,
            });
        }
        Ok(())
    }

    fn check_value(&self, value: Value) -> ConstructionResult<()> {
        if self.contains_value(value) {
            Ok(())
        } else {
            Err(ConstructionError::UnknownValue(value.raw()))
        }
    }

    fn validate_inst(&self, block: Block, kind: &InstKind) -> ConstructionResult<()> {
        if self.body(block.body).map_or(true, |body| body.frozen) {
            return Err(self.invalid_body(block.body));
        }
        self.check_block(block, block.body)?;
        for value in kind.operands() {
            self.check_value(value)?;
        }
        match kind {
            InstKind::Br { target } => self.check_block(*target, block.body),
            InstKind::CondBr { then_dest, else_dest, .. } => {
                self.check_block(*then_dest, block.body)?;
                self.check_block(*else_dest, block.body)
            }
            InstKind::Merge { incoming, .. } => incoming
                .iter()
                .try_for_each(|(pred, _)| self.check_block(*pred, block.body)),
            _ => Ok(()),
        }
    }

    fn push_inst(&mut self, block: Block, kind: InstKind, result: Option<Value>) {
        log::trace!(
            "append {} to {}:{}",
            kind.info().name,
            self.body_name(block.body),
            self.block_name(block)
        );
        self.bodies[block.body.index()].blocks[block.index()]
            .insts
            .push(Instruction { kind, result });
    }

    /// Append a value-defining instruction at the end of `block`.
    pub(crate) fn append_def(&mut self, block: Block, kind: InstKind) -> ConstructionResult<Value> {
        self.validate_inst(block, &kind)?;
        let ty = match &kind {
            InstKind::Binary { lhs, .. } => self.value_type(*lhs),
            InstKind::Icmp { .. } => self.i1(),
            InstKind::Load { ty, .. } | InstKind::Merge { ty, .. } => *ty,
            _ => return Err(ConstructionError::NotADefinition(kind.info().name)),
        };
        let index = self.bodies[block.body.index()].blocks[block.index()].insts.len() as u32;
        let value = self.push_value(ty, ValueKind::Inst { block, index });
        self.push_inst(block, kind, Some(value));
        Ok(value)
    }

    /// Append an instruction at the end of `block`, returning its result.
    pub(crate) fn append_inst(
        &mut self,
        block: Block,
        kind: InstKind,
    ) -> ConstructionResult<Option<Value>> {
        if kind.info().is_def {
            return self.append_def(block, kind).map(Some);
        }
        self.validate_inst(block, &kind)?;
        self.push_inst(block, kind, None);
        Ok(None)
    }

    /// Add a `(pred, value)` pair to an existing merge node.
    pub fn add_incoming(&mut self, merge: Value, pred: Block, value: Value) -> ConstructionResult<()> {
        self.check_value(merge)?;
        self.check_value(value)?;
        let ValueKind::Inst { block, index } = self.value_kind(merge) else {
            return Err(ConstructionError::NotAMerge(merge.raw()));
        };
        self.open_body_mut(block.body)?;
        self.check_block(pred, block.body)?;
        let inst = &mut self.bodies[block.body.index()].blocks[block.index()].insts[index as usize];
        match &mut inst.kind {
            InstKind::Merge { incoming, .. } => {
                incoming.push((pred, value));
                Ok(())
            }
            _ => Err(ConstructionError::NotAMerge(merge.raw())),
        }
    }
}
