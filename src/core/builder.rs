//! Insertion cursor for appending instructions.
//!
//! The cursor is a plain value rather than ambient builder state: it only
//! remembers the block it appends to, and every append takes the module by
//! exclusive reference, so two cursors can never mutate a body at once.

use super::body::Block;
use super::error::{ConstructionError, ConstructionResult};
use super::inst::{BinaryOp, InstKind, IntPredicate};
use super::module::Module;
use super::types::Type;
use super::value::Value;

/// Append position inside one block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cursor {
    block: Option<Block>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(block: Block) -> Self {
        Self { block: Some(block) }
    }

    pub fn set_insertion_point(&mut self, block: Block) {
        self.block = Some(block);
    }

    pub fn block(&self) -> Option<Block> {
        self.block
    }

    /// Append `kind` at the end of the current block.
    pub fn append(&mut self, module: &mut Module, kind: InstKind) -> ConstructionResult<Option<Value>> {
        let block = self.block.ok_or(ConstructionError::NoInsertionPoint)?;
        module.append_inst(block, kind)
    }

    fn append_def(&mut self, module: &mut Module, kind: InstKind) -> ConstructionResult<Value> {
        let block = self.block.ok_or(ConstructionError::NoInsertionPoint)?;
        module.append_def(block, kind)
    }

    pub fn binary(&mut self, module: &mut Module, op: BinaryOp, lhs: Value, rhs: Value) -> ConstructionResult<Value> {
        self.append_def(module, InstKind::Binary { op, lhs, rhs })
    }

    pub fn add(&mut self, module: &mut Module, lhs: Value, rhs: Value) -> ConstructionResult<Value> {
        self.binary(module, BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, module: &mut Module, lhs: Value, rhs: Value) -> ConstructionResult<Value> {
        self.binary(module, BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, module: &mut Module, lhs: Value, rhs: Value) -> ConstructionResult<Value> {
        self.binary(module, BinaryOp::Mul, lhs, rhs)
    }

    pub fn icmp(&mut self, module: &mut Module, pred: IntPredicate, lhs: Value, rhs: Value) -> ConstructionResult<Value> {
        self.append_def(module, InstKind::Icmp { pred, lhs, rhs })
    }

    pub fn load(&mut self, module: &mut Module, ty: Type, ptr: Value) -> ConstructionResult<Value> {
        self.append_def(module, InstKind::Load { ty, ptr })
    }

    pub fn store(&mut self, module: &mut Module, value: Value, ptr: Value) -> ConstructionResult<()> {
        self.append(module, InstKind::Store { value, ptr }).map(|_| ())
    }

    /// Merge node; more pairs can be added with [`Module::add_incoming`].
    pub fn merge(&mut self, module: &mut Module, ty: Type, incoming: &[(Block, Value)]) -> ConstructionResult<Value> {
        self.append_def(
            module,
            InstKind::Merge {
                ty,
                incoming: incoming.to_vec(),
            },
        )
    }

    pub fn br(&mut self, module: &mut Module, target: Block) -> ConstructionResult<()> {
        self.append(module, InstKind::Br { target }).map(|_| ())
    }

    pub fn cond_br(&mut self, module: &mut Module, cond: Value, then_dest: Block, else_dest: Block) -> ConstructionResult<()> {
        self.append(
            module,
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            },
        )
        .map(|_| ())
    }

    pub fn ret(&mut self, module: &mut Module, value: Option<Value>) -> ConstructionResult<()> {
        self.append(module, InstKind::Ret { value }).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::ValueKind;

    #[test]
    fn test_append_without_insertion_point() {
        let mut module = Module::new("m");
        let mut cursor = Cursor::new();
        let err = cursor.ret(&mut module, None).unwrap_err();
        assert_eq!(err, ConstructionError::NoInsertionPoint);
    }

    #[test]
    fn test_results_are_typed_and_placed() {
        let mut module = Module::new("m");
        let body = module.create_body("shared");
        let block = module.add_block(body, "entry").unwrap();
        let i32_ty = module.i32();
        let i1_ty = module.i1();
        let x = module.const_int(i32_ty, 3);
        let y = module.const_int(i32_ty, 4);

        let mut cursor = Cursor::at(block);
        let sum = cursor.add(&mut module, x, y).unwrap();
        let cmp = cursor.icmp(&mut module, IntPredicate::Slt, sum, y).unwrap();
        cursor.ret(&mut module, Some(sum)).unwrap();

        assert_eq!(module.value_type(sum), i32_ty);
        assert_eq!(module.value_type(cmp), i1_ty);
        assert_eq!(module.value_kind(cmp), ValueKind::Inst { block, index: 1 });
        assert_eq!(module.block(block).unwrap().instructions().len(), 3);
        assert!(module.block(block).unwrap().terminator().is_some());
    }

    #[test]
    fn test_append_into_frozen_body_fails() {
        let mut module = Module::new("m");
        let body = module.create_body("shared");
        let block = module.add_block(body, "entry").unwrap();
        module.finalize(body).unwrap();

        let mut cursor = Cursor::at(block);
        let err = cursor.ret(&mut module, None).unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidBody { .. }));
    }

    #[test]
    fn test_builder_permits_ill_formed_shapes() {
        // misplaced merges and missing terminators are left to the verifier
        let mut module = Module::new("m");
        let body = module.create_body("shared");
        let block = module.add_block(body, "entry").unwrap();
        let i32_ty = module.i32();
        let one = module.const_int(i32_ty, 1);

        let mut cursor = Cursor::at(block);
        cursor.add(&mut module, one, one).unwrap();
        cursor.merge(&mut module, i32_ty, &[(block, one)]).unwrap();
        assert_eq!(module.block(block).unwrap().instructions().len(), 2);
    }
}
