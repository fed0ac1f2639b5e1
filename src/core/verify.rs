// This module implements the verifier that gates lowering of a multi-entry body. It runs
// over a finalized body and the entries registered against it, checking in a fixed order
// and stopping at the first violation: entry blocks belong to the body; each block ends in
// exactly one terminator with merge nodes only at its head; every block is reached by some
// entry and no block is reached by a strict subset of two or more entries; every merge node
// names exactly the computed predecessors of its block; operand and return types agree; and
// entry arguments never escape the exclusive prologue of their entry, except as the incoming
// value of a merge edge leaving that prologue. An instruction result may only be used where
// every entry reaching the use also reaches its defining block. Reachability, predecessors and regions come
// from ControlFlow. verify_module checks every finalized body of a module in parallel with
// rayon, since verification only reads the frozen graph.

//! Structural and dataflow verification of multi-entry bodies.

use log::{debug, warn};
use rayon::prelude::*;

use super::body::{Block, BodyId, FrozenBody, MultiEntryBody};
use super::cfg::{ControlFlow, Region};
use super::error::{VerificationError, VerificationResult};
use super::inst::{InstKind, Instruction};
use super::module::Module;
use super::types::Type;
use super::value::{Value, ValueKind};

/// Verify one finalized body, reporting the first violation.
pub fn verify(module: &Module, body: FrozenBody) -> VerificationResult<()> {
    let owner = module
        .body(body.id())
        .ok_or(VerificationError::UnknownBody(body.id().0))?;
    Verifier {
        module,
        id: body.id(),
        owner,
    }
    .run()
}

/// Verify every finalized body of `module`, in body order.
pub fn verify_module(module: &Module) -> Vec<(FrozenBody, VerificationResult<()>)> {
    let mut results: Vec<_> = module
        .frozen_bodies()
        .into_par_iter()
        .map(|body| (body, verify(module, body)))
        .collect();
    results.sort_by_key(|(body, _)| *body);
    results
}

impl Module {
    /// Shorthand for [`verify`].
    pub fn verify(&self, body: FrozenBody) -> VerificationResult<()> {
        verify(self, body)
    }

    /// Shorthand for [`verify_module`].
    pub fn verify_all(&self) -> Vec<(FrozenBody, VerificationResult<()>)> {
        verify_module(self)
    }
}

struct Verifier<'a> {
    module: &'a Module,
    id: BodyId,
    owner: &'a MultiEntryBody,
}

impl<'a> Verifier<'a> {
    fn run(&self) -> VerificationResult<()> {
        self.check_entry_blocks()?;
        self.check_block_shapes()?;
        let cfg = ControlFlow::compute(self.module, self.id);
        self.check_reachability(&cfg)?;
        self.check_merges(&cfg)?;
        self.check_types(&cfg)?;
        self.check_value_scopes(&cfg)?;
        debug!(
            "verified body {}: {} blocks, {} entries",
            self.owner.name(),
            self.owner.block_count(),
            self.owner.entries().len()
        );
        Ok(())
    }

    fn body_name(&self) -> String {
        self.owner.name().to_string()
    }

    fn block_name(&self, block: Block) -> String {
        self.module.block_name(block).to_string()
    }

    fn blocks(&self) -> impl Iterator<Item = (Block, &'a [Instruction])> + '_ {
        self.owner
            .blocks()
            .iter()
            .enumerate()
            .map(move |(index, block)| {
                (
                    Block {
                        body: self.id,
                        index: index as u32,
                    },
                    block.instructions(),
                )
            })
    }

    fn type_name(&self, ty: Type) -> String {
        self.module.type_name(ty)
    }

    // ==== 1. ENTRY BLOCKS ====

    fn check_entry_blocks(&self) -> VerificationResult<()> {
        for &entry in self.owner.entries() {
            let bound = self
                .module
                .entry(entry)
                .and_then(|point| point.binding())
                .is_some_and(|block| block.body == self.id && block.index() < self.owner.block_count());
            if !bound {
                return Err(VerificationError::ForeignEntryBlock {
                    body: self.body_name(),
                    entry: self.module.entry_name(entry).to_string(),
                });
            }
        }
        Ok(())
    }

    // ==== 2. TERMINATORS AND MERGE PLACEMENT ====

    fn check_block_shapes(&self) -> VerificationResult<()> {
        for (block, insts) in self.blocks() {
            let Some((last, head)) = insts.split_last() else {
                return Err(VerificationError::MissingTerminator {
                    body: self.body_name(),
                    block: self.block_name(block),
                });
            };
            if head.iter().any(|inst| inst.kind.is_terminator()) {
                return Err(VerificationError::MisplacedTerminator {
                    body: self.body_name(),
                    block: self.block_name(block),
                });
            }
            if !last.kind.is_terminator() {
                return Err(VerificationError::MissingTerminator {
                    body: self.body_name(),
                    block: self.block_name(block),
                });
            }
            let leading = insts.iter().take_while(|inst| inst.kind.is_merge()).count();
            if insts[leading..].iter().any(|inst| inst.kind.is_merge()) {
                return Err(VerificationError::MisplacedMerge {
                    body: self.body_name(),
                    block: self.block_name(block),
                });
            }
        }
        Ok(())
    }

    // ==== 3. REACHABILITY ====

    fn check_reachability(&self, cfg: &ControlFlow) -> VerificationResult<()> {
        if !cfg.converges() {
            warn!(
                "body {}: its {} entries never reach a common block",
                self.owner.name(),
                cfg.entries().len()
            );
        }
        if let Some((block, _)) = cfg.blocks().find(|(_, region)| !region.is_reachable()) {
            return Err(VerificationError::UnreachableBlock {
                body: self.body_name(),
                block: self.block_name(block),
            });
        }
        if let Some((block, _)) = cfg.blocks().find(|(_, region)| *region == Region::Partial) {
            return Err(VerificationError::OverlappingPrologue {
                body: self.body_name(),
                block: self.block_name(block),
                entries: cfg
                    .reaching(block)
                    .iter()
                    .map(|&entry| self.module.entry_name(entry).to_string())
                    .collect(),
            });
        }
        Ok(())
    }

    // ==== 4. MERGE PREDECESSORS ====

    fn check_merges(&self, cfg: &ControlFlow) -> VerificationResult<()> {
        for (block, insts) in self.blocks() {
            let entered: Vec<String> = cfg
                .entries()
                .iter()
                .filter(|(_, start)| *start == block)
                .map(|&(entry, _)| format!("entry {}", self.module.entry_name(entry)))
                .collect();
            for inst in insts.iter().take_while(|inst| inst.kind.is_merge()) {
                let InstKind::Merge { incoming, .. } = &inst.kind else {
                    continue;
                };
                let preds = cfg.preds(block);
                let mut declared: Vec<Block> = Vec::with_capacity(incoming.len());
                let mut unexpected = Vec::new();
                for &(pred, _) in incoming {
                    if declared.contains(&pred) || !preds.contains(&pred) {
                        unexpected.push(self.block_name(pred));
                    }
                    declared.push(pred);
                }
                // an entry edge carries no value into a merge
                let mut missing = entered.clone();
                missing.extend(
                    preds
                        .iter()
                        .filter(|pred| !declared.contains(pred))
                        .map(|&pred| self.block_name(pred)),
                );
                if !missing.is_empty() || !unexpected.is_empty() {
                    return Err(VerificationError::MergeMismatch {
                        body: self.body_name(),
                        block: self.block_name(block),
                        missing,
                        unexpected,
                    });
                }
            }
        }
        Ok(())
    }

    // ==== 5. TYPES ====

    fn mismatch(&self, block: Block, inst: usize, expected: String, found: Type) -> VerificationError {
        VerificationError::TypeMismatch {
            body: self.body_name(),
            block: self.block_name(block),
            inst,
            expected,
            found: self.type_name(found),
        }
    }

    /// Type stored in the slot `ptr` addresses, if `ptr` is a slot of this body.
    fn slot_type(&self, ptr: Value) -> Option<Type> {
        match self.module.value_kind(ptr) {
            ValueKind::Slot { body, index } if body == self.id => {
                self.owner.slots().get(index as usize).map(|slot| slot.ty())
            }
            _ => None,
        }
    }

    fn check_types(&self, cfg: &ControlFlow) -> VerificationResult<()> {
        let types = self.module.types();
        for (block, insts) in self.blocks() {
            for (index, inst) in insts.iter().enumerate() {
                let ty = |value: Value| self.module.value_type(value);
                match &inst.kind {
                    InstKind::Binary { lhs, rhs, .. } | InstKind::Icmp { lhs, rhs, .. } => {
                        if !types.is_int(ty(*lhs)) {
                            return Err(self.mismatch(block, index, "an integer".into(), ty(*lhs)));
                        }
                        if ty(*rhs) != ty(*lhs) {
                            return Err(self.mismatch(block, index, self.type_name(ty(*lhs)), ty(*rhs)));
                        }
                    }
                    InstKind::Load { ty: loaded, ptr } => {
                        if !types.is_ptr(ty(*ptr)) {
                            return Err(self.mismatch(block, index, "ptr".into(), ty(*ptr)));
                        }
                        if !types.is_int(*loaded) && !types.is_ptr(*loaded) {
                            return Err(self.mismatch(block, index, "an integer or ptr".into(), *loaded));
                        }
                        if let Some(stored) = self.slot_type(*ptr).filter(|&stored| stored != *loaded) {
                            return Err(self.mismatch(block, index, self.type_name(stored), *loaded));
                        }
                    }
                    InstKind::Store { value, ptr } => {
                        if !types.is_ptr(ty(*ptr)) {
                            return Err(self.mismatch(block, index, "ptr".into(), ty(*ptr)));
                        }
                        if let Some(stored) = self.slot_type(*ptr).filter(|&stored| stored != ty(*value)) {
                            return Err(self.mismatch(block, index, self.type_name(stored), ty(*value)));
                        }
                    }
                    InstKind::Merge { ty: merged, incoming } => {
                        if let Some(&(_, value)) = incoming.iter().find(|(_, value)| ty(*value) != *merged) {
                            return Err(self.mismatch(block, index, self.type_name(*merged), ty(value)));
                        }
                    }
                    InstKind::CondBr { cond, .. } => {
                        if types.int_bits(ty(*cond)) != Some(1) {
                            return Err(self.mismatch(block, index, "i1".into(), ty(*cond)));
                        }
                    }
                    InstKind::Ret { value } => self.check_return(cfg, block, *value)?,
                    InstKind::Br { .. } => {}
                }
            }
        }
        Ok(())
    }

    /// The returned type must match every entry that can reach `block`.
    fn check_return(&self, cfg: &ControlFlow, block: Block, value: Option<Value>) -> VerificationResult<()> {
        let found = value.map(|value| self.module.value_type(value));
        for &entry in cfg.reaching(block) {
            let Some(point) = self.module.entry(entry) else {
                continue;
            };
            let matches = match found {
                Some(ty) => ty == point.ret(),
                None => self.module.types().is_void(point.ret()),
            };
            if !matches {
                return Err(VerificationError::ReturnMismatch {
                    body: self.body_name(),
                    block: self.block_name(block),
                    entry: point.name().to_string(),
                    expected: self.type_name(point.ret()),
                    found: found.map_or_else(|| "void".to_string(), |ty| self.type_name(ty)),
                });
            }
        }
        Ok(())
    }

    // ==== 6. VALUE SCOPES ====

    fn check_value_scopes(&self, cfg: &ControlFlow) -> VerificationResult<()> {
        for (block, insts) in self.blocks() {
            for (index, inst) in insts.iter().enumerate() {
                for value in inst.kind.operands() {
                    let foreign = match self.module.value_kind(value) {
                        ValueKind::Slot { body, .. } => body != self.id,
                        ValueKind::Inst { block: def, .. } => def.body != self.id,
                        ValueKind::Const(_) | ValueKind::Arg { .. } => false,
                    };
                    if foreign {
                        return Err(VerificationError::ForeignValue {
                            body: self.body_name(),
                            block: self.block_name(block),
                            inst: index,
                        });
                    }
                }

                // merge incoming values flow along the edge from their predecessor
                let uses: Vec<(Block, Value)> = match &inst.kind {
                    InstKind::Merge { incoming, .. } => incoming.clone(),
                    kind => kind.operands().into_iter().map(|value| (block, value)).collect(),
                };
                for (site, value) in uses {
                    match self.module.value_kind(value) {
                        ValueKind::Arg { entry, .. } if !cfg.is_exclusive_to(site, entry) => {
                            return Err(VerificationError::ArgumentLeak {
                                body: self.body_name(),
                                entry: self.module.entry_name(entry).to_string(),
                                block: self.block_name(block),
                            });
                        }
                        // every entry reaching the use must have run the definition
                        ValueKind::Inst { block: def, .. } => {
                            let defined = cfg.reaching(def);
                            if let Some(&entry) =
                                cfg.reaching(site).iter().find(|entry| !defined.contains(entry))
                            {
                                return Err(VerificationError::ValueLeak {
                                    body: self.body_name(),
                                    entry: self.module.entry_name(entry).to_string(),
                                    def: self.block_name(def),
                                    block: self.block_name(block),
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::Cursor;

    fn single_entry(ret_bits: u32) -> (Module, BodyId, Block) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut module = Module::new("m");
        let body = module.create_body("f");
        let start = module.add_block(body, "start").unwrap();
        let ret = module.int_type(ret_bits);
        let entry = module.create_entry("f", &[ret], ret);
        module.register_entry(body, entry, start).unwrap();
        (module, body, start)
    }

    #[test]
    fn test_empty_block_is_missing_terminator() {
        let (mut module, body, _) = single_entry(32);
        let frozen = module.finalize(body).unwrap();
        assert!(matches!(
            verify(&module, frozen),
            Err(VerificationError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn test_merge_after_instruction_is_misplaced() {
        let (mut module, body, start) = single_entry(32);
        let i32_ty = module.i32();
        let one = module.const_int(i32_ty, 1);
        let mut cursor = Cursor::at(start);
        let sum = cursor.add(&mut module, one, one).unwrap();
        cursor.merge(&mut module, i32_ty, &[]).unwrap();
        cursor.ret(&mut module, Some(sum)).unwrap();
        let frozen = module.finalize(body).unwrap();

        let err = verify(&module, frozen).unwrap_err();
        assert_eq!(
            err,
            VerificationError::MisplacedMerge {
                body: "f".into(),
                block: "start".into()
            }
        );
    }

    #[test]
    fn test_return_width_must_match_entry() {
        let (mut module, body, start) = single_entry(32);
        let i64_ty = module.i64();
        let wide = module.const_int(i64_ty, 1);
        Cursor::at(start).ret(&mut module, Some(wide)).unwrap();
        let frozen = module.finalize(body).unwrap();

        match verify(&module, frozen) {
            Err(VerificationError::ReturnMismatch { expected, found, .. }) => {
                assert_eq!(expected, "i32");
                assert_eq!(found, "i64");
            }
            other => panic!("expected return mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_slot_access_must_use_slot_type() {
        let (mut module, body, start) = single_entry(32);
        let i32_ty = module.i32();
        let i64_ty = module.i64();
        let slot = module.add_slot(body, "x", i32_ty).unwrap();
        let mut cursor = Cursor::at(start);
        cursor.load(&mut module, i64_ty, slot).unwrap();
        let zero = module.const_int(i32_ty, 0);
        cursor.ret(&mut module, Some(zero)).unwrap();
        let frozen = module.finalize(body).unwrap();

        assert!(matches!(
            verify(&module, frozen),
            Err(VerificationError::TypeMismatch { inst: 0, .. })
        ));
    }

    #[test]
    fn test_verify_module_reports_each_body_in_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut module = Module::new("m");
        let void = module.void_type();
        let mut frozen = Vec::new();
        for name in ["good", "bad", "also_good"] {
            let body = module.create_body(name);
            let start = module.add_block(body, "start").unwrap();
            let entry = module.create_entry(name, &[], void);
            module.register_entry(body, entry, start).unwrap();
            if name != "bad" {
                Cursor::at(start).ret(&mut module, None).unwrap();
            }
            frozen.push(module.finalize(body).unwrap());
        }

        let results = verify_module(&module);
        let order: Vec<_> = results.iter().map(|(body, _)| *body).collect();
        assert_eq!(order, frozen);
        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[1].1,
            Err(VerificationError::MissingTerminator { .. })
        ));
        assert!(results[2].1.is_ok());
    }
}
