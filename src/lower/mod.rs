// This module defines the contract between a verified multi-entry body and a code generating
// backend. LoweringPlan is the read-only view a backend receives: the module, the frozen body,
// its blocks in stable creation order with a stable global numbering of instructions, the
// predecessor and successor edge sets, a reverse post-order layout that starts at the first
// registered entry, and the ordered list of (entry, entry block) bindings. A plan can only be
// built for a body that passed verification, so backends may rely on entry-exclusive
// prologues never being reachable from another entry. The lower() driver verifies, builds the
// plan, hands it to a LoweringBackend and maps backend failures into LoweringError without
// returning any partial output.

//! Lowering contract and backends.

pub mod interp;

use log::info;

use crate::core::body::{Block, BodyId, FrozenBody, Slot};
use crate::core::cfg::{ControlFlow, Region};
use crate::core::entry::{EntryId, EntryPoint};
use crate::core::error::{LoweringError, LoweringResult, VerificationResult};
use crate::core::inst::Instruction;
use crate::core::module::Module;
use crate::core::verify::verify;

pub use interp::{ExecError, InterpError, InterpProgram, Interpreter};

/// A code generator for verified bodies.
pub trait LoweringBackend {
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Emit code for every entry of `plan`, all or nothing.
    fn lower(&mut self, plan: &LoweringPlan<'_>) -> Result<Self::Output, Self::Error>;
}

/// Everything a backend may rely on when lowering one body.
#[derive(Debug)]
pub struct LoweringPlan<'m> {
    module: &'m Module,
    body: FrozenBody,
    cfg: ControlFlow,
    blocks: Vec<Block>,
    first_inst: Vec<u32>,
    inst_count: u32,
}

impl<'m> LoweringPlan<'m> {
    /// Verify `body` and build its plan.
    pub fn verified(module: &'m Module, body: FrozenBody) -> VerificationResult<Self> {
        verify(module, body)?;
        let cfg = ControlFlow::compute(module, body.id());
        let blocks: Vec<Block> = cfg.blocks().map(|(block, _)| block).collect();

        let mut first_inst = Vec::with_capacity(blocks.len());
        let mut inst_count = 0u32;
        for &block in &blocks {
            first_inst.push(inst_count);
            inst_count += module
                .block(block)
                .map_or(0, |data| data.instructions().len() as u32);
        }

        Ok(Self {
            module,
            body,
            cfg,
            blocks,
            first_inst,
            inst_count,
        })
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn body(&self) -> FrozenBody {
        self.body
    }

    pub fn body_id(&self) -> BodyId {
        self.body.id()
    }

    pub fn name(&self) -> &'m str {
        self.module.body_name(self.body.id())
    }

    pub fn cfg(&self) -> &ControlFlow {
        &self.cfg
    }

    /// Blocks in creation order; a block's position is its stable number.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Blocks in emission order.
    pub fn layout(&self) -> &[Block] {
        self.cfg.rpo()
    }

    /// Registered entries and their entry blocks, in registration order.
    pub fn bindings(&self) -> &[(EntryId, Block)] {
        self.cfg.entries()
    }

    pub fn entry(&self, id: EntryId) -> Option<&'m EntryPoint> {
        self.module.entry(id)
    }

    pub fn instructions(&self, block: Block) -> &'m [Instruction] {
        self.module
            .block(block)
            .map(|data| data.instructions())
            .unwrap_or_default()
    }

    /// Body-wide stable number of the `index`-th instruction of `block`.
    pub fn inst_number(&self, block: Block, index: usize) -> u32 {
        self.first_inst[block.index()] + index as u32
    }

    pub fn inst_count(&self) -> u32 {
        self.inst_count
    }

    pub fn succs(&self, block: Block) -> &[Block] {
        self.cfg.succs(block)
    }

    pub fn preds(&self, block: Block) -> &[Block] {
        self.cfg.preds(block)
    }

    pub fn region(&self, block: Block) -> Region {
        self.cfg.region(block)
    }

    pub fn slots(&self) -> &'m [Slot] {
        self.module
            .body(self.body.id())
            .map(|body| body.slots())
            .unwrap_or_default()
    }
}

/// Verify `body` and hand it to `backend`.
pub fn lower<B: LoweringBackend>(
    module: &Module,
    body: FrozenBody,
    backend: &mut B,
) -> LoweringResult<B::Output> {
    let plan = LoweringPlan::verified(module, body)?;
    let backend_name = backend.name();
    info!(
        "lowering body {} with the {} backend: {} blocks, {} instructions, {} entries",
        plan.name(),
        backend_name,
        plan.blocks().len(),
        plan.inst_count(),
        plan.bindings().len()
    );
    backend.lower(&plan).map_err(|err| LoweringError::Backend {
        backend: backend_name,
        source: Box::new(err),
    })
}
