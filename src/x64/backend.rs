// This module lowers a verified multi-entry body to x86-64 machine code. Values are not
// register allocated: every entry argument, instruction result and addressable slot owns an
// 8-byte home in one frame layout that all entries share, and merge nodes additionally own a
// staging home. Each registered entry gets a private stub that builds the frame, moves its
// System V argument registers into the homes of that entry's arguments and jumps to the entry
// block; the blocks themselves are emitted exactly once, in reverse post-order. A predecessor
// edge writes the incoming merge values into the staging homes and the merge block copies
// staging into the merge homes on arrival, so all merges of a block read their inputs before
// any of them is overwritten. Integer homes always hold the value sign-extended from its
// declared width (i1 as 0 or 1), which lets signed and unsigned comparisons run on full
// 64-bit registers. The result is a CompiledBody: one code buffer, one symbol offset and stub
// size per entry, and the offset of every shared block.

//! x86-64 lowering backend.

use hashbrown::HashMap;
use iced_x86::code_asm::CodeLabel;
use log::{debug, trace};
use thiserror::Error;

use crate::core::body::Block;
use crate::core::inst::{InstKind, Instruction};
use crate::core::session::CompilationSession;
use crate::core::value::{Value, ValueKind};
use crate::lower::{LoweringBackend, LoweringPlan};

use super::calling_convention::{FunctionFrame, SysVAssigner};
use super::encoder::{AsmReg, EncodingError, X64Encoder};

/// Error types for the x86-64 backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum X64Error {
    #[error("entry `{entry}` takes {count} parameters, at most {max} fit in registers", max = SysVAssigner::GP_ARG_REGS.len())]
    TooManyArguments { entry: String, count: usize },

    #[error("value {0} has no frame home")]
    UnboundValue(u32),

    #[error("`{0}` instruction has no result value")]
    MissingResult(&'static str),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

pub type X64Result<T> = Result<T, X64Error>;

/// Code generation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X64Options {
    /// Address the code is assembled for.
    pub base_address: u64,
    /// Alignment of each body inside the text section.
    pub function_alignment: u64,
    /// Emit a local symbol covering each shared body.
    pub emit_body_symbols: bool,
}

impl Default for X64Options {
    fn default() -> Self {
        Self {
            base_address: 0,
            function_alignment: 16,
            emit_body_symbols: true,
        }
    }
}

/// One externally callable symbol of a compiled body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledEntry {
    pub name: String,
    /// Offset of the entry stub from the start of the body.
    pub offset: u64,
    pub stub_size: u64,
}

/// Machine code for one body.
#[derive(Debug, Clone)]
pub struct CompiledBody {
    pub name: String,
    pub code: Vec<u8>,
    pub base_address: u64,
    pub frame_size: u32,
    /// Entry symbols in registration order.
    pub entries: Vec<CompiledEntry>,
    /// Shared blocks in layout order.
    pub block_offsets: Vec<(String, u64)>,
}

impl CompiledBody {
    pub fn entry(&self, name: &str) -> Option<&CompiledEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    /// Offset of the first shared block, where the stubs end.
    pub fn shared_offset(&self) -> u64 {
        self.block_offsets
            .first()
            .map_or(self.code.len() as u64, |&(_, offset)| offset)
    }
}

/// x86-64 backend producing a [`CompiledBody`] per lowered body.
pub struct X64Backend<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    options: X64Options,
}

impl<'s, 'arena> X64Backend<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>) -> Self {
        Self::with_options(session, X64Options::default())
    }

    pub fn with_options(session: &'s CompilationSession<'arena>, options: X64Options) -> Self {
        Self { session, options }
    }

    pub fn options(&self) -> &X64Options {
        &self.options
    }
}

/// Frame homes of every value of one body.
struct Homes {
    values: HashMap<Value, i32>,
    staging: HashMap<Value, i32>,
    slots: Vec<i32>,
}

impl Homes {
    fn home(&self, value: Value) -> X64Result<i32> {
        self.values
            .get(&value)
            .copied()
            .ok_or(X64Error::UnboundValue(value.raw()))
    }

    fn staging(&self, value: Value) -> X64Result<i32> {
        self.staging
            .get(&value)
            .copied()
            .ok_or(X64Error::UnboundValue(value.raw()))
    }
}

struct BodyCodegen<'p, 'm, 's, 'arena> {
    plan: &'p LoweringPlan<'m>,
    session: &'s CompilationSession<'arena>,
    encoder: X64Encoder,
    homes: Homes,
}

impl BodyCodegen<'_, '_, '_, '_> {
    fn bits(&self, value: Value) -> u32 {
        let module = self.plan.module();
        module
            .types()
            .int_bits(module.value_type(value))
            .unwrap_or(64)
    }

    fn result_home(&self, inst: &Instruction) -> X64Result<i32> {
        let value = inst
            .result
            .ok_or(X64Error::MissingResult(inst.kind.info().name))?;
        self.homes.home(value)
    }

    fn load_operand(&mut self, reg: AsmReg, value: Value) -> X64Result<()> {
        match self.plan.module().value_kind(value) {
            ValueKind::Const(constant) => self.encoder.mov_reg_imm(reg, constant)?,
            ValueKind::Slot { index, .. } => {
                let offset = self
                    .homes
                    .slots
                    .get(index as usize)
                    .copied()
                    .ok_or(X64Error::UnboundValue(value.raw()))?;
                self.encoder.lea(reg, AsmReg::RBP, offset)?;
            }
            ValueKind::Arg { .. } | ValueKind::Inst { .. } => {
                let offset = self.homes.home(value)?;
                self.encoder.mov_reg_mem(reg, AsmReg::RBP, offset)?;
            }
        }
        Ok(())
    }

    fn store_rax(&mut self, offset: i32) -> X64Result<()> {
        self.encoder.mov_mem_reg(AsmReg::RBP, offset, AsmReg::RAX)?;
        Ok(())
    }

    // ==== ENTRY STUBS ====

    fn emit_stub(&mut self, entry_index: usize, frame_size: u32) -> X64Result<CodeLabel> {
        let (entry, block) = self.plan.bindings()[entry_index];
        let args = self
            .plan
            .entry(entry)
            .map(|point| point.args())
            .unwrap_or_default();

        let mut label = self.encoder.create_label();
        self.encoder.place_label(&mut label)?;
        self.encoder.emit_prologue(frame_size)?;

        let mut assigner = SysVAssigner::new();
        for &arg in args {
            let reg = assigner
                .assign_arg()
                .ok_or_else(|| X64Error::TooManyArguments {
                    entry: self.plan.module().entry_name(entry).to_string(),
                    count: args.len(),
                })?;
            self.encoder.mov_reg_reg(AsmReg::RAX, reg)?;
            self.encoder.extend_to_width(AsmReg::RAX, self.bits(arg))?;
            let home = self.homes.home(arg)?;
            self.store_rax(home)?;
        }
        self.encoder.jmp_unconditional_to_block(block.index())?;
        Ok(label)
    }

    // ==== SHARED BLOCKS ====

    /// Write the merge inputs flowing along `from -> to` into staging homes.
    fn emit_edge_copies(&mut self, from: Block, to: Block) -> X64Result<()> {
        for inst in self.plan.instructions(to) {
            let InstKind::Merge { incoming, .. } = &inst.kind else {
                break;
            };
            let (Some(result), Some(&(_, value))) =
                (inst.result, incoming.iter().find(|(pred, _)| *pred == from))
            else {
                continue;
            };
            self.load_operand(AsmReg::RAX, value)?;
            let staging = self.homes.staging(result)?;
            self.store_rax(staging)?;
            self.session.record_merge_copy();
        }
        Ok(())
    }

    fn has_edge_copies(&self, to: Block) -> bool {
        self.plan
            .instructions(to)
            .first()
            .is_some_and(|inst| inst.kind.is_merge())
    }

    fn emit_block(&mut self, block: Block, next: Option<Block>) -> X64Result<()> {
        self.encoder.place_label_for_block(block.index())?;
        trace!("emitting block {}", self.plan.module().block_name(block));

        let plan = self.plan;
        for inst in plan.instructions(block) {
            self.session.record_instruction_lowered(inst.kind.info().name);
            match &inst.kind {
                InstKind::Merge { .. } => {
                    let Some(result) = inst.result else {
                        return Err(X64Error::MissingResult("merge"));
                    };
                    let staging = self.homes.staging(result)?;
                    self.encoder.mov_reg_mem(AsmReg::RAX, AsmReg::RBP, staging)?;
                    let home = self.homes.home(result)?;
                    self.store_rax(home)?;
                }
                InstKind::Binary { op, lhs, rhs } => {
                    self.load_operand(AsmReg::RAX, *lhs)?;
                    self.load_operand(AsmReg::RCX, *rhs)?;
                    self.encoder.binary_reg_reg(*op, AsmReg::RAX, AsmReg::RCX)?;
                    self.encoder.extend_to_width(AsmReg::RAX, self.bits(*lhs))?;
                    let home = self.result_home(inst)?;
                    self.store_rax(home)?;
                }
                InstKind::Icmp { pred, lhs, rhs } => {
                    self.load_operand(AsmReg::RAX, *lhs)?;
                    self.load_operand(AsmReg::RCX, *rhs)?;
                    // i1 homes hold 0/1; signed compares see true as -1
                    if pred.is_signed() && self.bits(*lhs) == 1 {
                        self.encoder.neg_reg(AsmReg::RAX)?;
                        self.encoder.neg_reg(AsmReg::RCX)?;
                    }
                    self.encoder.cmp_reg_reg(AsmReg::RAX, AsmReg::RCX)?;
                    self.encoder.setcc_reg(*pred, AsmReg::RAX)?;
                    self.encoder.movzx_reg8_to_reg32(AsmReg::RAX, AsmReg::RAX)?;
                    let home = self.result_home(inst)?;
                    self.store_rax(home)?;
                }
                InstKind::Load { ptr, .. } => {
                    self.load_operand(AsmReg::RCX, *ptr)?;
                    self.encoder.mov_reg_mem(AsmReg::RAX, AsmReg::RCX, 0)?;
                    let home = self.result_home(inst)?;
                    self.store_rax(home)?;
                }
                InstKind::Store { value, ptr } => {
                    self.load_operand(AsmReg::RAX, *value)?;
                    self.load_operand(AsmReg::RCX, *ptr)?;
                    self.encoder.mov_mem_reg(AsmReg::RCX, 0, AsmReg::RAX)?;
                }
                InstKind::Br { target } => {
                    self.emit_edge_copies(block, *target)?;
                    // a label needs an instruction, so empty blocks keep their jump
                    let emits_code = plan.instructions(block).len() > 1 || self.has_edge_copies(*target);
                    if next != Some(*target) || !emits_code {
                        self.encoder.jmp_unconditional_to_block(target.index())?;
                    }
                }
                InstKind::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                } => {
                    self.load_operand(AsmReg::RAX, *cond)?;
                    self.encoder.test_reg_reg(AsmReg::RAX, AsmReg::RAX)?;

                    // the taken edge needs its own block when it carries copies
                    let mut edge_label = None;
                    if self.has_edge_copies(*then_dest) {
                        let label = self.encoder.create_label();
                        self.encoder.jnz_label(label)?;
                        edge_label = Some(label);
                    } else {
                        self.encoder.jnz_to_block(then_dest.index())?;
                    }

                    self.emit_edge_copies(block, *else_dest)?;
                    if edge_label.is_some() || next != Some(*else_dest) {
                        self.encoder.jmp_unconditional_to_block(else_dest.index())?;
                    }

                    if let Some(mut label) = edge_label {
                        self.encoder.place_label(&mut label)?;
                        self.emit_edge_copies(block, *then_dest)?;
                        self.encoder.jmp_unconditional_to_block(then_dest.index())?;
                        self.session.record_edge_block();
                    }
                }
                InstKind::Ret { value } => {
                    if let Some(value) = value {
                        self.load_operand(SysVAssigner::RET_REG, *value)?;
                    }
                    self.encoder.emit_epilogue()?;
                }
            }
        }
        Ok(())
    }
}

/// Give every value of the body a home in one shared frame.
fn layout_frame<'arena>(
    plan: &LoweringPlan<'_>,
    frame: &mut FunctionFrame<'arena>,
) -> X64Result<Homes> {
    let mut homes = Homes {
        values: HashMap::new(),
        staging: HashMap::new(),
        slots: Vec::with_capacity(plan.slots().len()),
    };

    for &(entry, _) in plan.bindings() {
        let Some(point) = plan.entry(entry) else {
            continue;
        };
        if point.params().len() > SysVAssigner::GP_ARG_REGS.len() {
            return Err(X64Error::TooManyArguments {
                entry: point.name().to_string(),
                count: point.params().len(),
            });
        }
        for &arg in point.args() {
            homes.values.insert(arg, frame.allocate_spill_slot(8));
        }
    }
    for &block in plan.blocks() {
        for inst in plan.instructions(block) {
            let Some(result) = inst.result else {
                continue;
            };
            homes.values.insert(result, frame.allocate_spill_slot(8));
            if inst.kind.is_merge() {
                homes.staging.insert(result, frame.allocate_spill_slot(8));
            }
        }
    }
    for _ in plan.slots() {
        homes.slots.push(frame.allocate_spill_slot(8));
    }

    frame.calculate_frame_size();
    Ok(homes)
}

impl LoweringBackend for X64Backend<'_, '_> {
    type Output = CompiledBody;
    type Error = X64Error;

    fn name(&self) -> &'static str {
        "x86-64"
    }

    fn lower(&mut self, plan: &LoweringPlan<'_>) -> X64Result<CompiledBody> {
        let mut frame = FunctionFrame::new(self.session.arena());
        let homes = layout_frame(plan, &mut frame)?;
        debug!(
            "{}: {} homes, frame size {}",
            plan.name(),
            frame.spill_slots.len(),
            frame.frame_size
        );

        let mut codegen = BodyCodegen {
            plan,
            session: self.session,
            encoder: X64Encoder::new()?,
            homes,
        };

        let mut stub_labels = Vec::with_capacity(plan.bindings().len());
        for index in 0..plan.bindings().len() {
            stub_labels.push(codegen.emit_stub(index, frame.frame_size)?);
        }

        let layout = plan.layout();
        for (position, &block) in layout.iter().enumerate() {
            codegen.emit_block(block, layout.get(position + 1).copied())?;
        }

        let mut labels = stub_labels;
        for &block in layout {
            let label = codegen
                .encoder
                .block_label(block.index())
                .ok_or_else(|| EncodingError::AssemblyError("block without label".into()))?;
            labels.push(label);
        }

        let (code, offsets) = codegen
            .encoder
            .finalize(self.options.base_address, &labels)?;
        let (stub_offsets, block_offsets) = offsets.split_at(plan.bindings().len());
        let stubs_end = block_offsets.first().copied().unwrap_or(code.len() as u64);

        let mut entries = Vec::with_capacity(stub_offsets.len());
        for (index, &(entry, _)) in plan.bindings().iter().enumerate() {
            let offset = stub_offsets[index];
            let end = stub_offsets.get(index + 1).copied().unwrap_or(stubs_end);
            let name = self.session.intern_str(plan.module().entry_name(entry));
            self.session.record_entry_emitted((end - offset) as usize);
            trace!("entry {} at {:#x}, stub {} bytes", name, offset, end - offset);
            entries.push(CompiledEntry {
                name: name.to_string(),
                offset,
                stub_size: end - offset,
            });
        }

        let block_offsets = layout
            .iter()
            .zip(block_offsets)
            .map(|(&block, &offset)| (plan.module().block_name(block).to_string(), offset))
            .collect();

        self.session.record_body_lowered(plan.name(), code.len());
        Ok(CompiledBody {
            name: plan.name().to_string(),
            code,
            base_address: self.options.base_address,
            frame_size: frame.frame_size,
            entries,
            block_offsets,
        })
    }
}
