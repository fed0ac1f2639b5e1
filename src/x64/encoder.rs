// This module wraps the iced-x86 code assembler for the x86-64 backend. X64Encoder turns
// AsmReg register references into real machine code for the small instruction repertoire the
// spill-everything lowering needs: 64-bit moves between registers, immediates and rbp-relative
// homes, LEA for slot addresses, the two-operand integer ALU group (ADD, SUB, IMUL, AND, OR,
// XOR), CMP/TEST with SETcc plus MOVZX for materializing comparison results, shift pairs for
// sign-extending a value to an arbitrary integer width, PUSH/POP/RET, and the frame prologue
// and epilogue. Control flow uses iced-x86 labels: one label per basic block, created on first
// reference and placed when the block is emitted, plus free-standing labels for entry stubs
// and edge copy blocks. finalize assembles at a base address and reports the offset of every
// requested label so callers can publish entry symbols and block offsets.

//! x86-64 instruction encoding using iced-x86.

use hashbrown::HashMap;
use iced_x86::code_asm::*;
use iced_x86::{BlockEncoderOptions, IcedError};
use thiserror::Error;

use crate::core::inst::{BinaryOp, IntPredicate};

/// Error types for instruction encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid register for operation")]
    InvalidRegister,

    #[error("assembly error: {0}")]
    AssemblyError(String),
}

fn asm_err(e: IcedError) -> EncodingError {
    EncodingError::AssemblyError(e.to_string())
}

/// A machine register: bank 0 holds the general purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub bank: u8,
    pub id: u8,
}

impl AsmReg {
    pub const RAX: AsmReg = AsmReg::new(0, 0);
    pub const RCX: AsmReg = AsmReg::new(0, 1);
    pub const RDX: AsmReg = AsmReg::new(0, 2);
    pub const RSP: AsmReg = AsmReg::new(0, 4);
    pub const RBP: AsmReg = AsmReg::new(0, 5);
    pub const RSI: AsmReg = AsmReg::new(0, 6);
    pub const RDI: AsmReg = AsmReg::new(0, 7);
    pub const R8: AsmReg = AsmReg::new(0, 8);
    pub const R9: AsmReg = AsmReg::new(0, 9);

    pub const fn new(bank: u8, id: u8) -> Self {
        Self { bank, id }
    }
}

/// x86-64 instruction encoder using iced-x86.
pub struct X64Encoder {
    assembler: CodeAssembler,
    /// Labels for basic blocks, keyed by stable block number.
    block_labels: HashMap<usize, CodeLabel>,
    placed_blocks: hashbrown::HashSet<usize>,
}

impl X64Encoder {
    pub fn new() -> Result<Self, EncodingError> {
        let assembler = CodeAssembler::new(64).map_err(asm_err)?;
        Ok(Self {
            assembler,
            block_labels: HashMap::new(),
            placed_blocks: hashbrown::HashSet::new(),
        })
    }

    fn to_gp64_register(&self, reg: AsmReg) -> Result<AsmRegister64, EncodingError> {
        if reg.bank != 0 {
            return Err(EncodingError::InvalidRegister);
        }
        const GP64_REGS: [AsmRegister64; 16] = [
            rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15,
        ];
        GP64_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister)
    }

    fn to_gp32_register(&self, reg: AsmReg) -> Result<AsmRegister32, EncodingError> {
        if reg.bank != 0 {
            return Err(EncodingError::InvalidRegister);
        }
        const GP32_REGS: [AsmRegister32; 16] = [
            eax, ecx, edx, ebx, esp, ebp, esi, edi, r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
        ];
        GP32_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister)
    }

    fn to_gp8_register(&self, reg: AsmReg) -> Result<AsmRegister8, EncodingError> {
        if reg.bank != 0 {
            return Err(EncodingError::InvalidRegister);
        }
        const GP8_REGS: [AsmRegister8; 16] = [
            al, cl, dl, bl, spl, bpl, sil, dil, r8b, r9b, r10b, r11b, r12b, r13b, r14b, r15b,
        ];
        GP8_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister)
    }

    // ==== MOVES ====

    pub fn mov_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        let src_reg = self.to_gp64_register(src)?;
        self.assembler.mov(dst_reg, src_reg).map_err(asm_err)
    }

    pub fn mov_reg_imm(&mut self, dst: AsmReg, imm: i64) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        self.assembler.mov(dst_reg, imm).map_err(asm_err)
    }

    /// `mov dst, qword [base + offset]`
    pub fn mov_reg_mem(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        let base_reg = self.to_gp64_register(base)?;
        self.assembler
            .mov(dst_reg, qword_ptr(base_reg + offset))
            .map_err(asm_err)
    }

    /// `mov qword [base + offset], src`
    pub fn mov_mem_reg(&mut self, base: AsmReg, offset: i32, src: AsmReg) -> Result<(), EncodingError> {
        let base_reg = self.to_gp64_register(base)?;
        let src_reg = self.to_gp64_register(src)?;
        self.assembler
            .mov(qword_ptr(base_reg + offset), src_reg)
            .map_err(asm_err)
    }

    pub fn lea(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        let base_reg = self.to_gp64_register(base)?;
        self.assembler.lea(dst_reg, base_reg + offset).map_err(asm_err)
    }

    pub fn movzx_reg8_to_reg32(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp32_register(dst)?;
        let src_reg = self.to_gp8_register(src)?;
        self.assembler.movzx(dst_reg, src_reg).map_err(asm_err)
    }

    // ==== ARITHMETIC ====

    /// `dst = dst <op> src` on 64-bit registers.
    pub fn binary_reg_reg(&mut self, op: BinaryOp, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        let src_reg = self.to_gp64_register(src)?;
        match op {
            BinaryOp::Add => self.assembler.add(dst_reg, src_reg),
            BinaryOp::Sub => self.assembler.sub(dst_reg, src_reg),
            BinaryOp::Mul => self.assembler.imul_2(dst_reg, src_reg),
            BinaryOp::And => self.assembler.and(dst_reg, src_reg),
            BinaryOp::Or => self.assembler.or(dst_reg, src_reg),
            BinaryOp::Xor => self.assembler.xor(dst_reg, src_reg),
        }
        .map_err(asm_err)
    }

    pub fn sub_reg_imm(&mut self, dst: AsmReg, imm: i32) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        self.assembler.sub(dst_reg, imm).map_err(asm_err)
    }

    pub fn and_reg_imm(&mut self, dst: AsmReg, imm: i32) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        self.assembler.and(dst_reg, imm).map_err(asm_err)
    }

    pub fn neg_reg(&mut self, dst: AsmReg) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(dst)?;
        self.assembler.neg(dst_reg).map_err(asm_err)
    }

    /// Sign-extend the low `bits` of `reg` in place; `i1` is zero-extended.
    pub fn extend_to_width(&mut self, reg: AsmReg, bits: u32) -> Result<(), EncodingError> {
        match bits {
            1 => self.and_reg_imm(reg, 1),
            bits if bits == 0 || bits >= 64 => Ok(()),
            bits => {
                let dst_reg = self.to_gp64_register(reg)?;
                let shift = (64 - bits) as i32;
                self.assembler.shl(dst_reg, shift).map_err(asm_err)?;
                self.assembler.sar(dst_reg, shift).map_err(asm_err)
            }
        }
    }

    // ==== COMPARISONS ====

    pub fn cmp_reg_reg(&mut self, left: AsmReg, right: AsmReg) -> Result<(), EncodingError> {
        let left_reg = self.to_gp64_register(left)?;
        let right_reg = self.to_gp64_register(right)?;
        self.assembler.cmp(left_reg, right_reg).map_err(asm_err)
    }

    pub fn test_reg_reg(&mut self, left: AsmReg, right: AsmReg) -> Result<(), EncodingError> {
        let left_reg = self.to_gp64_register(left)?;
        let right_reg = self.to_gp64_register(right)?;
        self.assembler.test(left_reg, right_reg).map_err(asm_err)
    }

    /// SETcc for `pred` after a `cmp lhs, rhs`.
    ///
    /// Operands are kept sign-extended to 64 bits, which preserves both the
    /// signed and the unsigned order of the narrower width.
    pub fn setcc_reg(&mut self, pred: IntPredicate, dst: AsmReg) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp8_register(dst)?;
        match pred {
            IntPredicate::Eq => self.assembler.sete(dst_reg),
            IntPredicate::Ne => self.assembler.setne(dst_reg),
            IntPredicate::Slt => self.assembler.setl(dst_reg),
            IntPredicate::Sle => self.assembler.setle(dst_reg),
            IntPredicate::Sgt => self.assembler.setg(dst_reg),
            IntPredicate::Sge => self.assembler.setge(dst_reg),
            IntPredicate::Ult => self.assembler.setb(dst_reg),
            IntPredicate::Ule => self.assembler.setbe(dst_reg),
            IntPredicate::Ugt => self.assembler.seta(dst_reg),
            IntPredicate::Uge => self.assembler.setae(dst_reg),
        }
        .map_err(asm_err)
    }

    // ==== STACK ====

    pub fn push_reg(&mut self, reg: AsmReg) -> Result<(), EncodingError> {
        let src_reg = self.to_gp64_register(reg)?;
        self.assembler.push(src_reg).map_err(asm_err)
    }

    pub fn pop_reg(&mut self, reg: AsmReg) -> Result<(), EncodingError> {
        let dst_reg = self.to_gp64_register(reg)?;
        self.assembler.pop(dst_reg).map_err(asm_err)
    }

    pub fn ret(&mut self) -> Result<(), EncodingError> {
        self.assembler.ret().map_err(asm_err)
    }

    /// `push rbp; mov rbp, rsp; sub rsp, frame_size`
    pub fn emit_prologue(&mut self, frame_size: u32) -> Result<(), EncodingError> {
        self.push_reg(AsmReg::RBP)?;
        self.mov_reg_reg(AsmReg::RBP, AsmReg::RSP)?;
        if frame_size > 0 {
            self.sub_reg_imm(AsmReg::RSP, frame_size as i32)?;
        }
        Ok(())
    }

    /// `mov rsp, rbp; pop rbp; ret`, valid from any point of the frame.
    pub fn emit_epilogue(&mut self) -> Result<(), EncodingError> {
        self.mov_reg_reg(AsmReg::RSP, AsmReg::RBP)?;
        self.pop_reg(AsmReg::RBP)?;
        self.ret()
    }

    // ==== LABEL MANAGEMENT ====

    pub fn create_label(&mut self) -> CodeLabel {
        self.assembler.create_label()
    }

    /// Bind `label` to the next emitted instruction.
    pub fn place_label(&mut self, label: &mut CodeLabel) -> Result<(), EncodingError> {
        self.assembler.set_label(label).map_err(asm_err)
    }

    pub fn get_or_create_label_for_block(&mut self, block_id: usize) -> CodeLabel {
        if let Some(&label) = self.block_labels.get(&block_id) {
            return label;
        }
        let label = self.assembler.create_label();
        self.block_labels.insert(block_id, label);
        label
    }

    pub fn place_label_for_block(&mut self, block_id: usize) -> Result<(), EncodingError> {
        let mut label = self.get_or_create_label_for_block(block_id);
        self.place_label(&mut label)?;
        self.block_labels.insert(block_id, label);
        self.placed_blocks.insert(block_id);
        Ok(())
    }

    // ==== CONTROL FLOW ====

    pub fn jmp_label(&mut self, label: CodeLabel) -> Result<(), EncodingError> {
        self.assembler.jmp(label).map_err(asm_err)
    }

    /// Jump to `label` if the last TEST/CMP left a non-zero result.
    pub fn jnz_label(&mut self, label: CodeLabel) -> Result<(), EncodingError> {
        self.assembler.jne(label).map_err(asm_err)
    }

    pub fn jmp_unconditional_to_block(&mut self, target_block: usize) -> Result<(), EncodingError> {
        let label = self.get_or_create_label_for_block(target_block);
        self.jmp_label(label)
    }

    pub fn jnz_to_block(&mut self, target_block: usize) -> Result<(), EncodingError> {
        let label = self.get_or_create_label_for_block(target_block);
        self.jnz_label(label)
    }

    /// Assemble at `base` and return the code with the offset of each label.
    pub fn finalize(&mut self, base: u64, labels: &[CodeLabel]) -> Result<(Vec<u8>, Vec<u64>), EncodingError> {
        let unplaced = self
            .block_labels
            .keys()
            .find(|block_id| !self.placed_blocks.contains(*block_id));
        if let Some(block_id) = unplaced {
            return Err(EncodingError::AssemblyError(format!(
                "jump to block {block_id} which was never emitted"
            )));
        }

        let result = self
            .assembler
            .assemble_options(base, BlockEncoderOptions::RETURN_NEW_INSTRUCTION_OFFSETS)
            .map_err(asm_err)?;
        let offsets = labels
            .iter()
            .map(|label| result.label_ip(label).map(|ip| ip - base).map_err(asm_err))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((result.inner.code_buffer, offsets))
    }

    pub fn block_label(&self, block_id: usize) -> Option<CodeLabel> {
        self.block_labels.get(&block_id).copied()
    }
}
