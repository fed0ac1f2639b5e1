// This module carries the part of the System V AMD64 ABI the multi-entry backend needs.
// SysVAssigner hands out the six integer argument registers (RDI, RSI, RDX, RCX, R8, R9) in
// parameter order and reports exhaustion, since entry stubs only accept register-passed
// integer and pointer arguments; return values travel in RAX. FunctionFrame is the single
// frame layout shared by every entry of a body: each argument, instruction result, merge
// staging copy and addressable slot gets an 8-byte home below the saved RBP, and the total
// is rounded up to 16 bytes so RSP stays aligned after the prologue. Because all entry stubs
// set up the same frame, shared blocks can be emitted once and addressed identically no
// matter which symbol was called.

//! System V x86-64 calling convention and frame layout.

use bumpalo::{collections::Vec as BumpVec, Bump};

use super::encoder::AsmReg;

/// System V x86-64 integer argument assigner.
#[derive(Debug, Default)]
pub struct SysVAssigner {
    /// Current GP argument register index.
    gp_cnt: usize,
}

impl SysVAssigner {
    /// System V x86-64 GP argument registers.
    pub const GP_ARG_REGS: [AsmReg; 6] = [
        AsmReg::RDI,
        AsmReg::RSI,
        AsmReg::RDX,
        AsmReg::RCX,
        AsmReg::R8,
        AsmReg::R9,
    ];

    pub const RET_REG: AsmReg = AsmReg::RAX;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register of the next integer argument, `None` once registers run out.
    pub fn assign_arg(&mut self) -> Option<AsmReg> {
        let reg = Self::GP_ARG_REGS.get(self.gp_cnt).copied()?;
        self.gp_cnt += 1;
        Some(reg)
    }
}

/// Stack frame shared by all entries of one body.
#[derive(Debug)]
pub struct FunctionFrame<'a> {
    /// Total size of the stack frame below the saved RBP.
    pub frame_size: u32,
    /// Homes in allocation order, as RBP-relative offsets.
    pub spill_slots: BumpVec<'a, i32>,
    /// Lowest offset handed out so far.
    pub spill_offset: i32,
}

impl<'a> FunctionFrame<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            frame_size: 0,
            spill_slots: BumpVec::new_in(arena),
            spill_offset: 0,
        }
    }

    /// Allocate a new home and return its RBP-relative offset.
    pub fn allocate_spill_slot(&mut self, size: u32) -> i32 {
        let aligned_size = size.max(1).div_ceil(8) * 8;
        self.spill_offset -= aligned_size as i32;
        let offset = self.spill_offset;
        self.spill_slots.push(offset);
        offset
    }

    /// Calculate the final frame size.
    pub fn calculate_frame_size(&mut self) {
        // Frame layout:
        // rbp + 8:  return address
        // rbp:      saved rbp
        // rbp - 8:  first home, further homes below
        let spill_size = self.spill_offset.unsigned_abs();
        self.frame_size = spill_size.div_ceil(16) * 16;
    }
}
