// This module defines the closed instruction set of a multi-entry body. InstKind is a tagged
// enum rather than an open hierarchy so the verifier and both backends can match on every
// kind exhaustively. Binary arithmetic and integer comparisons carry their operands,
// Load/Store address body slots, Merge is the phi-equivalent node that selects one value
// per actual predecessor, and Br/CondBr/Ret are the terminators. OpInfo exposes the static
// shape of each kind (name, terminator flag, whether it defines a value) in the same table
// form as the test IR operation table of the reference compiler.

//! Instruction kinds and their static properties.

use super::body::Block;
use super::types::Type;
use super::value::Value;

/// Two-operand integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub const fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }

    /// Evaluate on already normalized operands; callers normalize the result.
    pub fn eval(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
        }
    }
}

/// Integer comparison predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IntPredicate {
    pub const fn name(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            IntPredicate::Slt | IntPredicate::Sle | IntPredicate::Sgt | IntPredicate::Sge
        )
    }

    /// Compare two values of width `bits`, already normalized.
    ///
    /// `i1` values are held as 0/1, so signed predicates read a set bit as -1.
    pub fn eval(self, lhs: i64, rhs: i64, bits: u32) -> bool {
        let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        let (ul, ur) = (lhs as u64 & mask, rhs as u64 & mask);
        let (lhs, rhs) = if bits == 1 { (-(lhs & 1), -(rhs & 1)) } else { (lhs, rhs) };
        match self {
            IntPredicate::Eq => ul == ur,
            IntPredicate::Ne => ul != ur,
            IntPredicate::Slt => lhs < rhs,
            IntPredicate::Sle => lhs <= rhs,
            IntPredicate::Sgt => lhs > rhs,
            IntPredicate::Sge => lhs >= rhs,
            IntPredicate::Ult => ul < ur,
            IntPredicate::Ule => ul <= ur,
            IntPredicate::Ugt => ul > ur,
            IntPredicate::Uge => ul >= ur,
        }
    }
}

/// Operation performed by an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Binary { op: BinaryOp, lhs: Value, rhs: Value },
    Icmp { pred: IntPredicate, lhs: Value, rhs: Value },
    Load { ty: Type, ptr: Value },
    Store { value: Value, ptr: Value },
    /// One `(predecessor, value)` pair per actual predecessor block.
    Merge { ty: Type, incoming: Vec<(Block, Value)> },
    Br { target: Block },
    CondBr { cond: Value, then_dest: Block, else_dest: Block },
    Ret { value: Option<Value> },
}

/// Static shape of an instruction kind.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub is_terminator: bool,
    pub is_def: bool,
}

impl InstKind {
    pub fn info(&self) -> OpInfo {
        use InstKind::*;
        match self {
            Binary { op, .. } => OpInfo { name: op.name(), is_terminator: false, is_def: true },
            Icmp { .. } => OpInfo { name: "icmp", is_terminator: false, is_def: true },
            Load { .. } => OpInfo { name: "load", is_terminator: false, is_def: true },
            Store { .. } => OpInfo { name: "store", is_terminator: false, is_def: false },
            Merge { .. } => OpInfo { name: "merge", is_terminator: false, is_def: true },
            Br { .. } => OpInfo { name: "br", is_terminator: true, is_def: false },
            CondBr { .. } => OpInfo { name: "condbr", is_terminator: true, is_def: false },
            Ret { .. } => OpInfo { name: "ret", is_terminator: true, is_def: false },
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.info().is_terminator
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, InstKind::Merge { .. })
    }

    /// Successor blocks in operand order; may repeat a block.
    pub fn successors(&self) -> Vec<Block> {
        match self {
            InstKind::Br { target } => vec![*target],
            InstKind::CondBr { then_dest, else_dest, .. } => vec![*then_dest, *else_dest],
            _ => Vec::new(),
        }
    }

    /// Value operands, including merge incoming values.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            InstKind::Binary { lhs, rhs, .. } | InstKind::Icmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Load { ptr, .. } => vec![*ptr],
            InstKind::Store { value, ptr } => vec![*value, *ptr],
            InstKind::Merge { incoming, .. } => incoming.iter().map(|(_, v)| *v).collect(),
            InstKind::CondBr { cond, .. } => vec![*cond],
            InstKind::Ret { value } => value.iter().copied().collect(),
            InstKind::Br { .. } => Vec::new(),
        }
    }
}

/// An instruction placed in a block.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstKind,
    pub result: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates_respect_width() {
        // -1 as i32 is 0xffff_ffff unsigned
        assert!(IntPredicate::Ugt.eval(-1, 1, 32));
        assert!(IntPredicate::Slt.eval(-1, 1, 32));
        assert!(IntPredicate::Eq.eval(-1, -1, 8));
        assert!(!IntPredicate::Ne.eval(5, 5, 64));
        assert!(IntPredicate::Uge.eval(0, 0, 1));
    }

    #[test]
    fn test_signed_i1_true_is_minus_one() {
        assert!(IntPredicate::Slt.eval(1, 0, 1));
        assert!(!IntPredicate::Sgt.eval(1, 0, 1));
        assert!(IntPredicate::Ugt.eval(1, 0, 1));
        assert!(IntPredicate::Sge.eval(1, 1, 1));
    }

    #[test]
    fn test_binary_eval_wraps() {
        assert_eq!(BinaryOp::Add.eval(i64::MAX, 1), i64::MIN);
        assert_eq!(BinaryOp::Mul.eval(6, 7), 42);
        assert_eq!(BinaryOp::Xor.eval(0b1010, 0b0110), 0b1100);
    }
}
