//! Reference backend that turns a verified body into callable units.
//!
//! Lowering resolves every value to an [`Operand`]: constants become
//! immediates, slots become addresses into a per-call slot array, and
//! arguments and instruction results get a local. Merge nodes disappear;
//! each control-flow edge instead carries the parallel copies into the merge
//! locals of its target. Every entry symbol shares the same lowered blocks and
//! only differs in where execution starts and which locals its arguments land
//! in.

use hashbrown::HashMap;
use log::{debug, trace};
use thiserror::Error;

use crate::core::body::Block;
use crate::core::inst::{BinaryOp, InstKind, Instruction, IntPredicate};
use crate::core::value::{normalize_int, Value, ValueKind};

use super::{LoweringBackend, LoweringPlan};

/// Failure to lower a body for interpretation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("value {0} has no definition visible to the interpreter")]
    UnboundValue(u32),

    #[error("`{0}` instruction has no result value")]
    MissingResult(&'static str),

    #[error("block `{0}` has no terminator")]
    MissingTerminator(String),
}

/// Failure while running a lowered entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("no entry symbol named `{0}`")]
    UnknownSymbol(String),

    #[error("`{symbol}` takes {expected} arguments, {found} given")]
    ArityMismatch {
        symbol: String,
        expected: usize,
        found: usize,
    },

    #[error("`{symbol}` accessed invalid address {address}")]
    BadAddress { symbol: String, address: i64 },

    #[error("`{symbol}` did not return within {steps} steps")]
    StepLimit { symbol: String, steps: u64 },
}

/// Where an operand value comes from at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Local(u32),
    Imm(i64),
    /// Address of a slot.
    Slot(u32),
}

#[derive(Debug, Clone)]
enum Op {
    Binary {
        op: BinaryOp,
        bits: u32,
        dst: u32,
        lhs: Operand,
        rhs: Operand,
    },
    Icmp {
        pred: IntPredicate,
        bits: u32,
        dst: u32,
        lhs: Operand,
        rhs: Operand,
    },
    Load {
        dst: u32,
        ptr: Operand,
    },
    Store {
        src: Operand,
        ptr: Operand,
    },
}

/// A jump target with the merge copies of its edge.
#[derive(Debug, Clone)]
struct Edge {
    target: u32,
    copies: Vec<(u32, Operand)>,
}

#[derive(Debug, Clone)]
enum Exit {
    Jump(Edge),
    Branch {
        cond: Operand,
        then_edge: Edge,
        else_edge: Edge,
    },
    Return {
        value: Option<Operand>,
        bits: u32,
    },
}

#[derive(Debug, Clone)]
struct InterpBlock {
    name: String,
    ops: Vec<Op>,
    exit: Exit,
}

#[derive(Debug, Clone)]
struct InterpEntry {
    block: u32,
    args: Vec<(u32, u32)>,
    returns: bool,
}

/// Lowered body with one callable symbol per registered entry.
#[derive(Debug, Clone)]
pub struct InterpProgram {
    name: String,
    blocks: Vec<InterpBlock>,
    entries: HashMap<String, InterpEntry>,
    symbols: Vec<String>,
    locals: usize,
    slots: usize,
    step_limit: u64,
}

impl InterpProgram {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry symbols in registration order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Invoke `symbol`. Arguments are wrapped to their parameter widths.
    pub fn call(&self, symbol: &str, args: &[i64]) -> Result<Option<i64>, ExecError> {
        let entry = self
            .entries
            .get(symbol)
            .ok_or_else(|| ExecError::UnknownSymbol(symbol.to_string()))?;
        if entry.args.len() != args.len() {
            return Err(ExecError::ArityMismatch {
                symbol: symbol.to_string(),
                expected: entry.args.len(),
                found: args.len(),
            });
        }

        let mut frame = Frame {
            symbol,
            locals: vec![0; self.locals],
            slots: vec![0; self.slots],
        };
        // the entry stub: arguments into their homes, then jump
        for (&(local, bits), &arg) in entry.args.iter().zip(args) {
            frame.locals[local as usize] = normalize_int(arg, bits);
        }

        let mut current = entry.block as usize;
        let mut steps = 0u64;
        loop {
            steps += 1;
            if steps > self.step_limit {
                return Err(ExecError::StepLimit {
                    symbol: symbol.to_string(),
                    steps: self.step_limit,
                });
            }
            let block = &self.blocks[current];
            trace!("{}: executing {}", symbol, block.name);
            for op in &block.ops {
                frame.execute(op)?;
            }
            let edge = match &block.exit {
                Exit::Jump(edge) => edge,
                Exit::Branch {
                    cond,
                    then_edge,
                    else_edge,
                } => {
                    if frame.read(*cond) & 1 != 0 {
                        then_edge
                    } else {
                        else_edge
                    }
                }
                Exit::Return { value, bits } => {
                    let result = value.map(|value| normalize_int(frame.read(value), *bits));
                    return Ok(if entry.returns { result } else { None });
                }
            };
            // merge copies are parallel: read every source before writing
            let values: Vec<i64> = edge.copies.iter().map(|&(_, src)| frame.read(src)).collect();
            for (&(dst, _), value) in edge.copies.iter().zip(values) {
                frame.locals[dst as usize] = value;
            }
            current = edge.target as usize;
        }
    }
}

struct Frame<'a> {
    symbol: &'a str,
    locals: Vec<i64>,
    slots: Vec<i64>,
}

impl Frame<'_> {
    fn read(&self, operand: Operand) -> i64 {
        match operand {
            Operand::Local(local) => self.locals[local as usize],
            Operand::Imm(value) => value,
            Operand::Slot(slot) => slot as i64,
        }
    }

    fn slot_index(&self, ptr: Operand) -> Result<usize, ExecError> {
        let address = self.read(ptr);
        usize::try_from(address)
            .ok()
            .filter(|&index| index < self.slots.len())
            .ok_or_else(|| ExecError::BadAddress {
                symbol: self.symbol.to_string(),
                address,
            })
    }

    fn execute(&mut self, op: &Op) -> Result<(), ExecError> {
        match *op {
            Op::Binary {
                op,
                bits,
                dst,
                lhs,
                rhs,
            } => {
                let value = op.eval(self.read(lhs), self.read(rhs));
                self.locals[dst as usize] = normalize_int(value, bits);
            }
            Op::Icmp {
                pred,
                bits,
                dst,
                lhs,
                rhs,
            } => {
                self.locals[dst as usize] = pred.eval(self.read(lhs), self.read(rhs), bits) as i64;
            }
            Op::Load { dst, ptr } => {
                let index = self.slot_index(ptr)?;
                self.locals[dst as usize] = self.slots[index];
            }
            Op::Store { src, ptr } => {
                let index = self.slot_index(ptr)?;
                self.slots[index] = self.read(src);
            }
        }
        Ok(())
    }
}

/// Backend producing an [`InterpProgram`].
#[derive(Debug, Clone)]
pub struct Interpreter {
    step_limit: u64,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            step_limit: 1_000_000,
        }
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks a single call may execute before it is aborted.
    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }
}

struct ProgramBuilder<'p, 'm> {
    plan: &'p LoweringPlan<'m>,
    locals: HashMap<Value, u32>,
}

impl ProgramBuilder<'_, '_> {
    fn bits(&self, value: Value) -> u32 {
        let module = self.plan.module();
        module
            .types()
            .int_bits(module.value_type(value))
            .unwrap_or(64)
    }

    fn operand(&self, value: Value) -> Result<Operand, InterpError> {
        match self.plan.module().value_kind(value) {
            ValueKind::Const(constant) => Ok(Operand::Imm(constant)),
            ValueKind::Slot { index, .. } => Ok(Operand::Slot(index)),
            ValueKind::Arg { .. } | ValueKind::Inst { .. } => self.local(value).map(Operand::Local),
        }
    }

    fn edge(&self, from: Block, to: Block) -> Result<Edge, InterpError> {
        let mut copies = Vec::new();
        for inst in self.plan.instructions(to) {
            let InstKind::Merge { incoming, .. } = &inst.kind else {
                break;
            };
            let (Some(result), Some(&(_, value))) =
                (inst.result, incoming.iter().find(|(pred, _)| *pred == from))
            else {
                continue;
            };
            copies.push((self.local(result)?, self.operand(value)?));
        }
        Ok(Edge {
            target: to.index() as u32,
            copies,
        })
    }

    fn local(&self, value: Value) -> Result<u32, InterpError> {
        self.locals
            .get(&value)
            .copied()
            .ok_or(InterpError::UnboundValue(value.raw()))
    }

    fn result(&self, inst: &Instruction) -> Result<u32, InterpError> {
        let value = inst
            .result
            .ok_or(InterpError::MissingResult(inst.kind.info().name))?;
        self.local(value)
    }

    fn block(&self, block: Block) -> Result<InterpBlock, InterpError> {
        let mut ops = Vec::new();
        let mut exit = None;
        for inst in self.plan.instructions(block) {
            match &inst.kind {
                InstKind::Binary { op, lhs, rhs } => ops.push(Op::Binary {
                    op: *op,
                    bits: self.bits(*lhs),
                    dst: self.result(inst)?,
                    lhs: self.operand(*lhs)?,
                    rhs: self.operand(*rhs)?,
                }),
                InstKind::Icmp { pred, lhs, rhs } => ops.push(Op::Icmp {
                    pred: *pred,
                    bits: self.bits(*lhs),
                    dst: self.result(inst)?,
                    lhs: self.operand(*lhs)?,
                    rhs: self.operand(*rhs)?,
                }),
                InstKind::Load { ptr, .. } => ops.push(Op::Load {
                    dst: self.result(inst)?,
                    ptr: self.operand(*ptr)?,
                }),
                InstKind::Store { value, ptr } => ops.push(Op::Store {
                    src: self.operand(*value)?,
                    ptr: self.operand(*ptr)?,
                }),
                InstKind::Merge { .. } => {}
                InstKind::Br { target } => exit = Some(Exit::Jump(self.edge(block, *target)?)),
                InstKind::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                } => {
                    exit = Some(Exit::Branch {
                        cond: self.operand(*cond)?,
                        then_edge: self.edge(block, *then_dest)?,
                        else_edge: self.edge(block, *else_dest)?,
                    })
                }
                InstKind::Ret { value } => {
                    exit = Some(Exit::Return {
                        value: value.map(|value| self.operand(value)).transpose()?,
                        bits: value.map_or(64, |value| self.bits(value)),
                    })
                }
            }
        }
        let name = self.plan.module().block_name(block).to_string();
        match exit {
            Some(exit) => Ok(InterpBlock { name, ops, exit }),
            None => Err(InterpError::MissingTerminator(name)),
        }
    }
}

impl LoweringBackend for Interpreter {
    type Output = InterpProgram;
    type Error = InterpError;

    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn lower(&mut self, plan: &LoweringPlan<'_>) -> Result<InterpProgram, InterpError> {
        let module = plan.module();
        let mut builder = ProgramBuilder {
            plan,
            locals: HashMap::new(),
        };

        for &(entry, _) in plan.bindings() {
            for &arg in plan.entry(entry).map(|point| point.args()).unwrap_or_default() {
                let next = builder.locals.len() as u32;
                builder.locals.insert(arg, next);
            }
        }
        for &block in plan.blocks() {
            for inst in plan.instructions(block) {
                if let Some(result) = inst.result {
                    let next = builder.locals.len() as u32;
                    builder.locals.insert(result, next);
                }
            }
        }

        let blocks = plan
            .blocks()
            .iter()
            .map(|&block| builder.block(block))
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = HashMap::new();
        let mut symbols = Vec::new();
        for &(entry, block) in plan.bindings() {
            let Some(point) = plan.entry(entry) else {
                continue;
            };
            let args = point
                .args()
                .iter()
                .map(|&arg| Ok((builder.local(arg)?, builder.bits(arg))))
                .collect::<Result<Vec<_>, InterpError>>()?;
            entries.insert(
                point.name().to_string(),
                InterpEntry {
                    block: block.index() as u32,
                    args,
                    returns: !module.types().is_void(point.ret()),
                },
            );
            symbols.push(point.name().to_string());
        }

        debug!(
            "interpreter lowered {}: {} blocks, {} locals, {} symbols",
            plan.name(),
            blocks.len(),
            builder.locals.len(),
            symbols.len()
        );
        Ok(InterpProgram {
            name: plan.name().to_string(),
            blocks,
            entries,
            symbols,
            locals: builder.locals.len(),
            slots: plan.slots().len(),
            step_limit: self.step_limit,
        })
    }
}
