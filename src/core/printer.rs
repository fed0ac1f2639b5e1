//! Textual dump of a module.
//!
//! The format is meant for diagnostics and tests, not for parsing back:
//!
//! ```text
//! module multi_entry
//!
//! body add (frozen)
//!   entry add1(i32 %x, i32 %y) -> i32 at Entry1
//!   entry add2(i32 %x2) -> i32 at Entry2
//!   slot %xs : i32
//! Entry1:  ; exclusive add1
//!   store %x, %xs
//!   %y__lt__0 = icmp slt %y, 0
//!   condbr %y__lt__0, Y_is_Seven, Tail
//! Y_is_Seven:  ; exclusive add1, preds Entry1
//!   br Tail
//! Entry2:  ; exclusive add2
//!   store %x2, %xs
//!   br Tail
//! Tail:  ; shared, preds Entry1, Y_is_Seven, Entry2
//!   %y3 = merge i32 [Entry1: %y], [Y_is_Seven: 7], [Entry2: 10]
//!   %xv = load i32, %xs
//!   %addOut = add %xv, %y3
//!   ret %addOut
//! ```

use std::fmt;

use super::body::{Block, BodyId};
use super::cfg::{ControlFlow, Region};
use super::inst::InstKind;
use super::module::Module;
use super::value::{Value, ValueKind};

/// `Display` adapter printing every body of a module.
pub struct ModulePrinter<'a> {
    module: &'a Module,
}

impl<'a> ModulePrinter<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self { module }
    }

    fn value(&self, value: Value) -> String {
        if !self.module.contains_value(value) {
            return format!("<invalid {}>", value.raw());
        }
        match (self.module.value_kind(value), self.module.value_name(value)) {
            (ValueKind::Const(constant), _) => constant.to_string(),
            (_, Some(name)) => format!("%{name}"),
            (ValueKind::Arg { entry, index }, None) => {
                format!("%{}.{}", self.module.entry_name(entry), index)
            }
            (_, None) => format!("%v{}", value.raw()),
        }
    }

    fn block(&self, block: Block) -> &str {
        self.module.block_name(block)
    }

    fn write_body(&self, f: &mut fmt::Formatter<'_>, id: BodyId) -> fmt::Result {
        let Some(body) = self.module.body(id) else {
            return Ok(());
        };
        let cfg = ControlFlow::compute(self.module, id);
        writeln!(
            f,
            "body {}{}",
            body.name(),
            if body.is_frozen() { " (frozen)" } else { "" }
        )?;

        for &entry in body.entries() {
            let Some(point) = self.module.entry(entry) else {
                continue;
            };
            let params: Vec<String> = point
                .args()
                .iter()
                .map(|&arg| {
                    format!(
                        "{} {}",
                        self.module.type_name(self.module.value_type(arg)),
                        self.value(arg)
                    )
                })
                .collect();
            write!(
                f,
                "  entry {}({}) -> {}",
                point.name(),
                params.join(", "),
                self.module.type_name(point.ret())
            )?;
            match point.binding() {
                Some(block) => writeln!(f, " at {}", self.block(block))?,
                None => writeln!(f)?,
            }
        }
        for slot in body.slots() {
            writeln!(
                f,
                "  slot {} : {}",
                self.value(slot.value()),
                self.module.type_name(slot.ty())
            )?;
        }

        for (block, region) in cfg.blocks() {
            write!(f, "{}:", self.block(block))?;
            match region {
                Region::Unreachable => write!(f, "  ; unreachable")?,
                Region::Exclusive(entry) => {
                    write!(f, "  ; exclusive {}", self.module.entry_name(entry))?
                }
                Region::Shared => write!(f, "  ; shared")?,
                Region::Partial => write!(f, "  ; partial")?,
            }
            let preds = cfg.preds(block);
            if !preds.is_empty() {
                let names: Vec<&str> = preds.iter().map(|&pred| self.block(pred)).collect();
                write!(f, ", preds {}", names.join(", "))?;
            }
            writeln!(f)?;

            let Some(data) = self.module.block(block) else {
                continue;
            };
            for inst in data.instructions() {
                write!(f, "  ")?;
                if let Some(result) = inst.result {
                    write!(f, "{} = ", self.value(result))?;
                }
                let name = inst.kind.info().name;
                match &inst.kind {
                    InstKind::Binary { lhs, rhs, .. } => {
                        write!(f, "{} {}, {}", name, self.value(*lhs), self.value(*rhs))?
                    }
                    InstKind::Icmp { pred, lhs, rhs } => write!(
                        f,
                        "{} {} {}, {}",
                        name,
                        pred.name(),
                        self.value(*lhs),
                        self.value(*rhs)
                    )?,
                    InstKind::Load { ty, ptr } => write!(
                        f,
                        "{} {}, {}",
                        name,
                        self.module.type_name(*ty),
                        self.value(*ptr)
                    )?,
                    InstKind::Store { value, ptr } => {
                        write!(f, "{} {}, {}", name, self.value(*value), self.value(*ptr))?
                    }
                    InstKind::Merge { ty, incoming } => {
                        let pairs: Vec<String> = incoming
                            .iter()
                            .map(|&(pred, value)| format!("[{}: {}]", self.block(pred), self.value(value)))
                            .collect();
                        write!(f, "{} {} {}", name, self.module.type_name(*ty), pairs.join(", "))?
                    }
                    InstKind::Br { target } => write!(f, "{} {}", name, self.block(*target))?,
                    InstKind::CondBr {
                        cond,
                        then_dest,
                        else_dest,
                    } => write!(
                        f,
                        "{} {}, {}, {}",
                        name,
                        self.value(*cond),
                        self.block(*then_dest),
                        self.block(*else_dest)
                    )?,
                    InstKind::Ret { value: Some(value) } => write!(f, "{} {}", name, self.value(*value))?,
                    InstKind::Ret { value: None } => write!(f, "{name}")?,
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ModulePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.module.name())?;
        for id in self.module.body_ids() {
            writeln!(f)?;
            self.write_body(f, id)?;
        }
        Ok(())
    }
}

impl Module {
    /// Printable dump of the whole module.
    pub fn display(&self) -> ModulePrinter<'_> {
        ModulePrinter::new(self)
    }
}
