// The classic two-entry add module. `add1(x, y)` clamps a negative y to 7 and `add2(x)` starts
// with y fixed at 10; both converge on one shared tail that returns x + y. The tail merges y
// from its three predecessors and reads x back from a body-wide slot that both entry
// prologues store into, so it exercises both ways a shared region can consume per-entry
// values. The make_add driver and the integration tests build the same module from here.

//! The two-entry `add` example module.

use log::debug;

use crate::core::{
    Cursor, ConstructionResult, EntryId, FrozenBody, IntPredicate, Module,
};

/// A built and finalized add module.
#[derive(Debug)]
pub struct AddModule {
    pub module: Module,
    pub body: FrozenBody,
    pub add1: EntryId,
    pub add2: EntryId,
}

/// Build the add module with its shared body named `body_name`.
pub fn build_add_module(body_name: &str) -> ConstructionResult<AddModule> {
    let mut module = Module::new("multi_entry");
    let i32_ty = module.i32();

    let body = module.create_body(body_name);
    let entry1 = module.add_block(body, "Entry1")?;
    let y_is_seven = module.add_block(body, "Y_is_Seven")?;
    let entry2 = module.add_block(body, "Entry2")?;
    let tail = module.add_block(body, "Tail")?;
    let xs = module.add_slot(body, "xs", i32_ty)?;

    let add1 = module.create_entry("add1", &[i32_ty, i32_ty], i32_ty);
    let add2 = module.create_entry("add2", &[i32_ty], i32_ty);
    module.register_entry(body, add1, entry1)?;
    module.register_entry(body, add2, entry2)?;

    let x1 = module.argument(add1, 0)?;
    let y = module.argument(add1, 1)?;
    let x2 = module.argument(add2, 0)?;
    module.set_value_name(x1, "x")?;
    module.set_value_name(y, "y")?;
    module.set_value_name(x2, "x2")?;

    let zero = module.const_int(i32_ty, 0);
    let seven = module.const_int(i32_ty, 7);
    let ten = module.const_int(i32_ty, 10);

    // Entry1: spill x, test y < 0
    let mut cursor = Cursor::at(entry1);
    cursor.store(&mut module, x1, xs)?;
    let y_lt_zero = cursor.icmp(&mut module, IntPredicate::Slt, y, zero)?;
    module.set_value_name(y_lt_zero, "y__lt__0")?;
    cursor.cond_br(&mut module, y_lt_zero, y_is_seven, tail)?;

    cursor.set_insertion_point(y_is_seven);
    cursor.br(&mut module, tail)?;

    // Entry2: spill x, y is fixed
    cursor.set_insertion_point(entry2);
    cursor.store(&mut module, x2, xs)?;
    cursor.br(&mut module, tail)?;

    cursor.set_insertion_point(tail);
    let y3 = cursor.merge(&mut module, i32_ty, &[(entry1, y), (y_is_seven, seven)])?;
    module.add_incoming(y3, entry2, ten)?;
    module.set_value_name(y3, "y3")?;
    let x = cursor.load(&mut module, i32_ty, xs)?;
    module.set_value_name(x, "xv")?;
    let sum = cursor.add(&mut module, x, y3)?;
    module.set_value_name(sum, "addOut")?;
    cursor.ret(&mut module, Some(sum))?;

    let body = module.finalize(body)?;
    debug!("built add module with shared body {}", body_name);
    Ok(AddModule {
        module,
        body,
        add1,
        add2,
    })
}
