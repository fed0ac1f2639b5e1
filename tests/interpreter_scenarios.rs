use multientry::core::{Cursor, FrozenBody, IntPredicate, LoweringError, Module};
use multientry::lower::{lower, ExecError, Interpreter};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn single_entry_add() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("add");
    let start = module.add_block(body, "start").unwrap();
    let i32_ty = module.i32();
    let add1 = module.create_entry("add1", &[i32_ty, i32_ty], i32_ty);
    module.register_entry(body, add1, start).unwrap();
    let x = module.argument(add1, 0).unwrap();
    let y = module.argument(add1, 1).unwrap();
    let mut cursor = Cursor::at(start);
    let sum = cursor.add(&mut module, x, y).unwrap();
    cursor.ret(&mut module, Some(sum)).unwrap();
    let frozen = module.finalize(body).unwrap();

    module.verify(frozen).unwrap();
    let program = lower(&module, frozen, &mut Interpreter::new()).unwrap();
    assert_eq!(program.call("add1", &[3, 4]), Ok(Some(7)));
    assert_eq!(program.call("add1", &[i32::MAX as i64, 1]), Ok(Some(i32::MIN as i64)));
}

/// Two entries that store x and y into body-wide slots and share the tail reading them back.
fn slot_module() -> (Module, FrozenBody) {
    let mut module = Module::new("m");
    let body = module.create_body("add");
    let entry1 = module.add_block(body, "entry1").unwrap();
    let entry2 = module.add_block(body, "entry2").unwrap();
    let tail = module.add_block(body, "tail").unwrap();
    let i32_ty = module.i32();
    let xs = module.add_slot(body, "xs", i32_ty).unwrap();
    let ys = module.add_slot(body, "ys", i32_ty).unwrap();
    let add1 = module.create_entry("add1", &[i32_ty, i32_ty], i32_ty);
    let add2 = module.create_entry("add2", &[i32_ty], i32_ty);
    module.register_entry(body, add1, entry1).unwrap();
    module.register_entry(body, add2, entry2).unwrap();
    let x1 = module.argument(add1, 0).unwrap();
    let y1 = module.argument(add1, 1).unwrap();
    let x2 = module.argument(add2, 0).unwrap();
    let seven = module.const_int(i32_ty, 7);

    let mut cursor = Cursor::at(entry1);
    cursor.store(&mut module, x1, xs).unwrap();
    cursor.store(&mut module, y1, ys).unwrap();
    cursor.br(&mut module, tail).unwrap();

    cursor.set_insertion_point(entry2);
    cursor.store(&mut module, x2, xs).unwrap();
    cursor.store(&mut module, seven, ys).unwrap();
    cursor.br(&mut module, tail).unwrap();

    cursor.set_insertion_point(tail);
    let x = cursor.load(&mut module, i32_ty, xs).unwrap();
    let y = cursor.load(&mut module, i32_ty, ys).unwrap();
    let sum = cursor.add(&mut module, x, y).unwrap();
    cursor.ret(&mut module, Some(sum)).unwrap();

    let frozen = module.finalize(body).unwrap();
    (module, frozen)
}

#[test]
fn entries_share_a_tail_through_slots() {
    init();
    let (module, frozen) = slot_module();
    module.verify(frozen).unwrap();

    let program = lower(&module, frozen, &mut Interpreter::new()).unwrap();
    assert_eq!(program.symbols(), &["add1".to_string(), "add2".to_string()]);
    assert_eq!(program.call("add2", &[5]), Ok(Some(12)));
    assert_eq!(program.call("add1", &[5, 5]), Ok(Some(10)));
    // slots start fresh on every call
    assert_eq!(program.call("add2", &[-7]), Ok(Some(0)));
}

#[test]
fn add_module_merges_y_from_three_edges() {
    init();
    let add = multientry::build_add_module("add").unwrap();
    let program = lower(&add.module, add.body, &mut Interpreter::new()).unwrap();

    assert_eq!(program.call("add1", &[3, 4]), Ok(Some(7)));
    assert_eq!(program.call("add1", &[5, -3]), Ok(Some(12)));
    assert_eq!(program.call("add2", &[5]), Ok(Some(15)));
    assert!(matches!(
        program.call("add2", &[5, 5]),
        Err(ExecError::ArityMismatch { expected: 1, found: 2, .. })
    ));
}

#[test]
fn merges_on_one_edge_are_parallel() {
    init();
    // loop: (a, b) = (b, a) swapped `n` times
    let mut module = Module::new("m");
    let body = module.create_body("swap");
    let start = module.add_block(body, "start").unwrap();
    let head = module.add_block(body, "head").unwrap();
    let step = module.add_block(body, "step").unwrap();
    let done = module.add_block(body, "done").unwrap();
    let i32_ty = module.i32();
    let f = module.create_entry("swap", &[i32_ty, i32_ty, i32_ty], i32_ty);
    module.register_entry(body, f, start).unwrap();
    let a0 = module.argument(f, 0).unwrap();
    let b0 = module.argument(f, 1).unwrap();
    let n0 = module.argument(f, 2).unwrap();
    let zero = module.const_int(i32_ty, 0);
    let one = module.const_int(i32_ty, 1);

    Cursor::at(start).br(&mut module, head).unwrap();
    let mut cursor = Cursor::at(head);
    let a = cursor.merge(&mut module, i32_ty, &[(start, a0)]).unwrap();
    let b = cursor.merge(&mut module, i32_ty, &[(start, b0)]).unwrap();
    let n = cursor.merge(&mut module, i32_ty, &[(start, n0)]).unwrap();
    let more = cursor.icmp(&mut module, IntPredicate::Sgt, n, zero).unwrap();
    cursor.cond_br(&mut module, more, step, done).unwrap();

    cursor.set_insertion_point(step);
    let n1 = cursor.sub(&mut module, n, one).unwrap();
    cursor.br(&mut module, head).unwrap();
    module.add_incoming(a, step, b).unwrap();
    module.add_incoming(b, step, a).unwrap();
    module.add_incoming(n, step, n1).unwrap();

    cursor.set_insertion_point(done);
    let ten = module.const_int(i32_ty, 10);
    let scaled = cursor.mul(&mut module, a, ten).unwrap();
    let result = cursor.add(&mut module, scaled, b).unwrap();
    cursor.ret(&mut module, Some(result)).unwrap();
    let frozen = module.finalize(body).unwrap();

    let program = lower(&module, frozen, &mut Interpreter::new()).unwrap();
    assert_eq!(program.call("swap", &[1, 2, 0]), Ok(Some(12)));
    assert_eq!(program.call("swap", &[1, 2, 1]), Ok(Some(21)));
    assert_eq!(program.call("swap", &[1, 2, 4]), Ok(Some(12)));
}

#[test]
fn invalid_body_is_not_lowered() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    module.add_block(body, "orphan").unwrap();
    let void = module.void_type();
    let f = module.create_entry("f", &[], void);
    module.register_entry(body, f, start).unwrap();
    Cursor::at(start).ret(&mut module, None).unwrap();
    let frozen = module.finalize(body).unwrap();

    let err = lower(&module, frozen, &mut Interpreter::new()).unwrap_err();
    assert!(matches!(err, LoweringError::Verification(_)));
}
