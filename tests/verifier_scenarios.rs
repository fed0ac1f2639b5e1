use multientry::core::{Cursor, IntPredicate, Module, VerificationError};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A merge naming `p2` as an incoming block while its block is entered from `p1` and `p3`.
#[test]
fn merge_with_wrong_predecessors_names_its_block() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let p1 = module.add_block(body, "p1").unwrap();
    let p2 = module.add_block(body, "p2").unwrap();
    let p3 = module.add_block(body, "p3").unwrap();
    let join = module.add_block(body, "join").unwrap();
    let i1_ty = module.i1();
    let i32_ty = module.i32();
    let f = module.create_entry("f", &[i1_ty], i32_ty);
    module.register_entry(body, f, start).unwrap();
    let c = module.argument(f, 0).unwrap();
    let one = module.const_int(i32_ty, 1);
    let two = module.const_int(i32_ty, 2);

    Cursor::at(start).cond_br(&mut module, c, p1, p3).unwrap();
    Cursor::at(p1).cond_br(&mut module, c, join, p2).unwrap();
    Cursor::at(p2).ret(&mut module, Some(one)).unwrap();
    Cursor::at(p3).br(&mut module, join).unwrap();
    let mut cursor = Cursor::at(join);
    let m = cursor
        .merge(&mut module, i32_ty, &[(p1, one), (p2, two)])
        .unwrap();
    cursor.ret(&mut module, Some(m)).unwrap();
    let frozen = module.finalize(body).unwrap();

    let err = module.verify(frozen).unwrap_err();
    assert_eq!(
        err,
        VerificationError::MergeMismatch {
            body: "f".into(),
            block: "join".into(),
            missing: vec!["p3".into()],
            unexpected: vec!["p2".into()],
        }
    );
    assert!(err.to_string().contains("join"));
}

#[test]
fn argument_used_in_another_entrys_prologue_is_a_leak() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let entry1 = module.add_block(body, "entry1").unwrap();
    let entry2 = module.add_block(body, "entry2").unwrap();
    let tail = module.add_block(body, "tail").unwrap();
    let i32_ty = module.i32();
    let void = module.void_type();
    let e1 = module.create_entry("e1", &[i32_ty], void);
    let e2 = module.create_entry("e2", &[i32_ty], void);
    module.register_entry(body, e1, entry1).unwrap();
    module.register_entry(body, e2, entry2).unwrap();
    let x1 = module.argument(e1, 0).unwrap();

    Cursor::at(entry1).br(&mut module, tail).unwrap();
    let mut cursor = Cursor::at(entry2);
    cursor.add(&mut module, x1, x1).unwrap();
    cursor.br(&mut module, tail).unwrap();
    Cursor::at(tail).ret(&mut module, None).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::ArgumentLeak {
            body: "f".into(),
            entry: "e1".into(),
            block: "entry2".into(),
        })
    );
}

#[test]
fn argument_used_in_shared_tail_is_a_leak() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let entry1 = module.add_block(body, "entry1").unwrap();
    let entry2 = module.add_block(body, "entry2").unwrap();
    let tail = module.add_block(body, "tail").unwrap();
    let i32_ty = module.i32();
    let e1 = module.create_entry("e1", &[i32_ty], i32_ty);
    let e2 = module.create_entry("e2", &[], i32_ty);
    module.register_entry(body, e1, entry1).unwrap();
    module.register_entry(body, e2, entry2).unwrap();
    let x = module.argument(e1, 0).unwrap();

    Cursor::at(entry1).br(&mut module, tail).unwrap();
    Cursor::at(entry2).br(&mut module, tail).unwrap();
    Cursor::at(tail).ret(&mut module, Some(x)).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert!(matches!(
        module.verify(frozen),
        Err(VerificationError::ArgumentLeak { ref block, .. }) if block == "tail"
    ));
}

#[test]
fn unreachable_block_is_rejected() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let orphan = module.add_block(body, "orphan").unwrap();
    let void = module.void_type();
    let f = module.create_entry("f", &[], void);
    module.register_entry(body, f, start).unwrap();
    Cursor::at(start).ret(&mut module, None).unwrap();
    Cursor::at(orphan).ret(&mut module, None).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::UnreachableBlock {
            body: "f".into(),
            block: "orphan".into(),
        })
    );
}

#[test]
fn terminator_in_the_middle_is_rejected() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let i32_ty = module.i32();
    let void = module.void_type();
    let f = module.create_entry("f", &[], void);
    module.register_entry(body, f, start).unwrap();
    let one = module.const_int(i32_ty, 1);
    let mut cursor = Cursor::at(start);
    cursor.ret(&mut module, None).unwrap();
    cursor.add(&mut module, one, one).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::MisplacedTerminator {
            body: "f".into(),
            block: "start".into(),
        })
    );
}

#[test]
fn mixed_width_operands_are_a_type_mismatch() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let i32_ty = module.i32();
    let i64_ty = module.i64();
    let f = module.create_entry("f", &[i32_ty, i64_ty], i32_ty);
    module.register_entry(body, f, start).unwrap();
    let a = module.argument(f, 0).unwrap();
    let b = module.argument(f, 1).unwrap();
    let mut cursor = Cursor::at(start);
    let sum = cursor.add(&mut module, a, b).unwrap();
    cursor.ret(&mut module, Some(sum)).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert!(matches!(
        module.verify(frozen),
        Err(VerificationError::TypeMismatch { inst: 0, .. })
    ));
}

#[test]
fn non_boolean_branch_condition_is_a_type_mismatch() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let done = module.add_block(body, "done").unwrap();
    let i32_ty = module.i32();
    let void = module.void_type();
    let f = module.create_entry("f", &[i32_ty], void);
    module.register_entry(body, f, start).unwrap();
    let x = module.argument(f, 0).unwrap();
    Cursor::at(start).cond_br(&mut module, x, done, done).unwrap();
    Cursor::at(done).ret(&mut module, None).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert!(matches!(
        module.verify(frozen),
        Err(VerificationError::TypeMismatch { ref expected, .. }) if expected == "i1"
    ));
}

#[test]
fn partially_shared_prologue_is_rejected() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let a = module.add_block(body, "a").unwrap();
    let b = module.add_block(body, "b").unwrap();
    let c = module.add_block(body, "c").unwrap();
    let ab = module.add_block(body, "ab").unwrap();
    let tail = module.add_block(body, "tail").unwrap();
    let void = module.void_type();
    for (name, block) in [("ea", a), ("eb", b), ("ec", c)] {
        let entry = module.create_entry(name, &[], void);
        module.register_entry(body, entry, block).unwrap();
    }
    Cursor::at(a).br(&mut module, ab).unwrap();
    Cursor::at(b).br(&mut module, ab).unwrap();
    Cursor::at(ab).br(&mut module, tail).unwrap();
    Cursor::at(c).br(&mut module, tail).unwrap();
    Cursor::at(tail).ret(&mut module, None).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::OverlappingPrologue {
            body: "f".into(),
            block: "ab".into(),
            entries: vec!["ea".into(), "eb".into()],
        })
    );
}

#[test]
fn compare_feeding_branch_verifies() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let neg = module.add_block(body, "neg").unwrap();
    let pos = module.add_block(body, "pos").unwrap();
    let i32_ty = module.i32();
    let f = module.create_entry("f", &[i32_ty], i32_ty);
    module.register_entry(body, f, start).unwrap();
    let x = module.argument(f, 0).unwrap();
    let zero = module.const_int(i32_ty, 0);
    let mut cursor = Cursor::at(start);
    let is_neg = cursor.icmp(&mut module, IntPredicate::Slt, x, zero).unwrap();
    cursor.cond_br(&mut module, is_neg, neg, pos).unwrap();
    Cursor::at(neg).ret(&mut module, Some(zero)).unwrap();
    Cursor::at(pos).ret(&mut module, Some(x)).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(module.verify(frozen), Ok(()));
}

/// `e1` computes `t` in its own prologue; `e2` reaches the tail without it.
fn prologue_value_module(through_merge: bool) -> Result<(), VerificationError> {
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let entry1 = module.add_block(body, "entry1").unwrap();
    let entry2 = module.add_block(body, "entry2").unwrap();
    let tail = module.add_block(body, "tail").unwrap();
    let i32_ty = module.i32();
    let e1 = module.create_entry("e1", &[i32_ty], i32_ty);
    let e2 = module.create_entry("e2", &[], i32_ty);
    module.register_entry(body, e1, entry1).unwrap();
    module.register_entry(body, e2, entry2).unwrap();
    let x = module.argument(e1, 0).unwrap();
    let zero = module.const_int(i32_ty, 0);
    let one = module.const_int(i32_ty, 1);

    let mut cursor = Cursor::at(entry1);
    let t = cursor.add(&mut module, x, one).unwrap();
    cursor.br(&mut module, tail).unwrap();
    Cursor::at(entry2).br(&mut module, tail).unwrap();
    cursor.set_insertion_point(tail);
    let result = if through_merge {
        cursor
            .merge(&mut module, i32_ty, &[(entry1, t), (entry2, zero)])
            .unwrap()
    } else {
        t
    };
    cursor.ret(&mut module, Some(result)).unwrap();
    let frozen = module.finalize(body).unwrap();
    module.verify(frozen)
}

#[test]
fn prologue_result_used_in_shared_tail_is_a_leak() {
    init();
    assert_eq!(
        prologue_value_module(false),
        Err(VerificationError::ValueLeak {
            body: "f".into(),
            entry: "e2".into(),
            def: "entry1".into(),
            block: "tail".into(),
        })
    );
}

#[test]
fn prologue_result_may_reach_the_tail_through_a_merge() {
    init();
    assert_eq!(prologue_value_module(true), Ok(()));
}

#[test]
fn merge_in_entry_block_lists_the_entry_as_missing() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let i32_ty = module.i32();
    let f = module.create_entry("f", &[], i32_ty);
    module.register_entry(body, f, start).unwrap();
    let mut cursor = Cursor::at(start);
    let m = cursor.merge(&mut module, i32_ty, &[]).unwrap();
    cursor.ret(&mut module, Some(m)).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::MergeMismatch {
            body: "f".into(),
            block: "start".into(),
            missing: vec!["entry f".into()],
            unexpected: vec![],
        })
    );
}

#[test]
fn argument_merged_from_shared_predecessor_is_a_leak() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let entry1 = module.add_block(body, "entry1").unwrap();
    let entry2 = module.add_block(body, "entry2").unwrap();
    let tail = module.add_block(body, "tail").unwrap();
    let join = module.add_block(body, "join").unwrap();
    let i32_ty = module.i32();
    let e1 = module.create_entry("e1", &[i32_ty], i32_ty);
    let e2 = module.create_entry("e2", &[], i32_ty);
    module.register_entry(body, e1, entry1).unwrap();
    module.register_entry(body, e2, entry2).unwrap();
    let x = module.argument(e1, 0).unwrap();

    Cursor::at(entry1).br(&mut module, tail).unwrap();
    Cursor::at(entry2).br(&mut module, tail).unwrap();
    Cursor::at(tail).br(&mut module, join).unwrap();
    let mut cursor = Cursor::at(join);
    let m = cursor.merge(&mut module, i32_ty, &[(tail, x)]).unwrap();
    cursor.ret(&mut module, Some(m)).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::ArgumentLeak {
            body: "f".into(),
            entry: "e1".into(),
            block: "join".into(),
        })
    );
}

#[test]
fn slot_of_another_body_is_foreign() {
    init();
    let mut module = Module::new("m");
    let other = module.create_body("g");
    let i32_ty = module.i32();
    let gslot = module.add_slot(other, "gs", i32_ty).unwrap();
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let f = module.create_entry("f", &[], i32_ty);
    module.register_entry(body, f, start).unwrap();
    let mut cursor = Cursor::at(start);
    let v = cursor.load(&mut module, i32_ty, gslot).unwrap();
    cursor.ret(&mut module, Some(v)).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::ForeignValue {
            body: "f".into(),
            block: "start".into(),
            inst: 0,
        })
    );
}

#[test]
fn merge_operand_of_another_type_is_a_mismatch() {
    init();
    let mut module = Module::new("m");
    let body = module.create_body("f");
    let start = module.add_block(body, "start").unwrap();
    let join = module.add_block(body, "join").unwrap();
    let i32_ty = module.i32();
    let i64_ty = module.i64();
    let f = module.create_entry("f", &[i32_ty], i64_ty);
    module.register_entry(body, f, start).unwrap();
    let x = module.argument(f, 0).unwrap();

    Cursor::at(start).br(&mut module, join).unwrap();
    let mut cursor = Cursor::at(join);
    let m = cursor.merge(&mut module, i64_ty, &[(start, x)]).unwrap();
    cursor.ret(&mut module, Some(m)).unwrap();
    let frozen = module.finalize(body).unwrap();

    assert_eq!(
        module.verify(frozen),
        Err(VerificationError::TypeMismatch {
            body: "f".into(),
            block: "join".into(),
            inst: 0,
            expected: "i64".into(),
            found: "i32".into(),
        })
    );
}
