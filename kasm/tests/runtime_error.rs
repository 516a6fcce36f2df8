//! Integration tests for the KASM runtime error taxonomy (SPEC_FULL.md §7,
//! plus the `TooManyCycles` addition from §4.2.9), mirroring the teacher
//! project's split between `tests/success.rs` and its failure counterpart.

use kasm::{RuntimeError, Vm, VmConfig};

#[test]
fn calling_an_unknown_label_is_unresolved() {
    let mut vm = Vm::new(VmConfig::default());
    vm.load("f:\n\tleave:\n").expect("loads");
    let err = vm.call("missing").expect_err("expected failure");
    assert_eq!(err, RuntimeError::UnresolvedLabel { name: "missing".to_string() });
}

#[test]
fn loading_an_undeclared_local_is_unknown() {
    let mut vm = Vm::new(VmConfig::default());
    vm.load("f:\n\tloadr: r0 ghost\n\tleave:\n").expect("loads");
    let err = vm.call_and_run("f").expect_err("expected failure");
    assert_eq!(err, RuntimeError::UnknownLocal { name: "ghost".to_string() });
}

#[test]
fn popping_an_empty_stack_underflows() {
    let mut vm = Vm::new(VmConfig::default());
    vm.load("f:\n\tpoprr: r0\n\tleave:\n").expect("loads");
    let err = vm.call_and_run("f").expect_err("expected failure");
    assert_eq!(err, RuntimeError::StackUnderflow);
}

#[test]
fn pushing_past_memory_size_overflows() {
    let mut vm = Vm::new(VmConfig { memory_size: 4, max_cycle_count: 1_000 });
    let err = vm.push(&7i64.to_le_bytes()).expect_err("expected failure");
    assert_eq!(err, RuntimeError::StackOverflow);
}

#[test]
fn dereferencing_past_the_memory_bound_is_illegal() {
    let mut vm = Vm::new(VmConfig::default());
    vm.load(
        "f:\n\
         \tmovrn: r0 1000000000\n\
         \tderef: r1 r0\n\
         \tleave:\n",
    )
    .expect("loads");
    let err = vm.call_and_run("f").expect_err("expected failure");
    assert!(matches!(err, RuntimeError::IllegalAddress { .. }));
}

#[test]
fn dividing_by_zero_is_reported() {
    let mut vm = Vm::new(VmConfig::default());
    vm.load(
        "f:\n\
         \tmovrn: r0 1\n\
         \tmovrn: r1 0\n\
         \tdivrr: r0 r0 r1\n\
         \tleave:\n",
    )
    .expect("loads");
    let err = vm.call_and_run("f").expect_err("expected failure");
    assert_eq!(err, RuntimeError::DivideByZero);
}

#[test]
fn exceeding_the_cycle_cap_stops_an_infinite_loop() {
    let config = VmConfig { memory_size: kappa::consts::DEFAULT_MEMORY_SIZE, max_cycle_count: 10 };
    let mut vm = Vm::new(config);
    vm.load(
        "f:\n\
         \tjmpal: f\n",
    )
    .expect("loads");
    let err = vm.call_and_run("f").expect_err("expected failure");
    assert_eq!(err, RuntimeError::TooManyCycles { limit: 10 });
}
