//! End-to-end KAPPA -> KASM -> VM scenarios (SPEC_FULL.md §8 S1-S6, plus the
//! `else`/`do-while` forms added in §4.1.8). Mirrors the teacher project's
//! `tests/success.rs`: compile a whole program, drive it through the public
//! VM host API, and assert on the numeric result.

use kasm::{Vm, VmConfig};

fn run(src: &str, entry: &str) -> f64 {
    let kasm_text = kappa::compile(src).expect("compiles");
    let mut vm = Vm::new(VmConfig::default());
    vm.load(&kasm_text).expect("loads");
    vm.call_and_run(entry).expect("runs")
}

#[test]
fn s1_integer_arithmetic_precedence() {
    assert_eq!(run("s64: f() { return 2 + 3 * 4; }", "f"), 14.0);
}

#[test]
fn s2_float_arithmetic() {
    assert_eq!(run("f64: f() { return 1.5 * 2.0; }", "f"), 3.0);
}

#[test]
fn s3_while_loop_counts_to_ten() {
    assert_eq!(
        run(
            "s64: f() { s64: i = 0; while (i < 10) { i = i + 1; } return i; }",
            "f"
        ),
        10.0
    );
}

#[test]
fn s5_array_index_read_write() {
    assert_eq!(
        run("s64: f() { s64: a[3]; a[1] = 7; return a[1]; }", "f"),
        7.0
    );
}

#[test]
fn s6_recursive_fibonacci() {
    let kasm_text = kappa::compile(
        "s64: fib(s64: n) { if (n < 2) { return n; } return fib(n-1) + fib(n-2); }",
    )
    .expect("compiles");
    let mut vm = Vm::new(VmConfig::default());
    vm.load(&kasm_text).expect("loads");
    vm.push(&10i64.to_le_bytes()).expect("push");
    assert_eq!(vm.call_and_run("fib").expect("runs"), 55.0);
}

#[test]
fn if_else_picks_the_right_branch() {
    let src = "s64: f(s64: n) { if (n < 0) { return 0; } else { return 1; } }";
    let kasm_text = kappa::compile(src).expect("compiles");

    let mut negative = Vm::new(VmConfig::default());
    negative.load(&kasm_text).expect("loads");
    negative.push(&(-5i64).to_le_bytes()).expect("push");
    assert_eq!(negative.call_and_run("f").expect("runs"), 0.0);

    let mut positive = Vm::new(VmConfig::default());
    positive.load(&kasm_text).expect("loads");
    positive.push(&5i64.to_le_bytes()).expect("push");
    assert_eq!(positive.call_and_run("f").expect("runs"), 1.0);
}

#[test]
fn do_while_runs_body_at_least_once() {
    // The condition is false from the start; a `while` would never enter the
    // body, but `do`/`while` must run it exactly once before exiting.
    let result = run(
        "s64: f() { s64: i = 0; do { i = i + 1; } while (i < 0); return i; }",
        "f",
    );
    assert_eq!(result, 1.0);
}

#[test]
fn do_while_loops_until_condition_false() {
    let result = run(
        "s64: f() { s64: i = 0; do { i = i + 1; } while (i < 5); return i; }",
        "f",
    );
    assert_eq!(result, 5.0);
}

#[test]
fn struct_member_assignment_and_read() {
    let result = run(
        "type: Point { s64: x; s64: y; } \
         s64: f() { Point: p; p.x = 3; p.y = 4; return p.x + p.y; }",
        "f",
    );
    assert_eq!(result, 7.0);
}

#[test]
fn multi_arg_call_binds_left_to_right() {
    let result = run(
        "s64: sub(s64: a, s64: b) { return a - b; } \
         s64: f() { return sub(10, 3); }",
        "f",
    );
    assert_eq!(result, 7.0);
}

#[test]
fn mixed_int_float_arithmetic_reinterprets_bits() {
    // §4.2.3: a mixed-tag op never numerically converts the int operand, it
    // bit-reinterprets it as an f64. `movrn: r1 1` does NOT produce `1.0`
    // when added to a float; this asserts the VM honors that quirk.
    let mut vm = Vm::new(VmConfig::default());
    vm.load(
        "f:\n\
         \tmovrf: r0 1.0\n\
         \tmovrn: r1 1\n\
         \taddrr: r0 r0 r1\n\
         \tleave:\n",
    )
    .expect("loads");
    let result = vm.call_and_run("f").expect("runs");
    let expected = 1.0 + f64::from_bits(1u64);
    assert_eq!(result, expected);
}
