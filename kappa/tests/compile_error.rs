//! Integration tests for the KAPPA compile-time error taxonomy (SPEC_FULL.md
//! §4.1.7). Each program here should fail assembly with a specific
//! [kappa::error::CompileError] variant, mirroring the teacher project's
//! `tests/compile_error.rs` split between success and failure scenarios.

use kappa::error::CompileError;

macro_rules! assert_compile_error {
    ($src:expr, $variant:pat) => {{
        let err = kappa::Compiler::new($src)
            .tokenize()
            .parse()
            .and_then(|c| c.assemble())
            .expect_err("expected a compile error");
        assert!(matches!(err, $variant), "unexpected error: {:?}", err);
    }};
}

#[test]
fn undeclared_variable_in_expression() {
    assert_compile_error!(
        "s64: f() { return missing; }",
        CompileError::UndeclaredVariable { .. }
    );
}

#[test]
fn undeclared_variable_as_call_target() {
    assert_compile_error!(
        "s64: f() { return ghost(); }",
        CompileError::UndeclaredVariable { .. }
    );
}

#[test]
fn undeclared_variable_on_assignment_target() {
    assert_compile_error!(
        "s64: f() { x = 3; return 0; }",
        CompileError::UndeclaredVariable { .. }
    );
}

#[test]
fn modulo_rejects_float_literal_on_left() {
    assert_compile_error!(
        "f64: f() { return 1.0 % 2; }",
        CompileError::UnallowedFloat { .. }
    );
}

#[test]
fn modulo_rejects_float_literal_on_right() {
    assert_compile_error!(
        "s64: f() { return 2 % 1.0; }",
        CompileError::UnallowedFloat { .. }
    );
}

#[test]
fn unexpected_token_on_malformed_declaration() {
    assert_compile_error!("s64 x;", CompileError::UnexpectedToken { .. });
}

#[test]
fn unexpected_token_on_dangling_operator() {
    assert_compile_error!("s64: f() { return 1 +; }", CompileError::UnexpectedToken { .. });
}

#[test]
fn unexpected_token_on_unclosed_block() {
    assert_compile_error!("s64: f() { return 1;", CompileError::UnexpectedToken { .. });
}
