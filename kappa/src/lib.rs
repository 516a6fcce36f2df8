//! `kappa` — lexer, tree builder, and KASM assembler for the KAPPA
//! language.
//!
//! The public entry point is [Compiler], a small type-state pipeline:
//! tokenizing, tree building, and assembly are each a distinct stage so a
//! caller (or a test) can stop early and inspect intermediate state.

pub mod assemble;
pub mod consts;
pub mod error;
pub mod lexer;
pub mod op;
pub mod parser;
pub mod scope;
pub mod token;
pub mod tree;

use log::debug;

use crate::assemble::Assembler;
use crate::error::{CompileError, WithSource};
use crate::lexer::Lexer;
use crate::parser::{Parser, Program};
use crate::token::Token;

/// Compiles KAPPA source straight through to KASM text, or returns the
/// first [CompileError] wrapped with its source line for display.
pub fn compile(source: &str) -> Result<String, WithSource<CompileError>> {
    Compiler::new(source)
        .tokenize()
        .parse()
        .map_err(|e| WithSource::new(vec![e], source))?
        .assemble()
        .map_err(|e| WithSource::new(vec![e], source))
}

/// A compilation pipeline carrying its current stage's output as `T`. Each
/// stage consumes `self` and returns a `Compiler` over the next stage's
/// type, so the compiler can never be asked to skip a step out of order.
pub struct Compiler<T> {
    source: String,
    state: T,
}

impl Compiler<()> {
    pub fn new(source: &str) -> Self {
        Self { source: source.to_string(), state: () }
    }

    pub fn tokenize(self) -> Compiler<Vec<Token>> {
        let tokens = Lexer::new(&self.source).tokenize();
        debug!("tokenized {} tokens", tokens.len());
        Compiler { source: self.source, state: tokens }
    }
}

impl Compiler<Vec<Token>> {
    pub fn tokens(&self) -> &[Token] {
        &self.state
    }

    pub fn parse(self) -> Result<Compiler<Program>, CompileError> {
        let program = Parser::new(self.state).parse_program()?;
        debug!("parsed {} top-level items", program.items.len());
        Ok(Compiler { source: self.source, state: program })
    }
}

impl Compiler<Program> {
    pub fn program(&self) -> &Program {
        &self.state
    }

    pub fn assemble(self) -> Result<String, CompileError> {
        let kasm = Assembler::new().assemble(&self.state)?;
        debug!("assembled {} bytes of KASM", kasm.len());
        Ok(kasm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_integer_arithmetic() {
        let kasm = compile("s64: f() { return 2 + 3 * 4; }").expect("compiles");
        assert!(kasm.contains("f:"));
        assert!(kasm.contains("movrn: r0 2"));
        assert!(kasm.contains("mulrr: r1 r1 r2"));
        assert!(kasm.contains("addrr: r0 r0 r1"));
        assert!(kasm.contains("leave:"));
    }

    #[test]
    fn compiles_float_arithmetic() {
        let kasm = compile("f64: f() { return 1.5 * 2.0; }").expect("compiles");
        assert!(kasm.contains("movrf: r0 1.5"));
        assert!(kasm.contains("movrf: r1 2.0"));
        assert!(kasm.contains("mulrr: r0 r0 r1"));
    }

    #[test]
    fn compiles_while_loop() {
        let kasm = compile(
            "s64: f() { s64: i = 0; while (i < 10) { i = i + 1; } return i; }",
        )
        .expect("compiles");
        assert!(kasm.contains("lesrr"));
        assert!(kasm.contains("jmpeq"));
        assert!(kasm.contains("jmpal"));
    }

    #[test]
    fn compiles_pointer_deref_param() {
        let kasm = compile("s64: g(s64: *p) { return *p; }").expect("compiles");
        assert!(kasm.contains("g:"));
        assert!(kasm.contains("poprr"));
        assert!(kasm.contains("deref"));
    }

    #[test]
    fn compiles_array_index() {
        let kasm =
            compile("s64: f() { s64: a[3]; a[1] = 7; return a[1]; }").expect("compiles");
        assert!(kasm.contains("newav: s64 a 3"));
        assert!(kasm.contains("savea"));
    }

    #[test]
    fn compiles_recursive_call() {
        let kasm = compile(
            "s64: fib(s64: n) { if (n < 2) { return n; } return fib(n-1) + fib(n-2); }",
        )
        .expect("compiles");
        assert!(kasm.contains("callf: fib"));
        assert!(kasm.contains("fib:"));
    }

    #[test]
    fn undeclared_variable_is_reported() {
        let err = Compiler::new("s64: f() { return x; }")
            .tokenize()
            .parse()
            .expect("parses")
            .assemble()
            .expect_err("undeclared");
        assert!(matches!(err, CompileError::UndeclaredVariable { .. }));
    }

    #[test]
    fn modulo_on_float_literal_rejected() {
        let err = Compiler::new("f64: f() { return 1.0 % 2.0; }")
            .tokenize()
            .parse()
            .expect("parses")
            .assemble()
            .expect_err("unallowed float");
        assert!(matches!(err, CompileError::UnallowedFloat { .. }));
    }

    #[test]
    fn if_else_lowers_to_two_labels() {
        let kasm = compile("s64: f(s64: n) { if (n < 0) { return 0; } else { return 1; } }")
            .expect("compiles");
        assert!(kasm.matches("jmpeq").count() >= 1);
        assert!(kasm.matches("jmpal").count() >= 1);
    }
}
