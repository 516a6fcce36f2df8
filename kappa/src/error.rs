//! Compile-time error taxonomy (§4.1.7) and the position/message split that
//! lets every host format errors identically.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::Token;

/// One compile-time failure. Every variant carries the offending token's
/// line, column and lexeme so a host can render `"Error | <line>-<col>:
/// <text>"` without re-walking the tree.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum CompileError {
    #[error("undeclared variable `{name}`")]
    UndeclaredVariable { name: String, line: usize, column: usize },

    #[error("invalid declaration")]
    InvalidDeclaration { line: usize, column: usize },

    #[error("invalid end of expression")]
    InvalidEndExpression { line: usize, column: usize },

    #[error("junk after declaration")]
    JunkAfterDeclaration { line: usize, column: usize },

    #[error("expected assignment")]
    ExpectedAssignment { line: usize, column: usize },

    #[error("expected constant")]
    ExpectedConstant { line: usize, column: usize },

    #[error("unexpected token `{lexeme}`")]
    UnexpectedToken { lexeme: String, line: usize, column: usize },

    #[error("modulo is not allowed on floats")]
    UnallowedFloat { line: usize, column: usize },
}

impl CompileError {
    pub fn unexpected(token: &Token) -> Self {
        Self::UnexpectedToken {
            lexeme: token.lexeme.clone(),
            line: token.line,
            column: token.column,
        }
    }

    pub fn undeclared(token: &Token) -> Self {
        Self::UndeclaredVariable {
            name: token.lexeme.clone(),
            line: token.line,
            column: token.column,
        }
    }
}

impl SourceError for CompileError {
    fn type_label(&self) -> &'static str {
        "Error"
    }

    fn position(&self) -> (usize, usize) {
        match self {
            Self::UndeclaredVariable { line, column, .. }
            | Self::InvalidDeclaration { line, column }
            | Self::InvalidEndExpression { line, column }
            | Self::JunkAfterDeclaration { line, column }
            | Self::ExpectedAssignment { line, column }
            | Self::ExpectedConstant { line, column }
            | Self::UnexpectedToken { line, column, .. }
            | Self::UnallowedFloat { line, column } => (*line, *column),
        }
    }

    fn fmt_msg(&self) -> String {
        self.to_string()
    }
}

/// Separates an error's *message* from its *position*, so both the wire
/// format (`"<Type> | <line>-<col>: <text>"`) and any richer host rendering
/// can be built from the same two pieces without re-deriving either.
pub trait SourceError: std::error::Error {
    fn type_label(&self) -> &'static str;
    fn position(&self) -> (usize, usize);
    fn fmt_msg(&self) -> String;
}

/// An error paired with the line of source it occurred on, for display.
#[derive(Clone, Debug)]
pub struct SourceErrorWrapper<E> {
    pub error: E,
    pub spanned_source: String,
}

impl<E: SourceError> Display for SourceErrorWrapper<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (line, col) = self.error.position();
        write!(
            f,
            "{} | {}-{}: {}",
            self.error.type_label(),
            line,
            col,
            self.error.fmt_msg()
        )
    }
}

/// A compilation's full set of errors, plus the source they refer to, so a
/// caller can print every failure with full context in one shot.
#[derive(Clone, Debug)]
pub struct WithSource<E> {
    pub errors: Vec<SourceErrorWrapper<E>>,
    pub source: String,
}

impl<E: SourceError> WithSource<E> {
    pub fn new(errors: Vec<E>, source: &str) -> Self {
        let lines: Vec<&str> = source.lines().collect();
        let errors = errors
            .into_iter()
            .map(|error| {
                let (line, _) = error.position();
                let spanned_source = lines.get(line.saturating_sub(1)).unwrap_or(&"").to_string();
                SourceErrorWrapper { error, spanned_source }
            })
            .collect();
        Self { errors, source: source.to_string() }
    }
}

impl<E: SourceError> Display for WithSource<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for err in &self.errors {
            writeln!(f, "{}", err)?;
        }
        Ok(())
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
