//! Load-time and run-time error taxonomies (§7, §4.2.9's `TooManyCycles`
//! addition), split into message vs. position the same way `kappa::error`
//! does, so a host formats both crates' errors identically.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub trait SourceError: std::error::Error {
    fn type_label(&self) -> &'static str;
    fn position(&self) -> Option<(u32, u32)>;
    fn fmt_msg(&self) -> String;
}

/// Failures that can occur while parsing KASM text or binding its labels
/// (§4.2.6: "A `callf`/`jmp*` whose name is absent is a fatal load error").
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum LoadError {
    #[error("malformed instruction line: {text}")]
    Syntax { line: u32, text: String },

    #[error("unresolved label `{name}`")]
    UnresolvedLabel { name: String, line: u32 },

    #[error("unknown opcode `{mnemonic}`")]
    UnknownOpcode { mnemonic: String, line: u32 },
}

impl SourceError for LoadError {
    fn type_label(&self) -> &'static str {
        "Error"
    }

    fn position(&self) -> Option<(u32, u32)> {
        match self {
            Self::Syntax { line, .. }
            | Self::UnresolvedLabel { line, .. }
            | Self::UnknownOpcode { line, .. } => Some((*line, 1)),
        }
    }

    fn fmt_msg(&self) -> String {
        self.to_string()
    }
}

/// Failures that can occur while a [crate::vm::Vm] is executing (§7).
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum RuntimeError {
    #[error("unresolved label `{name}`")]
    UnresolvedLabel { name: String },

    #[error("unknown local `{name}`")]
    UnknownLocal { name: String },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("illegal address {address:#x}")]
    IllegalAddress { address: i64 },

    #[error("divide by zero")]
    DivideByZero,

    #[error("exceeded maximum cycle count ({limit})")]
    TooManyCycles { limit: u64 },
}

impl SourceError for RuntimeError {
    fn type_label(&self) -> &'static str {
        "Error"
    }

    fn position(&self) -> Option<(u32, u32)> {
        None
    }

    fn fmt_msg(&self) -> String {
        self.to_string()
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
