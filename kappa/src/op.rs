//! The operator type tag carried by operator tree nodes, and the precedence
//! table that drives tree construction (§4.1.1).

use std::fmt::{self, Display, Formatter};

/// Every operator the data model recognizes. `And`/`Or` are part of the
/// model but are never actually produced by the parser: the lexer's operator
/// alphabet has no doubled `&&`/`||` lexeme, so these two variants stay
/// unreachable here exactly as they were in the system this was distilled
/// from. They're kept for a complete, faithful `OperatorType` enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperatorType {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    L,
    Le,
    G,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Neg,
    Assign,
    PtrAssign,
    Ref,
    Deref,
}

impl OperatorType {
    /// Looks up the operator denoted by a lexed operator/assignment lexeme.
    /// `unary` distinguishes the prefix reading of `-`/`*`/`&`/`!` from their
    /// infix reading; callers decide which is in play from parser context
    /// (an operator token seen where an operand was expected is a prefix
    /// operator).
    pub fn from_lexeme(lexeme: &str, unary: bool) -> Option<Self> {
        Some(match (lexeme, unary) {
            ("+", false) => Self::Add,
            ("-", false) => Self::Sub,
            ("-", true) => Self::Neg,
            ("*", false) => Self::Mul,
            ("*", true) => Self::Deref,
            ("/", false) => Self::Div,
            ("%", false) => Self::Mod,
            ("<", false) => Self::L,
            ("<=", false) => Self::Le,
            (">", false) => Self::G,
            (">=", false) => Self::Ge,
            ("==", false) => Self::Eq,
            ("!=", false) => Self::Ne,
            ("!", true) => Self::Not,
            ("&", true) => Self::Ref,
            ("=", false) => Self::Assign,
            ("=>", false) => Self::PtrAssign,
            _ => return None,
        })
    }

    /// Binding power used by precedence climbing (§4.1.1 and §3). Unary
    /// prefix operators bind tighter than any binary operator.
    pub fn precedence(self) -> i32 {
        match self {
            Self::Assign | Self::PtrAssign => 0,
            Self::L | Self::Le | Self::G | Self::Ge | Self::Eq | Self::Ne => 1,
            Self::Add | Self::Sub => 2,
            Self::Mul | Self::Div | Self::Mod => 3,
            Self::Ref | Self::Deref | Self::Neg | Self::Not => 4,
            Self::And | Self::Or => 1,
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(self, Self::Ref | Self::Deref | Self::Neg | Self::Not)
    }

    pub fn is_assignment(self) -> bool {
        matches!(self, Self::Assign | Self::PtrAssign)
    }
}

impl Display for OperatorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::L => "<",
            Self::Le => "<=",
            Self::G => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::Neg => "-",
            Self::Assign => "=",
            Self::PtrAssign => "=>",
            Self::Ref => "&",
            Self::Deref => "*",
        };
        write!(f, "{}", s)
    }
}
