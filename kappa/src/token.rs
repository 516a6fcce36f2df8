//! Token definitions for the KAPPA lexer. A [Token] pairs a [TokenKind] with
//! the exact source text and position it came from, so that every later
//! stage (tree builder, assembler, error reporting) can point back at the
//! original line and column.

use std::fmt::{self, Display, Formatter};

/// The reserved words recognized by the lexer. Anything in this list that
/// would otherwise lex as an identifier is reclassified to [TokenKind::Keyword].
pub const KEYWORDS: &[&str] =
    &["if", "else", "while", "do", "return", "type"];

/// The category of a single token. Kinds are assigned by the lexer; `keyword`
/// and `number` can only arise after the post-lex reclassification described
/// in the lexer itself (a bare word that matches [KEYWORDS], or a word whose
/// first character is a digit).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Unknown,
    Eof,
    Identifier,
    Number,
    String,
    Operator,
    Comment,
    NewStatement,
    EndStatement,
    NewExpression,
    EndExpression,
    NewIndex,
    EndIndex,
    Declarator,
    Keyword,
    Endline,
    Separator,
    Assignment,
    Member,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Eof => "end of file",
            Self::Identifier => "identifier",
            Self::Number => "number",
            Self::String => "string",
            Self::Operator => "operator",
            Self::Comment => "comment",
            Self::NewStatement => "'{'",
            Self::EndStatement => "'}'",
            Self::NewExpression => "'('",
            Self::EndExpression => "')'",
            Self::NewIndex => "'['",
            Self::EndIndex => "']'",
            Self::Declarator => "':'",
            Self::Keyword => "keyword",
            Self::Endline => "';'",
            Self::Separator => "','",
            Self::Assignment => "assignment",
            Self::Member => "'.'",
        };
        write!(f, "{}", s)
    }
}

/// A single lexed token: its category, its exact text, and where in the
/// source it was found.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    pub source_index: usize,
    pub lexeme: String,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        line: usize,
        column: usize,
        source_index: usize,
        lexeme: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            line,
            column,
            source_index,
            lexeme: lexeme.into(),
        }
    }

    /// Whether this token is the reserved word `"type"`, the only keyword
    /// that changes how a declaration is lowered (struct type vs scalar/array
    /// vs function).
    pub fn is_type_keyword(&self) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme == "type"
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}
