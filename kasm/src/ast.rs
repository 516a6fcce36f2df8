//! The KASM instruction model (§3 "VM program", §4.2.2's opcode table).
//!
//! [Op] is the strongly typed opcode set; [Arg] is an instruction operand in
//! whatever form it's in at the time — a source name before label/--- no
//! wait, arguments are either register indices, immediates, or owned names,
//! exactly as §3 describes, with one addition: [Arg::Target] is what a
//! `Name` becomes for `callf`/`jmpeq`/`jmpal` once the loader's second pass
//! has resolved it to a concrete instruction index (§4.2.6, §9 "labels as
//! pointers").

use std::fmt::{self, Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Pushr,
    Poprr,
    Newsv,
    Newav,
    Leave,
    Movrn,
    Movrf,
    Movrr,
    Callf,
    Loadr,
    Saver,
    Refsv,
    Deref,
    Savea,
    Adszr,
    Addrr,
    Subrr,
    Mulrr,
    Divrr,
    Modrr,
    Lesrr,
    Grerr,
    Leqrr,
    Geqrr,
    Equrr,
    Nequrr,
    Negrr,
    Cmprd,
    Jmpeq,
    Jmpal,
}

impl Op {
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "pushr" => Self::Pushr,
            "poprr" => Self::Poprr,
            "newsv" => Self::Newsv,
            "newav" => Self::Newav,
            "leave" => Self::Leave,
            "movrn" => Self::Movrn,
            "movrf" => Self::Movrf,
            "movrr" => Self::Movrr,
            "callf" => Self::Callf,
            "loadr" => Self::Loadr,
            "saver" => Self::Saver,
            "refsv" => Self::Refsv,
            "deref" => Self::Deref,
            "savea" => Self::Savea,
            "adszr" => Self::Adszr,
            "addrr" => Self::Addrr,
            "subrr" => Self::Subrr,
            "mulrr" => Self::Mulrr,
            "divrr" => Self::Divrr,
            "modrr" => Self::Modrr,
            "lesrr" => Self::Lesrr,
            "grerr" => Self::Grerr,
            "leqrr" => Self::Leqrr,
            "geqrr" => Self::Geqrr,
            "equrr" => Self::Equrr,
            "nequrr" => Self::Nequrr,
            "negrr" => Self::Negrr,
            "cmprd" => Self::Cmprd,
            "jmpeq" => Self::Jmpeq,
            "jmpal" => Self::Jmpal,
            _ => return None,
        })
    }

    /// Whether this opcode's single name argument is a label reference that
    /// the loader must resolve (as opposed to `newsv`/`saver`/etc., whose
    /// name arguments refer to locals, not labels).
    pub fn has_label_arg(self) -> bool {
        matches!(self, Self::Callf | Self::Jmpeq | Self::Jmpal)
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pushr => "pushr",
            Self::Poprr => "poprr",
            Self::Newsv => "newsv",
            Self::Newav => "newav",
            Self::Leave => "leave",
            Self::Movrn => "movrn",
            Self::Movrf => "movrf",
            Self::Movrr => "movrr",
            Self::Callf => "callf",
            Self::Loadr => "loadr",
            Self::Saver => "saver",
            Self::Refsv => "refsv",
            Self::Deref => "deref",
            Self::Savea => "savea",
            Self::Adszr => "adszr",
            Self::Addrr => "addrr",
            Self::Subrr => "subrr",
            Self::Mulrr => "mulrr",
            Self::Divrr => "divrr",
            Self::Modrr => "modrr",
            Self::Lesrr => "lesrr",
            Self::Grerr => "grerr",
            Self::Leqrr => "leqrr",
            Self::Geqrr => "geqrr",
            Self::Equrr => "equrr",
            Self::Nequrr => "nequrr",
            Self::Negrr => "negrr",
            Self::Cmprd => "cmprd",
            Self::Jmpeq => "jmpeq",
            Self::Jmpal => "jmpal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Reg(u8),
    ImmInt(i64),
    ImmFloat(f64),
    Name(String),
    /// A resolved instruction index, substituted in for `Name` on label-arg
    /// positions by the loader's second pass.
    Target(usize),
}

impl Arg {
    pub fn as_reg(&self) -> Option<u8> {
        match self {
            Self::Reg(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<usize> {
        match self {
            Self::Target(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::ImmInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::ImmFloat(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub args: Vec<Arg>,
    pub line: u32,
}

/// A single parsed line of KASM text, before label resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Line {
    Label { name: String, line: u32 },
    Instr(Instruction),
}
