//! Line-oriented KASM text parser (§6 "KASM text format").
//!
//! A label line's first character is not a tab: `NAME:` followed by
//! anything, ignored, until the newline. An instruction line begins with
//! exactly one tab, then `opcode:` then space-separated arguments. This
//! mirrors the teacher project's `nom` + `nom_locate` combinator style
//! (see its own line-oriented assembly parser), scaled down to KASM's
//! simpler one-line-one-statement grammar.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1, space0, space1};
use nom::combinator::{map, map_res, opt, recognize};
use nom::multi::separated_list0;
use nom::sequence::{pair, preceded, tuple};
use nom::IResult;
use nom_locate::LocatedSpan;

use crate::ast::{Arg, Instruction, Line, Op};
use crate::error::LoadError;

pub type Span<'a> = LocatedSpan<&'a str>;

fn ident(input: Span) -> IResult<Span, String> {
    map(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '*'),
        |s: Span| s.fragment().to_string(),
    )(input)
}

fn register(input: Span) -> IResult<Span, Arg> {
    map_res(preceded(char('r'), digit1), |s: Span| {
        s.fragment().parse::<u8>().map(Arg::Reg)
    })(input)
}

fn number(input: Span) -> IResult<Span, Arg> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;
    let text = text.fragment();
    if text.contains('.') {
        let value: f64 = text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        Ok((rest, Arg::ImmFloat(value)))
    } else {
        let value: i64 = text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        Ok((rest, Arg::ImmInt(value)))
    }
}

fn name_arg(input: Span) -> IResult<Span, Arg> {
    map(ident, Arg::Name)(input)
}

fn arg(input: Span) -> IResult<Span, Arg> {
    alt((register, number, name_arg))(input)
}

fn args_list(input: Span) -> IResult<Span, Vec<Arg>> {
    separated_list0(space1, arg)(input)
}

fn opcode_line(input: Span) -> IResult<Span, (String, Vec<Arg>)> {
    let (input, _) = char('\t')(input)?;
    let (input, mnemonic) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = space0(input)?;
    let (input, args) = args_list(input)?;
    Ok((input, (mnemonic.fragment().to_string(), args)))
}

fn label_line(input: Span) -> IResult<Span, String> {
    let (input, name) = ident(input)?;
    let (input, _) = char(':')(input)?;
    Ok((input, name))
}

/// Parses a single non-blank line of KASM text into a [Line]. `line_no` is
/// 1-based, used only for error reporting since `LocatedSpan` positions
/// reset per call.
pub fn parse_line(text: &str, line_no: u32) -> Result<Line, LoadError> {
    let span = Span::new(text);
    if text.starts_with('\t') {
        let (_, (mnemonic, args)) = opcode_line(span).map_err(|_| LoadError::Syntax {
            line: line_no,
            text: text.to_string(),
        })?;
        let op = Op::from_mnemonic(&mnemonic).ok_or_else(|| LoadError::UnknownOpcode {
            mnemonic: mnemonic.clone(),
            line: line_no,
        })?;
        Ok(Line::Instr(Instruction { op, args, line: line_no }))
    } else {
        let (_, name) = label_line(span).map_err(|_| LoadError::Syntax {
            line: line_no,
            text: text.to_string(),
        })?;
        Ok(Line::Label { name, line: line_no })
    }
}

/// Parses a whole KASM file's worth of text into an ordered sequence of
/// [Line]s, skipping blank lines.
pub fn parse_lines(text: &str) -> Result<Vec<Line>, LoadError> {
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        lines.push(parse_line(raw, (i + 1) as u32)?);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label() {
        let line = parse_line("f:", 1).unwrap();
        assert_eq!(line, Line::Label { name: "f".to_string(), line: 1 });
    }

    #[test]
    fn parses_instruction_with_registers_and_immediate() {
        let line = parse_line("\tmovrn: r0 2", 2).unwrap();
        match line {
            Line::Instr(instr) => {
                assert_eq!(instr.op, Op::Movrn);
                assert_eq!(instr.args, vec![Arg::Reg(0), Arg::ImmInt(2)]);
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn parses_float_immediate() {
        let line = parse_line("\tmovrf: r0 1.5", 1).unwrap();
        match line {
            Line::Instr(instr) => assert_eq!(instr.args, vec![Arg::Reg(0), Arg::ImmFloat(1.5)]),
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn parses_name_args() {
        let line = parse_line("\tnewsv: s64 x", 1).unwrap();
        match line {
            Line::Instr(instr) => {
                assert_eq!(instr.op, Op::Newsv);
                assert_eq!(
                    instr.args,
                    vec![Arg::Name("s64".to_string()), Arg::Name("x".to_string())]
                );
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(parse_line("\tbogus: r0", 1).is_err());
    }
}
