//! Two-pass KASM loader (§4.2.6, §9 "labels as pointers", §4.2.5 "struct
//! member offsets").
//!
//! Pass one walks the parsed lines once, building the flat instruction
//! array and a `label -> instruction index` table, while also buffering
//! every `newsv` it sees into a running per-label layout. A label's layout
//! is only committed to the struct member/type-size tables if its entire
//! body turned out to be `newsv` lines; a function's own locals and
//! parameters also emit `newsv` but never get promoted, since nothing ever
//! resolves a member name or bare-struct size against a function's label.
//! Pass two rewrites every label-referencing argument (`callf`/`jmpeq`/
//! `jmpal`) from a bare name into a resolved [crate::ast::Arg::Target].

use std::collections::HashMap;

use log::debug;

use crate::ast::{Arg, Instruction, Line, Op};
use crate::error::{LoadError, LoadResult};
use crate::parse::parse_lines;
use kappa::consts::type_size;

/// A fully loaded, label-resolved KASM program, ready to be driven by
/// [crate::vm::Vm].
#[derive(Debug, Clone)]
pub struct LoadedProgram {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
    /// Flat `member name -> byte offset` table built from every `newsv`
    /// sequence found under any label, used by `adszr` (§4.2.5). The
    /// opcode's arguments carry only a member name, not a type, so offsets
    /// are resolved in one global namespace.
    pub member_offsets: HashMap<String, u32>,
    /// Total byte size of every struct type, keyed by its label name —
    /// the sum of its members' sizes, used by `newsv`/`newav` when the
    /// declared type is a struct rather than a scalar or pointer (§4.2.5).
    pub type_sizes: HashMap<String, u32>,
}

pub fn load(text: &str) -> LoadResult<LoadedProgram> {
    let lines = parse_lines(text)?;

    let mut instructions = Vec::new();
    let mut labels = HashMap::new();
    let mut member_offsets = HashMap::new();
    let mut type_sizes = HashMap::new();

    // A type block is a label whose body is nothing but `newsv` lines
    // (§4.1.5: "type bodies are layouts only"). Functions and the globals
    // block always mix in other opcodes, so buffering each label's `newsv`s
    // and only committing them when the whole block is pure keeps ordinary
    // locals and parameters out of the struct member namespace.
    let mut pending_label = String::new();
    let mut pending_layout: Vec<(String, u32)> = Vec::new();
    let mut pending_offset: u32 = 0;
    let mut pending_is_pure_layout = false;

    let mut flush_layout = |member_offsets: &mut HashMap<String, u32>,
                            type_sizes: &mut HashMap<String, u32>,
                            pending_label: &str,
                            pending_layout: &mut Vec<(String, u32)>,
                            pending_offset: u32,
                            pending_is_pure_layout: bool| {
        if pending_is_pure_layout && !pending_layout.is_empty() {
            for (name, offset) in pending_layout.drain(..) {
                member_offsets.insert(name, offset);
            }
            type_sizes.insert(pending_label.to_string(), pending_offset);
        } else {
            pending_layout.clear();
        }
    };

    for line in lines {
        match line {
            Line::Label { name, .. } => {
                flush_layout(
                    &mut member_offsets,
                    &mut type_sizes,
                    &pending_label,
                    &mut pending_layout,
                    pending_offset,
                    pending_is_pure_layout,
                );
                pending_label = name.clone();
                labels.insert(name, instructions.len());
                pending_offset = 0;
                pending_is_pure_layout = true;
            }
            Line::Instr(instr) => {
                if instr.op == Op::Newsv {
                    if let (Some(type_name), Some(member_name)) =
                        (instr.args.get(0).and_then(Arg::as_name), instr.args.get(1).and_then(Arg::as_name))
                    {
                        pending_layout.push((member_name.to_string(), pending_offset));
                        pending_offset += type_size(type_name);
                    }
                } else {
                    pending_is_pure_layout = false;
                }
                instructions.push(instr);
            }
        }
    }
    flush_layout(
        &mut member_offsets,
        &mut type_sizes,
        &pending_label,
        &mut pending_layout,
        pending_offset,
        pending_is_pure_layout,
    );

    for instr in &mut instructions {
        if instr.op.has_label_arg() {
            for arg in &mut instr.args {
                if let Arg::Name(name) = arg {
                    let target = *labels
                        .get(name)
                        .ok_or_else(|| LoadError::UnresolvedLabel { name: name.clone(), line: instr.line })?;
                    *arg = Arg::Target(target);
                }
            }
        }
    }

    debug!(
        "loaded {} instructions, {} labels, {} struct members, {} struct types",
        instructions.len(),
        labels.len(),
        member_offsets.len(),
        type_sizes.len()
    );

    Ok(LoadedProgram { instructions, labels, member_offsets, type_sizes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_forward_label() {
        let text = "f:\n\tjmpal: g\ng:\n\tleave:\n";
        let program = load(text).expect("loads");
        match &program.instructions[0].args[0] {
            Arg::Target(idx) => assert_eq!(*idx, 1),
            other => panic!("expected target, got {:?}", other),
        }
    }

    #[test]
    fn unresolved_label_is_a_load_error() {
        let text = "f:\n\tjmpal: missing\n";
        assert!(matches!(load(text), Err(LoadError::UnresolvedLabel { .. })));
    }

    #[test]
    fn builds_struct_member_offsets() {
        let text = "Point:\n\tnewsv: s64 x\n\tnewsv: s64 y\n";
        let program = load(text).expect("loads");
        assert_eq!(program.member_offsets.get("x"), Some(&0));
        assert_eq!(program.member_offsets.get("y"), Some(&8));
        assert_eq!(program.type_sizes.get("Point"), Some(&16));
    }

    #[test]
    fn function_locals_do_not_pollute_struct_types() {
        let text = "f:\n\tnewsv: s64 x\n\tmovrn: r0 1\n\tleave:\n";
        let program = load(text).expect("loads");
        assert!(program.member_offsets.get("x").is_none());
        assert!(program.type_sizes.get("f").is_none());
    }
}
