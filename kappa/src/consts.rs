//! Shared constants mirrored from the original type system so the compiler
//! and the `kasm` loader agree on scalar sizes without either depending on
//! the other.

/// Byte size of a scalar base type name, ignoring any leading `*`s (which
/// are always pointer-sized, §4.2.5). Returns `None` for unknown/struct
/// type names — those are resolved against the KASM type layout table at
/// load time instead.
pub fn scalar_size(base_type: &str) -> Option<u32> {
    Some(match base_type {
        "s8" | "u8" => 1,
        "s16" | "u16" => 2,
        "s32" | "u32" | "f32" => 4,
        "s64" | "u64" | "f64" => 8,
        _ => return None,
    })
}

/// Size in bytes of any pointer (a type name with one or more leading `*`).
pub const POINTER_SIZE: u32 = 8;

pub fn type_size(type_name: &str) -> u32 {
    let base = type_name.trim_start_matches('*');
    if base.len() != type_name.len() {
        return POINTER_SIZE;
    }
    scalar_size(base).unwrap_or(POINTER_SIZE)
}

/// Default VM memory size (§3 VM program: "memory: byte array (default 64
/// KiB)").
pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024;

/// Guards against runaway/non-terminating KASM (§4.2.9, modeled on the
/// teacher project's `MAX_CYCLE_COUNT`).
pub const DEFAULT_MAX_CYCLE_COUNT: u64 = 1_000_000;
