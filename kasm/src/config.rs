//! VM tuning knobs (§4.2.9), grouped the way the teacher project groups its
//! own hardware/program specs: a small `Deserialize`/`Serialize` struct with
//! a sensible `Default`, loadable from an optional JSON file.

use serde::{Deserialize, Serialize};

use kappa::consts::{DEFAULT_MAX_CYCLE_COUNT, DEFAULT_MEMORY_SIZE};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Size in bytes of the VM's single flat memory buffer (§3 "VM
    /// program").
    pub memory_size: usize,
    /// Upper bound on instructions dispatched by a single `run`, guarding
    /// against non-terminating KASM (added in §4.2.9; not present in
    /// spec.md's own error taxonomy).
    pub max_cycle_count: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            max_cycle_count: DEFAULT_MAX_CYCLE_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_memory_size() {
        assert_eq!(VmConfig::default().memory_size, 64 * 1024);
    }

    #[test]
    fn round_trips_through_json() {
        let config = VmConfig { memory_size: 1024, max_cycle_count: 10 };
        let json = serde_json::to_string(&config).unwrap();
        let back: VmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
