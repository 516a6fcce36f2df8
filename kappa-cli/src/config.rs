//! Loads a [kasm::VmConfig] from an optional JSON file, falling back to
//! `Default` the way the teacher project's CLI loads its `HardwareSpec`/
//! `ProgramSpec` (`load_spec`-style optional-config pattern, §4.2.9).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use kasm::VmConfig;

pub fn load_config(path: Option<&Path>) -> Result<VmConfig> {
    match path {
        None => Ok(VmConfig::default()),
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading VM config from {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing VM config from {}", path.display()))
        }
    }
}
