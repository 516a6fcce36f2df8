//! Renders `demos/mandelbrot.kappa` to the terminal as ASCII art by driving
//! the VM host API one pixel at a time (§6.2). This is a thin consumer of
//! the public `kappa`/`kasm` surface, not part of the core: it owns no
//! opcodes or language features of its own.

use anyhow::{Context, Result};
use kasm::{Vm, VmConfig};

const SOURCE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/mandelbrot.kappa"));

/// Shading ramp from "escaped immediately" to "never escaped", darkest first.
const RAMP: &[u8] = b" .:-=+*#%@";

pub fn render(width: u32, height: u32) -> Result<()> {
    let kasm_text = kappa::compile(SOURCE).map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut vm = Vm::new(VmConfig::default());
    vm.load(&kasm_text).context("loading mandelbrot.kappa")?;

    for row in 0..height {
        let mut line = String::with_capacity(width as usize);
        for col in 0..width {
            let cx = (col as f64 / width as f64) * 3.5 - 2.5;
            let cy = (row as f64 / height as f64) * 2.0 - 1.0;
            let iterations = escape(&mut vm, cx, cy)?;
            line.push(shade(iterations));
        }
        println!("{}", line);
    }
    Ok(())
}

/// Calls `escape(cx, cy)`, pushing arguments right-to-left to match the
/// assembler's calling convention (see `kappa::assemble`'s `emit_call`).
fn escape(vm: &mut Vm, cx: f64, cy: f64) -> Result<f64> {
    vm.push(&cy.to_bits().to_le_bytes()).context("pushing cy")?;
    vm.push(&cx.to_bits().to_le_bytes()).context("pushing cx")?;
    vm.call_and_run("escape").map_err(|e| anyhow::anyhow!("{}", e))
}

fn shade(iterations: f64) -> char {
    let max = 50.0;
    let frac = (iterations / max).clamp(0.0, 1.0);
    let idx = ((frac * (RAMP.len() - 1) as f64).round() as usize).min(RAMP.len() - 1);
    RAMP[idx] as char
}
