//! `kappac` — compiles and runs KAPPA programs. Thin plumbing over the
//! `kappa` and `kasm` library crates (§6.1); owns file I/O, exit codes, and
//! the one concrete logging subscriber the whole toolchain installs.

mod config;
mod mandelbrot;

use std::fs;
use std::path::PathBuf;
use std::process::exit;

use kasm::error::SourceError;
use kasm::Vm;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "kappac", about = "Compile and run KAPPA programs")]
enum Cli {
    /// Tokenize, build the tree, assemble, and write KASM text.
    Compile {
        #[structopt(long)]
        source: PathBuf,
        #[structopt(short = "o", long)]
        output: Option<PathBuf>,
    },
    /// Compile a KAPPA source file and run it on the VM.
    Run {
        #[structopt(long)]
        source: PathBuf,
        #[structopt(long)]
        entry: String,
        #[structopt(long)]
        config: Option<PathBuf>,
    },
    /// Load a pre-assembled KASM file and run it directly.
    Exec {
        #[structopt(long)]
        kasm: PathBuf,
        #[structopt(long)]
        entry: String,
        #[structopt(long)]
        config: Option<PathBuf>,
    },
    /// Render the bundled Mandelbrot demo to the terminal (§6.2).
    DemoMandelbrot {
        #[structopt(long, default_value = "40")]
        width: u32,
        #[structopt(long, default_value = "20")]
        height: u32,
    },
}

fn main() {
    env_logger::init();
    if let Err(code) = run() {
        exit(code);
    }
}

fn run() -> Result<(), i32> {
    match Cli::from_args() {
        Cli::Compile { source, output } => cmd_compile(&source, output.as_deref()),
        Cli::Run { source, entry, config } => cmd_run(&source, &entry, config.as_deref()),
        Cli::Exec { kasm, entry, config } => cmd_exec(&kasm, &entry, config.as_deref()),
        Cli::DemoMandelbrot { width, height } => cmd_demo(width, height),
    }
}

fn cmd_compile(source: &std::path::Path, output: Option<&std::path::Path>) -> Result<(), i32> {
    let text = read_file(source)?;
    let kasm_text = match kappa::compile(&text) {
        Ok(kasm_text) => kasm_text,
        Err(with_source) => {
            for err in &with_source.errors {
                eprintln!("{}", err);
            }
            return Err(1);
        }
    };
    match output {
        Some(path) => fs::write(path, kasm_text).map_err(|e| report_io(e)),
        None => {
            print!("{}", kasm_text);
            Ok(())
        }
    }
}

fn cmd_run(source: &std::path::Path, entry: &str, config: Option<&std::path::Path>) -> Result<(), i32> {
    let text = read_file(source)?;
    let kasm_text = match kappa::compile(&text) {
        Ok(kasm_text) => kasm_text,
        Err(with_source) => {
            for err in &with_source.errors {
                eprintln!("{}", err);
            }
            return Err(1);
        }
    };
    execute(&kasm_text, entry, config)
}

fn cmd_exec(kasm_path: &std::path::Path, entry: &str, config: Option<&std::path::Path>) -> Result<(), i32> {
    let kasm_text = read_file(kasm_path)?;
    execute(&kasm_text, entry, config)
}

fn execute(kasm_text: &str, entry: &str, config: Option<&std::path::Path>) -> Result<(), i32> {
    let vm_config = config::load_config(config).map_err(|e| report_anyhow(e))?;
    let mut vm = Vm::new(vm_config);
    if let Err(e) = vm.load(kasm_text) {
        print_error(e.type_label(), &e.fmt_msg(), e.position());
        return Err(1);
    }
    match vm.call_and_run(entry) {
        Ok(result) => {
            println!("{}", result);
            Ok(())
        }
        Err(e) => {
            print_error(e.type_label(), &e.fmt_msg(), e.position());
            Err(1)
        }
    }
}

fn cmd_demo(width: u32, height: u32) -> Result<(), i32> {
    mandelbrot::render(width, height).map_err(|e| report_anyhow(e))
}

fn read_file(path: &std::path::Path) -> Result<String, i32> {
    fs::read_to_string(path).map_err(report_io)
}

fn report_io(e: std::io::Error) -> i32 {
    eprintln!("Error | 0-0: {}", e);
    1
}

fn report_anyhow(e: anyhow::Error) -> i32 {
    eprintln!("Error | 0-0: {}", e);
    1
}

/// Renders the `"<Type> | <line>-<col>: <text>"` wire format from §6.
fn print_error(type_label: &str, msg: &str, position: Option<(u32, u32)>) {
    let (line, col) = position.unwrap_or((0, 0));
    eprintln!("{} | {}-{}: {}", type_label, line, col, msg);
}
