//! `osfl`: the reference command-line interpreter. Reads a source file,
//! compiles it, and runs it to completion.

use clap::Parser;
use osflc::{compile_source, CompilerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "osfl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run an osfl source file", long_about = None)]
struct Cli {
    /// Source file to compile and run
    input: PathBuf,

    /// Reserved: compile without running, writing bytecode to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the compiled bytecode's disassembly before running
    #[arg(short, long)]
    debug: bool,

    /// Reserved: disable bytecode-level optimizations
    #[arg(long = "no-optimize")]
    no_optimize: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let source = match std::fs::read(&cli.input) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("Error: could not read {}: {err}", cli.input.display());
            return ExitCode::from(1);
        }
    };

    let file_name = cli.input.display().to_string();
    let mut config = CompilerConfig::default();
    config.lexer.file_name = file_name;
    let _ = cli.no_optimize;

    let compiled = match compile_source(&source, config) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    if cli.debug {
        eprint!("{}", compiled.bytecode.disassemble());
    }
    if let Some(output) = &cli.output {
        eprintln!("Warning: -o {} is reserved and not yet implemented", output.display());
    }

    match osflr::run_program(compiled.bytecode) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "osfl=debug" } else { "osfl=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
