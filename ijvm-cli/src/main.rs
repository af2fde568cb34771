//! IJVM CLI: assemble, disassemble and run IJVM modules.
//!
//! Exit codes:
//! - 0: Success (including a program that halted through ERR)
//! - 1: Input/load/assembly error
//! - 2: Usage error
//! - 3: Runtime fault

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "ijvm", version, about = "IJVM bytecode assembler and machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and execute a module (binary or assembly text)
    Run {
        module: PathBuf,
        /// Read program input from FILE instead of stdin
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
        /// Skip unknown opcodes instead of faulting
        #[arg(long)]
        lenient: bool,
        /// Fault after executing N instructions
        #[arg(long, value_name = "N")]
        max_steps: Option<u64>,
        /// Initial stack capacity in words
        #[arg(long, value_name = "N")]
        stack_capacity: Option<usize>,
        /// Hard limit on stack size in words
        #[arg(long, value_name = "N")]
        max_stack: Option<usize>,
        /// Log every executed instruction to stderr
        #[arg(long)]
        trace: bool,
    },
    /// Assemble text into a binary module
    Assemble {
        input: PathBuf,
        /// Output path (defaults to the input with an .ijvm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a module as canonical assembly text
    Disassemble { module: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let trace = matches!(cli.command, Commands::Run { trace: true, .. });
    init_logging(trace);

    let result = match cli.command {
        Commands::Run {
            module,
            input,
            lenient,
            max_steps,
            stack_capacity,
            max_stack,
            trace: _,
        } => commands::run(&commands::RunOptions {
            module,
            input,
            lenient,
            max_steps,
            stack_capacity,
            max_stack,
        }),
        Commands::Assemble { input, output } => commands::assemble(&input, output.as_deref()),
        Commands::Disassemble { module } => commands::disassemble(&module),
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn init_logging(trace: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if trace {
        if let Ok(directive) = "ijvm_vm=trace".parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
