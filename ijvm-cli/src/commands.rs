//! CLI command implementations.
//!
//! Each command reports its own errors on stderr and returns the process
//! exit code on failure.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ijvm_common::{Module, MAGIC_NUMBER};
use ijvm_vm::{HaltReason, Machine, MachineConfig};

/// Flags for `ijvm run`.
pub struct RunOptions {
    pub module: PathBuf,
    pub input: Option<PathBuf>,
    pub lenient: bool,
    pub max_steps: Option<u64>,
    pub stack_capacity: Option<usize>,
    pub max_stack: Option<usize>,
}

impl RunOptions {
    fn config(&self) -> MachineConfig {
        let mut config = MachineConfig::default()
            .with_lenient_opcodes(self.lenient)
            .with_step_limit(self.max_steps);
        if let Some(capacity) = self.stack_capacity {
            config = config.with_initial_stack_capacity(capacity);
        }
        if let Some(limit) = self.max_stack {
            config = config.with_max_stack_slots(limit);
        }
        config
    }
}

/// Load and execute a module.
pub fn run(opts: &RunOptions) -> Result<(), i32> {
    let module = read_module(&opts.module)?;

    let input: Box<dyn Read> = match &opts.input {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                eprintln!("error: cannot read '{}': {e}", path.display());
                1
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };
    let output = BufWriter::new(io::stdout().lock());

    let mut machine = Machine::with_config(&module, input, output, opts.config());
    let result = machine.run();

    if let Err(e) = machine.output_mut().flush() {
        eprintln!("error: cannot write output: {e}");
        return Err(1);
    }

    match result {
        Ok(HaltReason::ErrorSignal) => {
            eprintln!("program signalled an error at pc {}", machine.pc());
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("runtime error: {e}");
            Err(3)
        }
    }
}

/// Assemble a text file to a binary module.
pub fn assemble(input: &Path, output: Option<&Path>) -> Result<(), i32> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("ijvm"));

    let text = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", input.display());
        1
    })?;

    let module = ijvm_assembler::assemble(&text).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    let bytes = module.encode();
    fs::write(&output, &bytes).map_err(|e| {
        eprintln!("error: cannot write '{}': {e}", output.display());
        1
    })?;

    eprintln!(
        "assembled {} constants, {} text bytes ({} bytes) -> {}",
        module.constants.len(),
        module.text.len(),
        bytes.len(),
        output.display()
    );
    Ok(())
}

/// Print a module as canonical assembly text.
pub fn disassemble(path: &Path) -> Result<(), i32> {
    let module = read_module(path)?;
    print!("{}", ijvm_assembler::disassemble(&module));
    Ok(())
}

/// Read a binary module, or assemble the file in memory.
///
/// `.jas` files are always assembled. Any other file is assembled only when
/// it lacks the magic number and assembles cleanly; otherwise it is decoded
/// and the load error is reported.
fn read_module(path: &Path) -> Result<Module, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", path.display());
        1
    })?;

    let is_source = path.extension().is_some_and(|ext| ext == "jas");
    if is_source || !bytes.starts_with(&MAGIC_NUMBER.to_be_bytes()) {
        let assembled = std::str::from_utf8(&bytes)
            .map_err(|e| e.to_string())
            .and_then(|text| ijvm_assembler::assemble(text).map_err(|e| e.to_string()));
        match assembled {
            Ok(module) => return Ok(module),
            Err(e) if is_source => {
                eprintln!("error: {e}");
                return Err(1);
            }
            Err(_) => {}
        }
    }

    Module::decode(&bytes).map_err(|e| {
        eprintln!("error: invalid module: {e}");
        1
    })
}
