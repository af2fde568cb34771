//! IJVM machine: executes a loaded [`Module`] one instruction at a time.
//!
//! The machine is a stack-based interpreter with:
//! - One growable word stack shared by operands, locals and frame links
//! - Two cursors into it: `top` (live slot count) and `lv` (frame base)
//! - A byte input source (IN) and byte output sink (OUT, ERR)
//!
//! # Usage
//!
//! ```
//! use ijvm_common::Module;
//! use ijvm_vm::{run, HaltReason};
//!
//! // BIPUSH 7, BIPUSH 5, ISUB, OUT, HALT
//! let module = Module::new(vec![], vec![0x10, 7, 0x10, 5, 0x64, 0xFD, 0xFF]);
//! let mut output = Vec::new();
//!
//! let reason = run(&module, std::io::empty(), &mut output).unwrap();
//! assert_eq!(reason, HaltReason::Halt);
//! assert_eq!(output, vec![2]);
//! ```

pub mod config;
pub mod error;
pub mod execute;
pub mod machine;

pub use config::{MachineConfig, ROOT_FRAME_SLOTS};
pub use error::RuntimeError;
pub use machine::{HaltReason, Machine};

use std::io::{Read, Write};

use ijvm_common::Module;

/// Execute a module to completion with the default configuration.
///
/// # Errors
///
/// Returns [`RuntimeError`] if execution faults (illegal opcode, stack
/// underflow, out-of-range local or constant, i/o failure, etc.).
pub fn run<R: Read, W: Write>(
    module: &Module,
    input: R,
    output: W,
) -> Result<HaltReason, RuntimeError> {
    Machine::new(module, input, output).run()
}
