//! IJVM common types and module encoding.
//!
//! This crate provides the foundational data structures shared by the
//! machine, the assembler and the CLI:
//!
//! - [`Opcode`]: the 24 opcodes of the IJVM instruction set
//! - [`Instruction`]: a decoded instruction with its operands
//! - [`Module`]: constant pool plus instruction text, with load/encode
//! - [`LoadError`] / [`DecodeError`]: errors from loading and decoding

pub mod error;
pub mod instruction;
pub mod module;
pub mod opcode;

// Re-export commonly used types at the crate root.
pub use error::{DecodeError, LoadError, Section};
pub use instruction::Instruction;
pub use module::{Module, Word, MAGIC_NUMBER};
pub use opcode::Opcode;
