//! Runtime faults for the IJVM machine.
//!
//! Every fault that can be tied to an instruction carries its offset (`at`).
//! A fault is raised before the faulting instruction mutates any state.

use std::io;

use ijvm_common::DecodeError;
use thiserror::Error;

/// Errors that stop execution. Halting is not an error; see `HaltReason`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The opcode byte is not part of the instruction set.
    #[error("illegal opcode {opcode:#04x} at offset {at}")]
    IllegalOpcode { at: usize, opcode: u8 },

    /// Operand bytes run past the end of the text.
    #[error("truncated {mnemonic} at offset {at}")]
    TruncatedInstruction { at: usize, mnemonic: &'static str },

    /// WIDE precedes an instruction it cannot widen.
    #[error("WIDE applied to byte {opcode:#04x} at offset {at}")]
    InvalidWideTarget { at: usize, opcode: u8 },

    /// Pop below the current frame's operand area.
    #[error("stack underflow at offset {at}")]
    StackUnderflow { at: usize },

    /// The stack would grow past the configured slot limit.
    #[error("stack overflow at offset {at} (limit {limit} slots)")]
    StackOverflow { at: usize, limit: usize },

    /// Local variable index outside the current frame.
    #[error("local variable {index} out of range (frame has {size}) at offset {at}")]
    LocalOutOfRange { at: usize, index: u16, size: usize },

    /// Constant pool index past the end of the pool.
    #[error("constant {index} out of range (pool has {size}) at offset {at}")]
    ConstantOutOfRange { at: usize, index: u16, size: usize },

    /// Branch target before the start of the text.
    #[error("branch from offset {at} by {offset} leaves the program")]
    BranchOutOfRange { at: usize, offset: i16 },

    /// Method entry does not point at a four-byte header inside the text.
    #[error("invalid method entry {entry} at offset {at}")]
    InvalidMethodEntry { at: usize, entry: i32 },

    /// Method header declares no argument slots, leaving nowhere to link the frame.
    #[error("method at {entry} declares zero arguments (invoked at offset {at})")]
    InvalidMethodHeader { at: usize, entry: usize },

    /// Fewer words on the caller's operand stack than the method's arguments.
    #[error("method at {entry} expects {expected} argument words, {available} available at offset {at}")]
    ArgumentUnderflow {
        at: usize,
        entry: usize,
        expected: usize,
        available: usize,
    },

    /// IRETURN executed outside any method.
    #[error("IRETURN outside a method at offset {at}")]
    ReturnFromRoot { at: usize },

    /// The frame-link record of the current frame was overwritten.
    #[error("corrupt frame link {link} at offset {at}")]
    CorruptFrameLink { at: usize, link: i32 },

    /// The configured instruction budget ran out.
    #[error("step limit of {limit} instructions exceeded at offset {at}")]
    StepLimitExceeded { at: usize, limit: u64 },

    /// The input or output collaborator failed.
    #[error("i/o error at offset {at}: {kind}")]
    Io { at: usize, kind: io::ErrorKind },
}

impl From<DecodeError> for RuntimeError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownOpcode { at, opcode } => RuntimeError::IllegalOpcode { at, opcode },
            DecodeError::TruncatedInstruction { at, mnemonic } => {
                RuntimeError::TruncatedInstruction { at, mnemonic }
            }
            DecodeError::InvalidWideTarget { at, opcode } => {
                RuntimeError::InvalidWideTarget { at, opcode }
            }
        }
    }
}
