//! Load and decode errors for IJVM modules.

use std::fmt;
use std::io;

use thiserror::Error;

/// Section of the module file that a truncation was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Magic,
    ConstantHeader,
    ConstantData,
    TextHeader,
    TextData,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Magic => "magic number",
            Section::ConstantHeader => "constant pool header",
            Section::ConstantData => "constant pool data",
            Section::TextHeader => "text header",
            Section::TextData => "text data",
        };
        f.write_str(name)
    }
}

/// Errors that occur while loading a binary module.
///
/// No partial module is ever produced: any of these aborts the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The first four bytes are not the IJVM magic number.
    #[error("invalid magic number {found:#010x} (expected {expected:#010x})", expected = crate::module::MAGIC_NUMBER)]
    InvalidMagic { found: u32 },

    /// Fewer bytes are available than a header field or size field declares.
    #[error("truncated input in {section}: need {needed} bytes, {available} available")]
    TruncatedInput {
        section: Section,
        needed: usize,
        available: usize,
    },

    /// The constant pool size is not a whole number of words.
    #[error("constant pool size {size} is not a multiple of 4")]
    MisalignedConstantPool { size: u32 },

    /// Reading the module source failed.
    #[error("cannot read module: {kind}")]
    Io { kind: io::ErrorKind },
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        LoadError::Io { kind: err.kind() }
    }
}

/// Errors that occur while decoding a single instruction from the text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The byte at `at` is not an IJVM opcode.
    #[error("unknown opcode {opcode:#04x} at offset {at}")]
    UnknownOpcode { at: usize, opcode: u8 },

    /// The instruction's operand bytes run past the end of the text.
    #[error("truncated {mnemonic} at offset {at}")]
    TruncatedInstruction { at: usize, mnemonic: &'static str },

    /// WIDE is followed by something other than ILOAD, ISTORE or IINC.
    #[error("WIDE applied to byte {opcode:#04x} at offset {at}")]
    InvalidWideTarget { at: usize, opcode: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_magic() {
        assert_eq!(
            LoadError::InvalidMagic { found: 0xCAFEBABE }.to_string(),
            "invalid magic number 0xcafebabe (expected 0x1deadfad)"
        );
    }

    #[test]
    fn display_truncated_input() {
        let e = LoadError::TruncatedInput {
            section: Section::TextData,
            needed: 12,
            available: 3,
        };
        assert_eq!(
            e.to_string(),
            "truncated input in text data: need 12 bytes, 3 available"
        );
    }

    #[test]
    fn display_misaligned_pool() {
        assert_eq!(
            LoadError::MisalignedConstantPool { size: 7 }.to_string(),
            "constant pool size 7 is not a multiple of 4"
        );
    }

    #[test]
    fn io_error_keeps_kind() {
        let err: LoadError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(
            err,
            LoadError::Io {
                kind: io::ErrorKind::PermissionDenied
            }
        );
    }

    #[test]
    fn display_decode_errors() {
        assert_eq!(
            DecodeError::UnknownOpcode { at: 4, opcode: 0x01 }.to_string(),
            "unknown opcode 0x01 at offset 4"
        );
        assert_eq!(
            DecodeError::TruncatedInstruction {
                at: 9,
                mnemonic: "GOTO"
            }
            .to_string(),
            "truncated GOTO at offset 9"
        );
        assert_eq!(
            DecodeError::InvalidWideTarget { at: 2, opcode: 0x60 }.to_string(),
            "WIDE applied to byte 0x60 at offset 2"
        );
    }
}
