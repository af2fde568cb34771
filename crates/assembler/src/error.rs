//! Error types for the IJVM assembler.

use thiserror::Error;

/// Errors produced during assembly of text to a module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// An unrecognized instruction mnemonic was encountered.
    #[error("line {line}: unknown mnemonic '{token}'")]
    UnknownMnemonic { line: usize, token: String },

    /// An unrecognized directive was encountered.
    #[error("line {line}: unknown directive '{token}'")]
    UnknownDirective { line: usize, token: String },

    /// An instruction or directive did not have enough arguments.
    #[error("line {line}: {opcode} expects {expected} argument(s)")]
    MissingArgument {
        line: usize,
        opcode: &'static str,
        expected: usize,
    },

    /// A numeric literal could not be parsed.
    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },

    /// A numeric operand does not fit its field.
    #[error("line {line}: {what} {value} out of range")]
    OutOfRange {
        line: usize,
        what: &'static str,
        value: i64,
    },

    /// A token appeared where it was not expected.
    #[error("line {line}: unexpected token '{token}'")]
    UnexpectedToken { line: usize, token: String },

    /// WIDE was applied to an instruction other than ILOAD, ISTORE or IINC.
    #[error("line {line}: WIDE cannot prefix '{token}'")]
    InvalidWide { line: usize, token: String },

    /// A branch or `.const` names a label that is never defined.
    #[error("line {line}: undefined label '{name}'")]
    UndefinedLabel { line: usize, name: String },

    /// LDC_W or INVOKEVIRTUAL names a constant that is never defined.
    #[error("line {line}: undefined constant '{name}'")]
    UndefinedConstant { line: usize, name: String },

    /// A label is defined twice.
    #[error("line {line}: duplicate label '{name}'")]
    DuplicateLabel { line: usize, name: String },

    /// A constant is defined twice.
    #[error("line {line}: duplicate constant '{name}'")]
    DuplicateConstant { line: usize, name: String },

    /// A branch target is more than a signed 16-bit offset away.
    #[error("line {line}: branch offset {offset} does not fit in 16 bits")]
    BranchTooFar { line: usize, offset: i64 },
}
