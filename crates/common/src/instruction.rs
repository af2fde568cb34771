//! Decoded instruction shapes for the IJVM instruction set.
//!
//! Instructions are variable length. Multi-byte operands are big-endian:
//! ```text
//! BIPUSH          op i8
//! LDC_W           op u16        (constant index)
//! INVOKEVIRTUAL   op u16        (constant index)
//! GOTO/IF*        op i16        (offset from the opcode byte)
//! ILOAD/ISTORE    op u8         | WIDE op u16
//! IINC            op u8 i8      | WIDE op u16 i8
//! others          op
//! ```

use std::fmt;

use crate::error::DecodeError;
use crate::opcode::Opcode;

/// A single decoded instruction with its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Bipush(i8),
    LdcW(u16),
    Iload { index: u16, wide: bool },
    Istore { index: u16, wide: bool },
    Pop,
    Dup,
    Swap,
    Iadd,
    Isub,
    Iand,
    Ior,
    Iinc { index: u16, delta: i8, wide: bool },
    Ifeq(i16),
    Iflt(i16),
    IfIcmpeq(i16),
    Goto(i16),
    Ireturn,
    Invokevirtual(u16),
    In,
    Out,
    Err,
    Halt,
}

impl Instruction {
    /// ILOAD, widened only when the index needs it.
    pub fn iload(index: u16) -> Self {
        Instruction::Iload {
            index,
            wide: index > 0xFF,
        }
    }

    /// ISTORE, widened only when the index needs it.
    pub fn istore(index: u16) -> Self {
        Instruction::Istore {
            index,
            wide: index > 0xFF,
        }
    }

    /// IINC, widened only when the index needs it.
    pub fn iinc(index: u16, delta: i8) -> Self {
        Instruction::Iinc {
            index,
            delta,
            wide: index > 0xFF,
        }
    }

    /// The opcode of this instruction (never WIDE; see [`Instruction::is_wide`]).
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Bipush(_) => Opcode::Bipush,
            Instruction::LdcW(_) => Opcode::LdcW,
            Instruction::Iload { .. } => Opcode::Iload,
            Instruction::Istore { .. } => Opcode::Istore,
            Instruction::Pop => Opcode::Pop,
            Instruction::Dup => Opcode::Dup,
            Instruction::Swap => Opcode::Swap,
            Instruction::Iadd => Opcode::Iadd,
            Instruction::Isub => Opcode::Isub,
            Instruction::Iand => Opcode::Iand,
            Instruction::Ior => Opcode::Ior,
            Instruction::Iinc { .. } => Opcode::Iinc,
            Instruction::Ifeq(_) => Opcode::Ifeq,
            Instruction::Iflt(_) => Opcode::Iflt,
            Instruction::IfIcmpeq(_) => Opcode::IfIcmpeq,
            Instruction::Goto(_) => Opcode::Goto,
            Instruction::Ireturn => Opcode::Ireturn,
            Instruction::Invokevirtual(_) => Opcode::Invokevirtual,
            Instruction::In => Opcode::In,
            Instruction::Out => Opcode::Out,
            Instruction::Err => Opcode::Err,
            Instruction::Halt => Opcode::Halt,
        }
    }

    /// True if this instruction is encoded with the WIDE prefix.
    ///
    /// An index above 255 always forces the wide form.
    pub fn is_wide(&self) -> bool {
        match *self {
            Instruction::Iload { index, wide }
            | Instruction::Istore { index, wide }
            | Instruction::Iinc { index, wide, .. } => wide || index > 0xFF,
            _ => false,
        }
    }

    /// Encoded length in bytes, including any WIDE prefix.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let prefix = usize::from(self.is_wide());
        let index_width = if self.is_wide() { 2 } else { 1 };
        prefix
            + match self {
                Instruction::Bipush(_) => 2,
                Instruction::LdcW(_)
                | Instruction::Invokevirtual(_)
                | Instruction::Ifeq(_)
                | Instruction::Iflt(_)
                | Instruction::IfIcmpeq(_)
                | Instruction::Goto(_) => 3,
                Instruction::Iload { .. } | Instruction::Istore { .. } => 1 + index_width,
                Instruction::Iinc { .. } => 2 + index_width,
                _ => 1,
            }
    }

    /// Decode the instruction starting at `text[at]`.
    ///
    /// A WIDE prefix is folded into the following instruction.
    pub fn decode(text: &[u8], at: usize) -> Result<Self, DecodeError> {
        let byte = *text.get(at).ok_or(DecodeError::TruncatedInstruction {
            at,
            mnemonic: "instruction",
        })?;
        let opcode =
            Opcode::try_from(byte).map_err(|opcode| DecodeError::UnknownOpcode { at, opcode })?;

        if opcode == Opcode::Wide {
            return Self::decode_wide(text, at);
        }

        let operands = Operands {
            text,
            at,
            mnemonic: opcode.mnemonic(),
        };

        let instr = match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::Bipush => Instruction::Bipush(operands.u8(1)? as i8),
            Opcode::LdcW => Instruction::LdcW(operands.u16(1)?),
            Opcode::Iload => Instruction::Iload {
                index: u16::from(operands.u8(1)?),
                wide: false,
            },
            Opcode::Istore => Instruction::Istore {
                index: u16::from(operands.u8(1)?),
                wide: false,
            },
            Opcode::Pop => Instruction::Pop,
            Opcode::Dup => Instruction::Dup,
            Opcode::Swap => Instruction::Swap,
            Opcode::Iadd => Instruction::Iadd,
            Opcode::Isub => Instruction::Isub,
            Opcode::Iand => Instruction::Iand,
            Opcode::Ior => Instruction::Ior,
            Opcode::Iinc => Instruction::Iinc {
                index: u16::from(operands.u8(1)?),
                delta: operands.u8(2)? as i8,
                wide: false,
            },
            Opcode::Ifeq => Instruction::Ifeq(operands.u16(1)? as i16),
            Opcode::Iflt => Instruction::Iflt(operands.u16(1)? as i16),
            Opcode::IfIcmpeq => Instruction::IfIcmpeq(operands.u16(1)? as i16),
            Opcode::Goto => Instruction::Goto(operands.u16(1)? as i16),
            Opcode::Ireturn => Instruction::Ireturn,
            Opcode::Invokevirtual => Instruction::Invokevirtual(operands.u16(1)?),
            Opcode::In => Instruction::In,
            Opcode::Out => Instruction::Out,
            Opcode::Err => Instruction::Err,
            Opcode::Halt => Instruction::Halt,
            Opcode::Wide => unreachable!("handled above"),
        };

        Ok(instr)
    }

    fn decode_wide(text: &[u8], at: usize) -> Result<Self, DecodeError> {
        let target = *text.get(at + 1).ok_or(DecodeError::TruncatedInstruction {
            at,
            mnemonic: Opcode::Wide.mnemonic(),
        })?;

        let operands = Operands {
            text,
            at,
            mnemonic: Opcode::Wide.mnemonic(),
        };

        match Opcode::try_from(target) {
            Ok(Opcode::Iload) => Ok(Instruction::Iload {
                index: operands.u16(2)?,
                wide: true,
            }),
            Ok(Opcode::Istore) => Ok(Instruction::Istore {
                index: operands.u16(2)?,
                wide: true,
            }),
            Ok(Opcode::Iinc) => Ok(Instruction::Iinc {
                index: operands.u16(2)?,
                delta: operands.u8(4)? as i8,
                wide: true,
            }),
            _ => Err(DecodeError::InvalidWideTarget { at, opcode: target }),
        }
    }

    /// Append the encoded bytes of this instruction to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        if self.is_wide() {
            out.push(Opcode::Wide as u8);
        }
        out.push(self.opcode() as u8);

        match *self {
            Instruction::Bipush(value) => out.push(value as u8),
            Instruction::LdcW(index) | Instruction::Invokevirtual(index) => {
                out.extend_from_slice(&index.to_be_bytes());
            }
            Instruction::Ifeq(offset)
            | Instruction::Iflt(offset)
            | Instruction::IfIcmpeq(offset)
            | Instruction::Goto(offset) => out.extend_from_slice(&offset.to_be_bytes()),
            Instruction::Iload { index, .. } | Instruction::Istore { index, .. } => {
                self.encode_index(index, out);
            }
            Instruction::Iinc { index, delta, .. } => {
                self.encode_index(index, out);
                out.push(delta as u8);
            }
            _ => {}
        }
    }

    fn encode_index(&self, index: u16, out: &mut Vec<u8>) {
        if self.is_wide() {
            out.extend_from_slice(&index.to_be_bytes());
        } else {
            out.push(index as u8);
        }
    }

    /// Branch offset, for the four branching instructions.
    pub fn branch_offset(&self) -> Option<i16> {
        match *self {
            Instruction::Ifeq(offset)
            | Instruction::Iflt(offset)
            | Instruction::IfIcmpeq(offset)
            | Instruction::Goto(offset) => Some(offset),
            _ => None,
        }
    }
}

/// Canonical assembly text: mnemonic followed by decimal operands.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode().mnemonic();
        let prefix = if self.is_wide() { "WIDE " } else { "" };
        match *self {
            Instruction::Bipush(value) => write!(f, "{mnemonic} {value}"),
            Instruction::LdcW(index) | Instruction::Invokevirtual(index) => {
                write!(f, "{mnemonic} {index}")
            }
            Instruction::Ifeq(offset)
            | Instruction::Iflt(offset)
            | Instruction::IfIcmpeq(offset)
            | Instruction::Goto(offset) => write!(f, "{mnemonic} {offset}"),
            Instruction::Iload { index, .. } | Instruction::Istore { index, .. } => {
                write!(f, "{prefix}{mnemonic} {index}")
            }
            Instruction::Iinc { index, delta, .. } => {
                write!(f, "{prefix}{mnemonic} {index} {delta}")
            }
            _ => f.write_str(mnemonic),
        }
    }
}

/// Bounds-checked operand reader for one instruction.
struct Operands<'t> {
    text: &'t [u8],
    at: usize,
    mnemonic: &'static str,
}

impl Operands<'_> {
    fn u8(&self, offset: usize) -> Result<u8, DecodeError> {
        self.text
            .get(self.at + offset)
            .copied()
            .ok_or(DecodeError::TruncatedInstruction {
                at: self.at,
                mnemonic: self.mnemonic,
            })
    }

    fn u16(&self, offset: usize) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes([self.u8(offset)?, self.u8(offset + 1)?]))
    }
}
