//! Opcode definitions for the IJVM instruction set.

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute pins each variant to its IJVM byte value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Stack
    /// No operation.
    Nop = 0x00,
    /// Push the next byte, sign-extended to a word.
    Bipush = 0x10,
    /// Push a constant pool entry (16-bit index).
    LdcW = 0x13,
    /// Discard the top word.
    Pop = 0x57,
    /// Push a copy of the top word.
    Dup = 0x59,
    /// Exchange the two topmost words.
    Swap = 0x5F,

    // Local variables
    /// Push local variable (8-bit index, 16-bit after WIDE).
    Iload = 0x15,
    /// Pop into local variable (8-bit index, 16-bit after WIDE).
    Istore = 0x36,
    /// Add a signed byte to a local variable.
    Iinc = 0x84,
    /// Widen the index operand of the following ILOAD/ISTORE/IINC.
    Wide = 0xC4,

    // Arithmetic
    /// Pop b, pop a, push a + b.
    Iadd = 0x60,
    /// Pop b, pop a, push a - b.
    Isub = 0x64,
    /// Pop b, pop a, push a & b.
    Iand = 0x7E,
    /// Pop b, pop a, push a | b.
    Ior = 0xB0,

    // Control flow
    /// Pop v, branch if v == 0.
    Ifeq = 0x99,
    /// Pop v, branch if v < 0.
    Iflt = 0x9B,
    /// Pop b, pop a, branch if a == b.
    IfIcmpeq = 0x9F,
    /// Unconditional branch.
    Goto = 0xA7,
    /// Return the top word to the caller.
    Ireturn = 0xAC,
    /// Call the method whose header offset is in the constant pool.
    Invokevirtual = 0xB6,

    // Machine control
    /// Read one input byte (0 on end of input).
    In = 0xFC,
    /// Pop and write the low 8 bits as a character.
    Out = 0xFD,
    /// Write the error marker and halt.
    Err = 0xFE,
    /// Stop execution.
    Halt = 0xFF,
}

/// All opcodes, ordered by byte value.
pub const ALL_OPCODES: [Opcode; 24] = [
    Opcode::Nop,
    Opcode::Bipush,
    Opcode::LdcW,
    Opcode::Iload,
    Opcode::Istore,
    Opcode::Pop,
    Opcode::Dup,
    Opcode::Swap,
    Opcode::Iadd,
    Opcode::Isub,
    Opcode::Iand,
    Opcode::Iinc,
    Opcode::Ifeq,
    Opcode::Iflt,
    Opcode::IfIcmpeq,
    Opcode::Goto,
    Opcode::Ireturn,
    Opcode::Ior,
    Opcode::Invokevirtual,
    Opcode::Wide,
    Opcode::In,
    Opcode::Out,
    Opcode::Err,
    Opcode::Halt,
];

impl TryFrom<u8> for Opcode {
    type Error = u8;

    /// Map a byte to its opcode; unknown bytes are returned unchanged.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Opcode::Nop),
            0x10 => Ok(Opcode::Bipush),
            0x13 => Ok(Opcode::LdcW),
            0x15 => Ok(Opcode::Iload),
            0x36 => Ok(Opcode::Istore),
            0x57 => Ok(Opcode::Pop),
            0x59 => Ok(Opcode::Dup),
            0x5F => Ok(Opcode::Swap),
            0x60 => Ok(Opcode::Iadd),
            0x64 => Ok(Opcode::Isub),
            0x7E => Ok(Opcode::Iand),
            0x84 => Ok(Opcode::Iinc),
            0x99 => Ok(Opcode::Ifeq),
            0x9B => Ok(Opcode::Iflt),
            0x9F => Ok(Opcode::IfIcmpeq),
            0xA7 => Ok(Opcode::Goto),
            0xAC => Ok(Opcode::Ireturn),
            0xB0 => Ok(Opcode::Ior),
            0xB6 => Ok(Opcode::Invokevirtual),
            0xC4 => Ok(Opcode::Wide),
            0xFC => Ok(Opcode::In),
            0xFD => Ok(Opcode::Out),
            0xFE => Ok(Opcode::Err),
            0xFF => Ok(Opcode::Halt),
            other => Err(other),
        }
    }
}

impl Opcode {
    /// Returns the assembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Bipush => "BIPUSH",
            Opcode::LdcW => "LDC_W",
            Opcode::Iload => "ILOAD",
            Opcode::Istore => "ISTORE",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Swap => "SWAP",
            Opcode::Iadd => "IADD",
            Opcode::Isub => "ISUB",
            Opcode::Iand => "IAND",
            Opcode::Iinc => "IINC",
            Opcode::Ifeq => "IFEQ",
            Opcode::Iflt => "IFLT",
            Opcode::IfIcmpeq => "IF_ICMPEQ",
            Opcode::Goto => "GOTO",
            Opcode::Ireturn => "IRETURN",
            Opcode::Ior => "IOR",
            Opcode::Invokevirtual => "INVOKEVIRTUAL",
            Opcode::Wide => "WIDE",
            Opcode::In => "IN",
            Opcode::Out => "OUT",
            Opcode::Err => "ERR",
            Opcode::Halt => "HALT",
        }
    }

    /// Look up an opcode by its mnemonic (case-sensitive, uppercase).
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        ALL_OPCODES
            .iter()
            .find(|op| op.mnemonic() == mnemonic)
            .copied()
    }

    /// True for the opcodes WIDE may precede.
    pub fn accepts_wide(&self) -> bool {
        matches!(self, Opcode::Iload | Opcode::Istore | Opcode::Iinc)
    }
}
