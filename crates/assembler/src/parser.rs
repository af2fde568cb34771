//! Parser for IJVM assembly tokens.
//!
//! Each line becomes an optional label plus at most one [`Item`]. Label and
//! constant references stay symbolic here; `lib.rs` resolves them once all
//! offsets are known.

use crate::error::AsmError;
use crate::lexer::Token;
use ijvm_common::{Instruction, Opcode};

/// A constant pool or branch operand that may still be symbolic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Operand {
    Number(i64),
    Name(String),
}

/// One assembled item, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Item {
    /// An instruction with all operands known.
    Fixed(Instruction),
    /// GOTO / IFEQ / IFLT / IF_ICMPEQ with a label or raw offset.
    Branch { opcode: Opcode, target: Operand },
    /// LDC_W / INVOKEVIRTUAL with a constant name or raw index.
    Pool { opcode: Opcode, target: Operand },
    /// `.method ARGS LOCALS`
    Method { args: u16, locals: u16 },
    /// `.byte N`
    Byte(u8),
    /// `.const NAME VALUE`
    Const { name: String, value: Operand },
    /// `.const-origin N`
    ConstOrigin(u32),
    /// `.text-origin N`
    TextOrigin(u32),
}

impl Item {
    /// Number of text bytes this item occupies.
    pub(crate) fn size(&self) -> usize {
        match self {
            Item::Fixed(instr) => instr.len(),
            Item::Branch { .. } | Item::Pool { .. } => 3,
            Item::Method { .. } => 4,
            Item::Byte(_) => 1,
            Item::Const { .. } | Item::ConstOrigin(_) | Item::TextOrigin(_) => 0,
        }
    }
}

/// A parsed line: optional label definition plus optional item.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Line {
    pub label: Option<String>,
    pub item: Option<Item>,
}

/// Parse the tokens of a single line.
pub(crate) fn parse_line(tokens: &[Token], line_num: usize) -> Result<Line, AsmError> {
    let mut line = Line::default();
    let mut rest = tokens;

    if let Some((Token::Label(name), tail)) = rest.split_first() {
        if name.is_empty() {
            return Err(unexpected(&tokens[0], line_num));
        }
        line.label = Some(name.clone());
        rest = tail;
    }

    line.item = match rest.split_first() {
        None => None,
        Some((Token::Directive(name), args)) => Some(parse_directive(name, args, line_num)?),
        Some((Token::Ident(mnemonic), args)) => Some(parse_instruction(mnemonic, args, line_num)?),
        Some((other, _)) => return Err(unexpected(other, line_num)),
    };

    Ok(line)
}

fn parse_directive(name: &str, args: &[Token], line_num: usize) -> Result<Item, AsmError> {
    let args = Args {
        tokens: args,
        line: line_num,
    };
    let item = match name {
        "const" => {
            let name = args.ident(0, ".const", 2)?;
            let value = args.operand(1, ".const", 2)?;
            args.end(2)?;
            Item::Const { name, value }
        }
        "method" => {
            let method_args = args.ranged(0, ".method", 2, "argument count", 0, 0xFFFF)? as u16;
            let locals = args.ranged(1, ".method", 2, "local count", 0, 0xFFFF)? as u16;
            args.end(2)?;
            Item::Method {
                args: method_args,
                locals,
            }
        }
        "byte" => {
            let value = args.ranged(0, ".byte", 1, "byte", -128, 0xFF)?;
            args.end(1)?;
            Item::Byte(value as u8)
        }
        "const-origin" => {
            let origin = args.ranged(0, ".const-origin", 1, "origin", 0, u32::MAX.into())?;
            args.end(1)?;
            Item::ConstOrigin(origin as u32)
        }
        "text-origin" => {
            let origin = args.ranged(0, ".text-origin", 1, "origin", 0, u32::MAX.into())?;
            args.end(1)?;
            Item::TextOrigin(origin as u32)
        }
        other => {
            return Err(AsmError::UnknownDirective {
                line: line_num,
                token: format!(".{other}"),
            })
        }
    };
    Ok(item)
}

fn parse_instruction(mnemonic: &str, args: &[Token], line_num: usize) -> Result<Item, AsmError> {
    let upper = mnemonic.to_uppercase();
    let opcode = Opcode::from_mnemonic(&upper).ok_or_else(|| AsmError::UnknownMnemonic {
        line: line_num,
        token: mnemonic.to_string(),
    })?;

    let m = opcode.mnemonic();
    let args = Args {
        tokens: args,
        line: line_num,
    };

    let item = match opcode {
        // No operands
        Opcode::Nop
        | Opcode::Pop
        | Opcode::Dup
        | Opcode::Swap
        | Opcode::Iadd
        | Opcode::Isub
        | Opcode::Iand
        | Opcode::Ior
        | Opcode::Ireturn
        | Opcode::In
        | Opcode::Out
        | Opcode::Err
        | Opcode::Halt => {
            args.end(0)?;
            Item::Fixed(no_operand(opcode))
        }

        Opcode::Bipush => {
            let value = args.ranged(0, m, 1, "BIPUSH value", -128, 0xFF)?;
            args.end(1)?;
            Item::Fixed(Instruction::Bipush(value as u8 as i8))
        }

        Opcode::Iload | Opcode::Istore | Opcode::Iinc => {
            local_instruction(opcode, &args, false)?
        }

        Opcode::Goto | Opcode::Ifeq | Opcode::Iflt | Opcode::IfIcmpeq => {
            let target = args.operand(0, m, 1)?;
            args.end(1)?;
            Item::Branch { opcode, target }
        }

        Opcode::LdcW | Opcode::Invokevirtual => {
            let target = args.operand(0, m, 1)?;
            args.end(1)?;
            Item::Pool { opcode, target }
        }

        Opcode::Wide => return parse_wide(args.tokens, line_num),
    };

    Ok(item)
}

/// `WIDE ILOAD n`, `WIDE ISTORE n`, `WIDE IINC n d`
fn parse_wide(args: &[Token], line_num: usize) -> Result<Item, AsmError> {
    let (target, rest) = args.split_first().ok_or(AsmError::MissingArgument {
        line: line_num,
        opcode: "WIDE",
        expected: 1,
    })?;
    let opcode = match target {
        Token::Ident(name) => Opcode::from_mnemonic(&name.to_uppercase()),
        _ => None,
    }
    .filter(Opcode::accepts_wide)
    .ok_or_else(|| AsmError::InvalidWide {
        line: line_num,
        token: token_text(target),
    })?;

    let args = Args {
        tokens: rest,
        line: line_num,
    };
    local_instruction(opcode, &args, true)
}

fn local_instruction(opcode: Opcode, args: &Args<'_>, force_wide: bool) -> Result<Item, AsmError> {
    let m = opcode.mnemonic();
    let expected = if opcode == Opcode::Iinc { 2 } else { 1 };
    let index = args.ranged(0, m, expected, "local index", 0, 0xFFFF)? as u16;
    let wide = force_wide || index > 0xFF;

    let instr = match opcode {
        Opcode::Iload => Instruction::Iload { index, wide },
        Opcode::Istore => Instruction::Istore { index, wide },
        _ => {
            let delta = args.ranged(1, m, expected, "IINC delta", -128, 127)? as i8;
            Instruction::Iinc { index, delta, wide }
        }
    };
    args.end(expected)?;
    Ok(Item::Fixed(instr))
}

fn no_operand(opcode: Opcode) -> Instruction {
    match opcode {
        Opcode::Pop => Instruction::Pop,
        Opcode::Dup => Instruction::Dup,
        Opcode::Swap => Instruction::Swap,
        Opcode::Iadd => Instruction::Iadd,
        Opcode::Isub => Instruction::Isub,
        Opcode::Iand => Instruction::Iand,
        Opcode::Ior => Instruction::Ior,
        Opcode::Ireturn => Instruction::Ireturn,
        Opcode::In => Instruction::In,
        Opcode::Out => Instruction::Out,
        Opcode::Err => Instruction::Err,
        Opcode::Halt => Instruction::Halt,
        _ => Instruction::Nop,
    }
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Label(name) => format!("{name}:"),
        Token::Directive(name) => format!(".{name}"),
        Token::Ident(name) => name.clone(),
        Token::Number(n) => n.to_string(),
    }
}

fn unexpected(token: &Token, line_num: usize) -> AsmError {
    AsmError::UnexpectedToken {
        line: line_num,
        token: token_text(token),
    }
}

/// Positional argument accessors for one line.
struct Args<'t> {
    tokens: &'t [Token],
    line: usize,
}

impl Args<'_> {
    fn get(&self, pos: usize, opcode: &'static str, expected: usize) -> Result<&Token, AsmError> {
        self.tokens.get(pos).ok_or(AsmError::MissingArgument {
            line: self.line,
            opcode,
            expected,
        })
    }

    fn number(&self, pos: usize, opcode: &'static str, expected: usize) -> Result<i64, AsmError> {
        match self.get(pos, opcode, expected)? {
            Token::Number(n) => Ok(*n),
            other => Err(unexpected(other, self.line)),
        }
    }

    fn ranged(
        &self,
        pos: usize,
        opcode: &'static str,
        expected: usize,
        what: &'static str,
        min: i64,
        max: i64,
    ) -> Result<i64, AsmError> {
        let value = self.number(pos, opcode, expected)?;
        if !(min..=max).contains(&value) {
            return Err(AsmError::OutOfRange {
                line: self.line,
                what,
                value,
            });
        }
        Ok(value)
    }

    fn ident(&self, pos: usize, opcode: &'static str, expected: usize) -> Result<String, AsmError> {
        match self.get(pos, opcode, expected)? {
            Token::Ident(name) => Ok(name.clone()),
            other => Err(unexpected(other, self.line)),
        }
    }

    fn operand(&self, pos: usize, opcode: &'static str, expected: usize) -> Result<Operand, AsmError> {
        match self.get(pos, opcode, expected)? {
            Token::Number(n) => Ok(Operand::Number(*n)),
            Token::Ident(name) => Ok(Operand::Name(name.clone())),
            other => Err(unexpected(other, self.line)),
        }
    }

    /// Fail if anything follows position `count - 1`.
    fn end(&self, count: usize) -> Result<(), AsmError> {
        match self.tokens.get(count) {
            Some(extra) => Err(unexpected(extra, self.line)),
            None => Ok(()),
        }
    }
}
