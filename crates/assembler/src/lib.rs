//! IJVM assembler: text ↔ module translation.
//!
//! Source is line oriented. Each line holds an optional `label:`, then one
//! instruction or directive, then an optional `; comment`.
//!
//! # Usage
//!
//! ```
//! use ijvm_assembler::{assemble, disassemble};
//!
//! let module = assemble("BIPUSH 7\nBIPUSH 5\nISUB\nOUT\nHALT\n").unwrap();
//! assert_eq!(module.text, vec![0x10, 7, 0x10, 5, 0x64, 0xFD, 0xFF]);
//!
//! let text = disassemble(&module);
//! assert_eq!(assemble(&text).unwrap(), module);
//! ```
//!
//! # Roundtrip Guarantee
//!
//! `assemble(disassemble(module)) == module` holds for every module. The
//! disassembler prints numeric operands only; the assembler additionally
//! accepts labels for branches and `.const` values, and constant names for
//! LDC_W and INVOKEVIRTUAL.

pub mod error;

mod disassembler;
mod lexer;
mod parser;

pub use disassembler::disassemble;
pub use error::AsmError;

use std::collections::HashMap;

use ijvm_common::module::{DEFAULT_CONSTANT_ORIGIN, DEFAULT_TEXT_ORIGIN};
use ijvm_common::{Instruction, Module, Opcode, Word};
use lexer::tokenize_line;
use parser::{parse_line, Item, Operand};

/// Assemble text into a module.
///
/// Two passes: the first lays out text offsets and collects labels and
/// constants, the second resolves names and emits bytes. Returns the first
/// error encountered.
pub fn assemble(text: &str) -> Result<Module, AsmError> {
    let layout = Layout::collect(text)?;
    let constants = layout.resolve_constants()?;
    let text = layout.emit_text()?;

    Ok(Module {
        constant_origin: layout.constant_origin,
        constants,
        text_origin: layout.text_origin,
        text,
    })
}

/// Result of the first pass.
struct Layout {
    constant_origin: u32,
    text_origin: u32,
    /// `(line, offset, item)` for every item that occupies text.
    items: Vec<(usize, usize, Item)>,
    /// `(line, value)` in declaration order.
    constants: Vec<(usize, Operand)>,
    constant_index: HashMap<String, u16>,
    labels: HashMap<String, usize>,
}

impl Layout {
    fn collect(text: &str) -> Result<Self, AsmError> {
        let mut layout = Layout {
            constant_origin: DEFAULT_CONSTANT_ORIGIN,
            text_origin: DEFAULT_TEXT_ORIGIN,
            items: Vec::new(),
            constants: Vec::new(),
            constant_index: HashMap::new(),
            labels: HashMap::new(),
        };
        let mut offset = 0;

        for (idx, source) in text.lines().enumerate() {
            let line_num = idx + 1;
            let tokens = tokenize_line(source, line_num)?;
            let line = parse_line(&tokens, line_num)?;

            if let Some(name) = line.label {
                if layout.labels.insert(name.clone(), offset).is_some() {
                    return Err(AsmError::DuplicateLabel {
                        line: line_num,
                        name,
                    });
                }
            }

            match line.item {
                None => {}
                Some(Item::ConstOrigin(origin)) => layout.constant_origin = origin,
                Some(Item::TextOrigin(origin)) => layout.text_origin = origin,
                Some(Item::Const { name, value }) => {
                    let index = u16::try_from(layout.constants.len()).map_err(|_| {
                        AsmError::OutOfRange {
                            line: line_num,
                            what: "constant count",
                            value: layout.constants.len() as i64 + 1,
                        }
                    })?;
                    if layout.constant_index.insert(name.clone(), index).is_some() {
                        return Err(AsmError::DuplicateConstant {
                            line: line_num,
                            name,
                        });
                    }
                    layout.constants.push((line_num, value));
                }
                Some(item) => {
                    let size = item.size();
                    layout.items.push((line_num, offset, item));
                    offset += size;
                }
            }
        }

        Ok(layout)
    }

    fn label(&self, name: &str, line: usize) -> Result<usize, AsmError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| AsmError::UndefinedLabel {
                line,
                name: name.to_string(),
            })
    }

    /// Constant values: numbers as written, labels as text offsets.
    fn resolve_constants(&self) -> Result<Vec<Word>, AsmError> {
        self.constants
            .iter()
            .map(|(line, value)| match value {
                Operand::Number(n) => {
                    if !(i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(n) {
                        return Err(AsmError::OutOfRange {
                            line: *line,
                            what: "constant",
                            value: *n,
                        });
                    }
                    Ok(*n as u32 as Word)
                }
                Operand::Name(name) => {
                    let offset = self.label(name, *line)?;
                    Word::try_from(offset).map_err(|_| AsmError::OutOfRange {
                        line: *line,
                        what: "label offset",
                        value: offset as i64,
                    })
                }
            })
            .collect()
    }

    fn emit_text(&self) -> Result<Vec<u8>, AsmError> {
        let mut out = Vec::new();

        for (line, offset, item) in &self.items {
            let (line, offset) = (*line, *offset);
            match item {
                Item::Fixed(instr) => instr.encode(&mut out),
                Item::Branch { opcode, target } => {
                    let delta = match target {
                        Operand::Number(n) => *n,
                        Operand::Name(name) => self.label(name, line)? as i64 - offset as i64,
                    };
                    let delta = i16::try_from(delta)
                        .map_err(|_| AsmError::BranchTooFar { line, offset: delta })?;
                    branch(*opcode, delta).encode(&mut out);
                }
                Item::Pool { opcode, target } => {
                    let index = match target {
                        Operand::Number(n) => {
                            u16::try_from(*n).map_err(|_| AsmError::OutOfRange {
                                line,
                                what: "constant index",
                                value: *n,
                            })?
                        }
                        Operand::Name(name) => self
                            .constant_index
                            .get(name)
                            .copied()
                            .ok_or_else(|| AsmError::UndefinedConstant {
                                line,
                                name: name.clone(),
                            })?,
                    };
                    let instr = if *opcode == Opcode::LdcW {
                        Instruction::LdcW(index)
                    } else {
                        Instruction::Invokevirtual(index)
                    };
                    instr.encode(&mut out);
                }
                Item::Method { args, locals } => {
                    out.extend_from_slice(&args.to_be_bytes());
                    out.extend_from_slice(&locals.to_be_bytes());
                }
                Item::Byte(byte) => out.push(*byte),
                Item::Const { .. } | Item::ConstOrigin(_) | Item::TextOrigin(_) => {}
            }
        }

        Ok(out)
    }
}

fn branch(opcode: Opcode, offset: i16) -> Instruction {
    match opcode {
        Opcode::Ifeq => Instruction::Ifeq(offset),
        Opcode::Iflt => Instruction::Iflt(offset),
        Opcode::IfIcmpeq => Instruction::IfIcmpeq(offset),
        _ => Instruction::Goto(offset),
    }
}
