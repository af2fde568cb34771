//! Disassembler: IJVM module → canonical assembly text.
//!
//! Output layout:
//! ```text
//! .const-origin 0x00010000
//! .text-origin 0x00000000
//! .const c0 12
//! .method 2 0
//! ILOAD 1
//! ...
//! ```
//!
//! Operands are always numeric, so reassembly needs no symbol table.
//! Method headers are recognised at offsets named by constants that some
//! reachable INVOKEVIRTUAL refers to; anything the sweep cannot decode is
//! emitted as `.byte`.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use ijvm_common::{Instruction, Module};

/// One swept text entry.
enum Entry {
    Method { args: u16, locals: u16 },
    Instr(Instruction),
    Byte(u8),
}

/// Disassemble a module into canonical assembly text.
///
/// `assemble(&disassemble(module)) == Ok(module)` holds for every module.
pub fn disassemble(module: &Module) -> String {
    let entries = sweep_to_fixed_point(module);

    let mut out = String::new();
    let _ = writeln!(out, ".const-origin 0x{:08x}", module.constant_origin);
    let _ = writeln!(out, ".text-origin 0x{:08x}", module.text_origin);
    for (i, value) in module.constants.iter().enumerate() {
        let _ = writeln!(out, ".const c{i} {value}");
    }
    for entry in entries {
        let _ = match entry {
            Entry::Method { args, locals } => writeln!(out, ".method {args} {locals}"),
            Entry::Instr(instr) => writeln!(out, "{instr}"),
            Entry::Byte(byte) => writeln!(out, ".byte 0x{byte:02x}"),
        };
    }
    out
}

/// Sweep repeatedly, growing the set of method entry points until the
/// INVOKEVIRTUAL targets found by the sweep stop changing.
fn sweep_to_fixed_point(module: &Module) -> Vec<Entry> {
    let mut methods = BTreeSet::new();
    loop {
        let entries = sweep(module, &methods);
        let before = methods.len();
        for entry in &entries {
            if let Entry::Instr(Instruction::Invokevirtual(index)) = entry {
                if let Some(offset) = method_offset(module, *index) {
                    methods.insert(offset);
                }
            }
        }
        if methods.len() == before {
            return entries;
        }
    }
}

fn method_offset(module: &Module, index: u16) -> Option<usize> {
    let value = module.constant(usize::from(index))?;
    let offset = usize::try_from(value).ok()?;
    module.method_header(offset).map(|_| offset)
}

fn sweep(module: &Module, methods: &BTreeSet<usize>) -> Vec<Entry> {
    let text = &module.text;
    let mut entries = Vec::new();
    let mut at = 0;

    while at < text.len() {
        if methods.contains(&at) {
            if let Some((args, locals)) = module.method_header(at) {
                entries.push(Entry::Method { args, locals });
                at += 4;
                continue;
            }
        }
        match Instruction::decode(text, at) {
            Ok(instr) => {
                at += instr.len();
                entries.push(Entry::Instr(instr));
            }
            Err(_) => {
                entries.push(Entry::Byte(text[at]));
                at += 1;
            }
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassemble_straight_line() {
        let module = Module::new(vec![], vec![0x10, 7, 0x10, 5, 0x64, 0xFD, 0xFF]);
        assert_eq!(
            disassemble(&module),
            "\
.const-origin 0x00010000
.text-origin 0x00000000
BIPUSH 7
BIPUSH 5
ISUB
OUT
HALT
"
        );
    }

    #[test]
    fn unknown_bytes_become_byte_directives() {
        let module = Module::new(vec![], vec![0xBB, 0x10]);
        let text = disassemble(&module);
        assert!(text.ends_with(".byte 0xbb\n.byte 0x10\n"));
    }

    #[test]
    fn invoked_method_header_is_recognised() {
        // BIPUSH 0, INVOKEVIRTUAL 0, HALT, then a method at offset 6
        let text = vec![
            0x10, 0x00, 0xB6, 0x00, 0x00, 0xFF, // caller
            0x00, 0x01, 0x00, 0x00, // .method 1 0
            0x10, 0x2A, 0xAC, // BIPUSH 42, IRETURN
        ];
        let module = Module::new(vec![6], text);
        let out = disassemble(&module);
        assert!(out.contains(".const c0 6\n"));
        assert!(out.contains("HALT\n.method 1 0\nBIPUSH 42\nIRETURN\n"));
    }

    #[test]
    fn constant_not_invoked_is_not_a_method() {
        // LDC_W 0 refers to the constant but does not make it a method
        let module = Module::new(vec![4], vec![0x13, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00]);
        let out = disassemble(&module);
        assert!(!out.contains(".method"));
    }

    #[test]
    fn nested_invocations_reach_fixed_point() {
        // main invokes c0 at 6, which invokes c1 at 15
        let text = vec![
            0x10, 0x00, 0xB6, 0x00, 0x00, 0xFF, // main
            0x00, 0x01, 0x00, 0x00, // .method 1 0
            0x10, 0x00, 0xB6, 0x00, 0x01, // BIPUSH 0, INVOKEVIRTUAL 1
            0x00, 0x01, 0x00, 0x00, // .method 1 0
            0x10, 0x09, 0xAC, // BIPUSH 9, IRETURN
        ];
        let module = Module::new(vec![6, 15], text);
        let out = disassemble(&module);
        assert_eq!(out.matches(".method 1 0").count(), 2);
    }
}
