//! The assembler and disassembler.
//!
//! Binary encodings live with the operations in `op.rs`; this module holds
//! the imperative logic that turns a checked [`Program`] into a textual
//! machine-code listing, and the reverse direction that reconstructs HERA
//! mnemonics from a listing.

use crate::checker::Program;
use crate::op::{CodeOp, RealOp};

/// Encode a program into machine words: `(code, data)`. Debugging
/// operations contribute nothing (they are elided by the checker in
/// assembly mode), and data directives only shape the data image.
pub fn assemble(program: &Program) -> (Vec<u16>, Vec<u16>) {
    let code = program
        .code
        .iter()
        .filter_map(|rop| match &rop.op {
            CodeOp::Real(op) => Some(op.encode()),
            CodeOp::Debug(_) => None,
        })
        .collect();
    (code, program.data_image())
}

/// The machine-code listing: one word per line, four uppercase hex digits,
/// no prefix.
pub fn code_listing(program: &Program) -> String {
    let (code, _) = assemble(program);
    let mut out = String::new();
    for word in code {
        out.push_str(&format!("{:04X}\n", word));
    }
    out
}

/// Invert a machine-code listing word by word. Unknown encodings render as
/// `OPCODE(...)`; lines that are not hex literals are flagged in place.
pub fn disassemble_listing(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match u16::from_str_radix(line.trim_start_matches("0x"), 16) {
            Ok(word) => match RealOp::decode(word) {
                Some(op) => out.push_str(&format!("{}\n", op)),
                None => out.push_str(&format!("OPCODE(0x{:04x})\n", word)),
            },
            Err(_) => out.push_str(&format!("// Invalid hex literal: {}\n", line)),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checker::check;
    use crate::parser::parse;
    use crate::settings::{Mode, Settings};
    use crate::span::SourceFile;

    fn assemble_str(text: &str) -> Program {
        let settings = Settings::new(Mode::Assemble);
        let (ops, parse_messages) = parse(SourceFile::new("<test>", text), &settings);
        assert!(!parse_messages.has_errors(), "{:?}", parse_messages);
        let (program, messages) = check(ops, &settings);
        assert!(!messages.has_errors(), "{:?}", messages);
        program
    }

    #[test]
    fn listing_format() {
        let program = assemble_str("SET(R1, 10)\nHALT()");
        assert_eq!(code_listing(&program), "E10A\nF100\n0100\n");
    }

    #[test]
    fn debug_ops_emit_nothing() {
        let program = assemble_str("SET(R1, 1)\nprint_reg(R1)\nHALT()");
        let (code, _) = assemble(&program);
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn data_words() {
        let program = assemble_str("DLABEL(X)\nINTEGER(-1)\nLP_STRING(\"ok\")\nNOP()");
        let (code, data) = assemble(&program);
        assert_eq!(code, vec![0x0101]);
        assert_eq!(data, vec![0xFFFF, 2, 'o' as u16, 'k' as u16]);
    }

    #[test]
    fn opcode_words_pass_through() {
        let program = assemble_str("OPCODE(0xA312)");
        let (code, _) = assemble(&program);
        assert_eq!(code, vec![0xA312]);
    }

    #[test]
    fn disassembly_round_trip() {
        let program = assemble_str("SET(R1, 10)\nADD(R3, R1, R2)\nLOAD(R4, 3, R1)\nHALT()");
        let listing = code_listing(&program);
        let disassembled = disassemble_listing(&listing);
        assert_eq!(
            disassembled,
            "SETLO(R1, 10)\nSETHI(R1, 0)\nADD(R3, R1, R2)\nLOAD(R4, 3, R1)\nHALT()\n"
        );
    }

    #[test]
    fn unknown_words_become_opcodes() {
        assert_eq!(disassemble_listing("0102"), "OPCODE(0x0102)\n");
        assert_eq!(
            disassemble_listing("xyzzy"),
            "// Invalid hex literal: xyzzy\n"
        );
    }
}
