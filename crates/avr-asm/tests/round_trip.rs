//! Disassembly text parses back into the same machine code.

#![allow(clippy::pedantic, clippy::nursery)]

use avr_asm::context::BufferContext;
use avr_asm::parser::parse_instruction;
use avr_isa::{disassemble, DisassemblerSettings, ARCHITECTURES};
use tempfile as _;
use tracing as _;
use tracing_subscriber as _;

#[test]
fn every_decodable_word_reassembles_to_itself() {
    let settings = DisassemblerSettings::default();
    for arch in ARCHITECTURES {
        let table = arch.table();
        let layout = arch.layout();
        let mut checked = 0usize;

        for word in 0..=u16::MAX {
            let bytes = word.to_le_bytes();
            let rows = disassemble(&bytes, table, &settings);
            let [row] = rows.as_slice() else {
                continue;
            };
            if row.is_raw || row.len != 2 {
                continue;
            }

            let text = row.text();
            let instruction = parse_instruction(&text, 1)
                .unwrap_or_else(|e| panic!("{arch}: '{text}' does not parse: {e}"));
            let node = instruction.to_node(|_| None);
            let mut output = BufferContext::at(0);
            table
                .compile(&node, &layout, &mut output, None)
                .unwrap_or_else(|e| panic!("{arch}: '{text}' does not compile: {e}"));
            assert_eq!(output.bytes, bytes, "{arch}: '{text}' from {word:#06x}");
            checked += 1;
        }
        assert!(checked > 40_000, "{arch}: only {checked} words decoded");
    }
}

#[test]
fn thirty_two_bit_calls_reassemble() {
    let arch = avr_isa::Architecture::ATMega328p;
    for bytes in [[0x0E, 0x94, 0x80, 0x00], [0x0C, 0x94, 0x34, 0x12]] {
        let rows = disassemble(&bytes, arch.table(), &DisassemblerSettings::default());
        let text = rows[0].text();
        let node = parse_instruction(&text, 1).unwrap().to_node(|_| None);
        let mut output = BufferContext::at(0);
        assert_eq!(
            arch.table().compile(&node, &arch.layout(), &mut output, None),
            Ok(4)
        );
        assert_eq!(output.bytes, bytes, "{text}");
    }
}
