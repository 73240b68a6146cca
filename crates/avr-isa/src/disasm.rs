//! Disassembly driver.
//!
//! Walks a byte buffer instruction by instruction and renders each match as
//! one row of text. Bytes that match no encoding degrade to a raw-byte
//! pseudo-op instead of failing, so corrupt or data-laden images still
//! produce a full listing.

use std::fmt::Write as _;

use tracing::debug;

use crate::decoder::Decoder;
use crate::encoding::DecodedOperand;
use crate::operand::OperandKind;
use crate::resolve::sign_extend;
use crate::table::EncodingTable;

/// Output options of the disassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DisassemblerSettings {
    /// Prefix each line with its byte address.
    pub print_addresses: bool,
    /// Append the raw bytes as a comment.
    pub print_bytes: bool,
    /// Print relative jumps as absolute target addresses.
    pub resolve_relative_addresses: bool,
    /// Print register pairs as their low register (`r24` instead of
    /// `r25:r24`).
    pub print_compound_registers_as_lower: bool,
    /// Byte address of the first input byte.
    pub start_address: u32,
    /// Pseudo-op used for bytes that do not decode.
    pub byte_opcode: String,
}

impl Default for DisassemblerSettings {
    fn default() -> Self {
        Self {
            print_addresses: false,
            print_bytes: false,
            resolve_relative_addresses: false,
            print_compound_registers_as_lower: false,
            start_address: 0,
            byte_opcode: ".db".to_string(),
        }
    }
}

impl DisassemblerSettings {
    /// Output accepted by the GNU assembler.
    #[must_use]
    pub fn avr_as() -> Self {
        Self {
            print_compound_registers_as_lower: true,
            byte_opcode: ".byte".to_string(),
            ..Self::default()
        }
    }
}

/// One line of disassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DisassemblyRow {
    /// Byte address of the first byte.
    pub address: u32,
    /// Bytes covered by the row.
    pub len: usize,
    /// Raw bytes in input order.
    pub bytes: Vec<u8>,
    /// Lower-case mnemonic, or the raw-byte pseudo-op.
    pub mnemonic: String,
    /// Rendered operands.
    pub operands: Vec<String>,
    /// Whether the row is a raw-byte fallback.
    pub is_raw: bool,
}

impl DisassemblyRow {
    /// Mnemonic and operands, e.g. `ld r17,z+`.
    #[must_use]
    pub fn text(&self) -> String {
        if self.operands.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, self.operands.join(","))
        }
    }
}

/// Disassembles `bytes` against `table`.
///
/// Never fails: undecodable input becomes raw-byte rows of two bytes, or one
/// when only one byte remains.
#[must_use]
pub fn disassemble(
    bytes: &[u8],
    table: &EncodingTable,
    settings: &DisassemblerSettings,
) -> Vec<DisassemblyRow> {
    let decoder = Decoder::new(table);
    let mut rows = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        #[allow(clippy::cast_possible_truncation)]
        let address = settings.start_address.wrapping_add(offset as u32);

        let row = if let Some(decoded) = decoder.decode(rest) {
            DisassemblyRow {
                address,
                len: decoded.len,
                bytes: rest[..decoded.len].to_vec(),
                mnemonic: decoded.encoding.mnemonic().to_string(),
                operands: decoded
                    .operands
                    .iter()
                    .map(|operand| format_operand(*operand, address, settings))
                    .collect(),
                is_raw: false,
            }
        } else {
            let len = rest.len().min(2);
            debug!(
                address = format_args!("{address:#06x}"),
                len, "no instruction matches, emitting raw bytes"
            );
            DisassemblyRow {
                address,
                len,
                bytes: rest[..len].to_vec(),
                mnemonic: settings.byte_opcode.clone(),
                operands: rest[..len].iter().map(|b| format!("0x{b:02x}")).collect(),
                is_raw: true,
            }
        };
        offset += row.len;
        rows.push(row);
    }
    rows
}

/// Renders rows as text, one per line.
#[must_use]
pub fn format_listing(rows: &[DisassemblyRow], settings: &DisassemblerSettings) -> String {
    let mut out = String::new();
    for row in rows {
        if settings.print_addresses {
            let _ = write!(out, "{:04x}: ", row.address);
        }
        out.push_str(&row.text());
        if settings.print_bytes {
            out.push_str(" ; ");
            let bytes: Vec<String> = row.bytes.iter().map(|b| format!("{b:02x}")).collect();
            out.push_str(&bytes.join(" "));
        }
        out.push('\n');
    }
    out
}

fn format_operand(operand: DecodedOperand, address: u32, settings: &DisassemblerSettings) -> String {
    let (kind, raw) = match operand {
        DecodedOperand::Implicit(kind) => {
            return kind.implicit_text().unwrap_or_default().to_lowercase();
        }
        DecodedOperand::Field { kind, raw } => (kind, raw),
    };
    let pair = |low: u32| {
        if settings.print_compound_registers_as_lower {
            format!("r{low}")
        } else {
            format!("r{}:r{low}", low + 1)
        }
    };
    match kind {
        OperandKind::Register | OperandKind::RegisterLow => format!("r{raw}"),
        OperandKind::RegisterHigh | OperandKind::RegisterMul => format!("r{}", raw + 16),
        OperandKind::RegisterPair => pair(24 + 2 * raw),
        OperandKind::RegisterPairAny => pair(2 * raw),
        OperandKind::Pointer(..) | OperandKind::None => {
            kind.implicit_text().unwrap_or_default().to_lowercase()
        }
        OperandKind::Displacement(pointer) => {
            format!("{}+{raw}", pointer.to_string().to_lowercase())
        }
        OperandKind::Unsigned3 | OperandKind::Unsigned4 => raw.to_string(),
        OperandKind::BranchOffset7 | OperandKind::JumpOffset12 => {
            let offset = i64::from(sign_extend(raw, kind.field_width())) * 2;
            if settings.resolve_relative_addresses {
                format!("0x{:x}", i64::from(address) + offset)
            } else if offset < 0 {
                format!(".{offset}")
            } else {
                format!(".+{offset}")
            }
        }
        OperandKind::FlashAddress22 => format!("0x{:06x}", u64::from(raw) * 2),
        OperandKind::Unsigned6
        | OperandKind::Unsigned8
        | OperandKind::IoAddress5
        | OperandKind::IoAddress6
        | OperandKind::DataAddress7
        | OperandKind::DataAddress16 => {
            let digits = if kind.field_width() > 8 { 4 } else { 2 };
            format!("0x{raw:0digits$x}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{disassemble, format_listing, DisassemblerSettings};
    use crate::arch::Architecture;
    use rstest::rstest;

    fn first_line(bytes: &[u8], arch: Architecture, settings: &DisassemblerSettings) -> String {
        disassemble(bytes, arch.table(), settings)[0].text()
    }

    #[rstest]
    #[case(&[0xF8, 0x95], Architecture::ATMega88, "spm z+")]
    #[case(&[0x11, 0x91], Architecture::ATMega88, "ld r17,z+")]
    #[case(&[0x44, 0x92], Architecture::XMega, "xch z,r4")]
    #[case(&[0x97, 0x91], Architecture::XMega, "elpm r25,z+")]
    #[case(&[0x42, 0xA8], Architecture::ATMega88, "ldd r4,z+50")]
    #[case(&[0x5F, 0x95, 0xAC, 0xDF], Architecture::ATMega88, "call 0x57bf58")]
    #[case(&[0x8F, 0x83], Architecture::ATMega88, "std y+7,r24")]
    #[case(&[0x01, 0x0C], Architecture::ATMega88, "add r0,r1")]
    #[case(&[0x55, 0x24], Architecture::ATMega88, "clr r5")]
    #[case(&[0x56, 0x24], Architecture::ATMega88, "eor r5,r6")]
    #[case(&[0x00, 0x00], Architecture::ATMega88, "nop")]
    #[case(&[0x0F, 0xEF], Architecture::ATMega88, "ser r16")]
    #[case(&[0x3F, 0xB7], Architecture::ATMega88, "in r19,0x3f")]
    #[case(&[0xC0, 0x96], Architecture::ATMega88, "adiw r25:r24,0x30")]
    #[case(&[0x12, 0x01], Architecture::ATMega88, "movw r3:r2,r5:r4")]
    #[case(&[0x0A, 0x03], Architecture::ATMega88, "fmul r16,r18")]
    #[case(&[0x8A, 0x03], Architecture::ATMega88, "fmulsu r16,r18")]
    #[case(&[0x18, 0x94], Architecture::ATMega88, "sez")]
    fn known_words(#[case] bytes: &[u8], #[case] arch: Architecture, #[case] expected: &str) {
        assert_eq!(first_line(bytes, arch, &DisassemblerSettings::default()), expected);
    }

    #[test]
    fn relative_offsets_are_printed_in_bytes() {
        let settings = DisassemblerSettings::default();
        // rjmp .-2
        assert_eq!(first_line(&[0xFF, 0xCF], Architecture::ATMega88, &settings), "rjmp .-2");
        // breq .+6
        assert_eq!(first_line(&[0x19, 0xF0], Architecture::ATMega88, &settings), "breq .+6");
        let resolved = DisassemblerSettings {
            resolve_relative_addresses: true,
            start_address: 0x100,
            ..DisassemblerSettings::default()
        };
        assert_eq!(first_line(&[0x19, 0xF0], Architecture::ATMega88, &resolved), "breq 0x106");
    }

    #[test]
    fn unknown_bytes_fall_back_to_raw_directive() {
        let rows = disassemble(&[0xFF, 0xFF, 0x00], Architecture::ATMega88.table(), &DisassemblerSettings::default());
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_raw);
        assert_eq!(rows[0].len, 2);
        assert_eq!(rows[0].text(), ".db 0xff,0xff");
        assert_eq!(rows[1].address, 2);
        assert_eq!(rows[1].text(), ".db 0x00");
    }

    #[test]
    fn avr_as_preset_prints_low_registers() {
        let settings = DisassemblerSettings::avr_as();
        assert_eq!(first_line(&[0xC0, 0x96], Architecture::ATMega88, &settings), "adiw r24,0x30");
        assert_eq!(first_line(&[0xFF, 0xFF], Architecture::ATMega88, &settings), ".byte 0xff,0xff");
    }

    #[test]
    fn listing_adds_addresses_and_bytes() {
        let settings = DisassemblerSettings {
            print_addresses: true,
            print_bytes: true,
            start_address: 0x10,
            ..DisassemblerSettings::default()
        };
        let rows = disassemble(&[0x01, 0x0C, 0x00, 0x00], Architecture::ATMega88.table(), &settings);
        assert_eq!(
            format_listing(&rows, &settings),
            "0010: add r0,r1 ; 01 0c\n0012: nop ; 00 00\n"
        );
    }
}
