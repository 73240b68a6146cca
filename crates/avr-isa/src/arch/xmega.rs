//! XMega additions on top of the classic instruction set.

use crate::encoding::Variant;
use crate::error::TableError;
use crate::operand::OperandKind::{self, Pointer, Register, Unsigned4};
use crate::operand::PointerMode::{Plain, PostIncrement};
use crate::operand::PointerRegister::Z;
use crate::table::TableBuilder;

const N: OperandKind = OperandKind::None;

/// Atomic read-modify-write instructions on the byte addressed by Z.
const ATOMIC: &[(&str, &str)] = &[
    ("lac", "1001 001r rrrr 0110"),
    ("las", "1001 001r rrrr 0101"),
    ("lat", "1001 001r rrrr 0111"),
    ("xch", "1001 001r rrrr 0100"),
];

pub(super) fn register(builder: &mut TableBuilder) -> Result<(), TableError> {
    builder.insn("des", "1001 0100 KKKK 1011", [Unsigned4, N])?;
    builder.insn("eicall", "1001 0101 0001 1001", [N, N])?;
    builder.insn("eijmp", "1001 0100 0001 1001", [N, N])?;
    builder.shaped(
        "elpm",
        1,
        &[
            Variant::bare("1001 0101 1101 1000"),
            Variant::new("1001 000d dddd 0110", [Register, Pointer(Z, Plain)]).implicit_source(),
            Variant::new("1001 000d dddd 0111", [Register, Pointer(Z, PostIncrement)])
                .implicit_source(),
        ],
    )?;
    for &(mnemonic, template) in ATOMIC {
        builder.variant(
            mnemonic,
            Variant::new(template, [Pointer(Z, Plain), Register]).implicit_destination(),
        )?;
    }
    Ok(())
}
