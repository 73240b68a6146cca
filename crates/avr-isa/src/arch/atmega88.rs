//! Classic AVR instruction set (ATmega88 / ATmega328p).

use crate::encoding::Variant;
use crate::error::TableError;
use crate::operand::OperandKind::{
    self, BranchOffset7, DataAddress16, DataAddress7, Displacement, FlashAddress22, IoAddress5,
    IoAddress6, JumpOffset12, Pointer, Register, RegisterHigh, RegisterMul, RegisterPair,
    RegisterPairAny, Unsigned3, Unsigned6, Unsigned8,
};
use crate::operand::PointerMode::{Plain, PostIncrement, PreDecrement};
use crate::operand::PointerRegister::{X, Y, Z};
use crate::resolve::Transform;
use crate::table::TableBuilder;

const N: OperandKind = OperandKind::None;

/// Mnemonics with exactly one plain form.
const SINGLE_FORM: &[(&str, &str, [OperandKind; 2])] = &[
    ("adc", "0001 11rd dddd rrrr", [Register, Register]),
    ("add", "0000 11rd dddd rrrr", [Register, Register]),
    ("adiw", "1001 0110 KKdd KKKK", [RegisterPair, Unsigned6]),
    ("and", "0010 00rd dddd rrrr", [Register, Register]),
    ("andi", "0111 KKKK dddd KKKK", [RegisterHigh, Unsigned8]),
    ("asr", "1001 010d dddd 0101", [Register, N]),
    ("bclr", "1001 0100 1ddd 1000", [Unsigned3, N]),
    ("bld", "1111 100d dddd 0sss", [Register, Unsigned3]),
    ("brbc", "1111 01ss ssss sddd", [Unsigned3, BranchOffset7]),
    ("brbs", "1111 00ss ssss sddd", [Unsigned3, BranchOffset7]),
    ("break", "1001 0101 1001 1000", [N, N]),
    ("bset", "1001 0100 0sss 1000", [Unsigned3, N]),
    ("bst", "1111 101d dddd 0sss", [Register, Unsigned3]),
    ("call", "1001 010k kkkk 111k kkkk kkkk kkkk kkkk", [FlashAddress22, N]),
    ("cbi", "1001 1000 dddd dsss", [IoAddress5, Unsigned3]),
    ("com", "1001 010d dddd 0000", [Register, N]),
    ("cp", "0001 01rd dddd rrrr", [Register, Register]),
    ("cpc", "0000 01rd dddd rrrr", [Register, Register]),
    ("cpi", "0011 KKKK dddd KKKK", [RegisterHigh, Unsigned8]),
    ("cpse", "0001 00rd dddd rrrr", [Register, Register]),
    ("dec", "1001 010d dddd 1010", [Register, N]),
    ("eor", "0010 01rd dddd rrrr", [Register, Register]),
    ("fmul", "0000 0011 0ddd 1rrr", [RegisterMul, RegisterMul]),
    ("fmuls", "0000 0011 1ddd 0rrr", [RegisterMul, RegisterMul]),
    ("fmulsu", "0000 0011 1ddd 1rrr", [RegisterMul, RegisterMul]),
    ("icall", "1001 0101 0000 1001", [N, N]),
    ("ijmp", "1001 0100 0000 1001", [N, N]),
    ("in", "1011 0ssd dddd ssss", [Register, IoAddress6]),
    ("inc", "1001 010d dddd 0011", [Register, N]),
    ("jmp", "1001 010k kkkk 110k kkkk kkkk kkkk kkkk", [FlashAddress22, N]),
    ("ldi", "1110 KKKK dddd KKKK", [RegisterHigh, Unsigned8]),
    ("lsr", "1001 010d dddd 0110", [Register, N]),
    ("mov", "0010 11rd dddd rrrr", [Register, Register]),
    ("movw", "0000 0001 dddd rrrr", [RegisterPairAny, RegisterPairAny]),
    ("mul", "1001 11rd dddd rrrr", [Register, Register]),
    ("muls", "0000 0010 dddd rrrr", [RegisterHigh, RegisterHigh]),
    ("mulsu", "0000 0011 0ddd 0rrr", [RegisterMul, RegisterMul]),
    ("neg", "1001 010d dddd 0001", [Register, N]),
    ("nop", "0000 0000 0000 0000", [N, N]),
    ("or", "0010 10rd dddd rrrr", [Register, Register]),
    ("ori", "0110 KKKK dddd KKKK", [RegisterHigh, Unsigned8]),
    ("out", "1011 1ddr rrrr dddd", [IoAddress6, Register]),
    ("pop", "1001 000d dddd 1111", [Register, N]),
    ("push", "1001 001d dddd 1111", [Register, N]),
    ("rcall", "1101 kkkk kkkk kkkk", [JumpOffset12, N]),
    ("ret", "1001 0101 0000 1000", [N, N]),
    ("reti", "1001 0101 0001 1000", [N, N]),
    ("rjmp", "1100 kkkk kkkk kkkk", [JumpOffset12, N]),
    ("ror", "1001 010d dddd 0111", [Register, N]),
    ("sbc", "0000 10rd dddd rrrr", [Register, Register]),
    ("sbci", "0100 KKKK dddd KKKK", [RegisterHigh, Unsigned8]),
    ("sbi", "1001 1010 dddd dsss", [IoAddress5, Unsigned3]),
    ("sbic", "1001 1001 dddd dsss", [IoAddress5, Unsigned3]),
    ("sbis", "1001 1011 dddd dsss", [IoAddress5, Unsigned3]),
    ("sbiw", "1001 0111 KKdd KKKK", [RegisterPair, Unsigned6]),
    ("sbrc", "1111 110d dddd 0sss", [Register, Unsigned3]),
    ("sbrs", "1111 111d dddd 0sss", [Register, Unsigned3]),
    ("ser", "1110 1111 dddd 1111", [RegisterHigh, N]),
    ("sleep", "1001 0101 1000 1000", [N, N]),
    ("sub", "0001 10rd dddd rrrr", [Register, Register]),
    ("subi", "0101 KKKK dddd KKKK", [RegisterHigh, Unsigned8]),
    ("swap", "1001 010d dddd 0010", [Register, N]),
    ("wdr", "1001 0101 1010 1000", [N, N]),
];

/// Conditional branches on a single status flag, `brbs`/`brbc` with the bit
/// number folded into the opcode.
const BRANCHES: &[(&str, &str)] = &[
    ("brcs", "1111 00kk kkkk k000"),
    ("brlo", "1111 00kk kkkk k000"),
    ("breq", "1111 00kk kkkk k001"),
    ("brmi", "1111 00kk kkkk k010"),
    ("brvs", "1111 00kk kkkk k011"),
    ("brlt", "1111 00kk kkkk k100"),
    ("brhs", "1111 00kk kkkk k101"),
    ("brts", "1111 00kk kkkk k110"),
    ("brie", "1111 00kk kkkk k111"),
    ("brcc", "1111 01kk kkkk k000"),
    ("brsh", "1111 01kk kkkk k000"),
    ("brne", "1111 01kk kkkk k001"),
    ("brpl", "1111 01kk kkkk k010"),
    ("brvc", "1111 01kk kkkk k011"),
    ("brge", "1111 01kk kkkk k100"),
    ("brhc", "1111 01kk kkkk k101"),
    ("brtc", "1111 01kk kkkk k110"),
    ("brid", "1111 01kk kkkk k111"),
];

/// Status flag set/clear instructions, `bset`/`bclr` with a fixed bit.
const FLAGS: &[(&str, &str)] = &[
    ("sec", "1001 0100 0000 1000"),
    ("sez", "1001 0100 0001 1000"),
    ("sen", "1001 0100 0010 1000"),
    ("sev", "1001 0100 0011 1000"),
    ("ses", "1001 0100 0100 1000"),
    ("seh", "1001 0100 0101 1000"),
    ("set", "1001 0100 0110 1000"),
    ("sei", "1001 0100 0111 1000"),
    ("clc", "1001 0100 1000 1000"),
    ("clz", "1001 0100 1001 1000"),
    ("cln", "1001 0100 1010 1000"),
    ("clv", "1001 0100 1011 1000"),
    ("cls", "1001 0100 1100 1000"),
    ("clh", "1001 0100 1101 1000"),
    ("clt", "1001 0100 1110 1000"),
    ("cli", "1001 0100 1111 1000"),
];

/// One-operand shorthands that write their register into both fields of a
/// two-operand instruction, paired with that instruction.
const SAME_OPERANDS: &[(&str, &str, &str)] = &[
    ("clr", "0010 01sd dddd ssss", "eor"),
    ("lsl", "0000 11sd dddd ssss", "add"),
    ("rol", "0001 11sd dddd ssss", "adc"),
    ("tst", "0010 00sd dddd ssss", "and"),
];

const fn load(template: &'static str, pointer: OperandKind) -> Variant {
    Variant::new(template, [Register, pointer]).implicit_source()
}

const fn store(template: &'static str, pointer: OperandKind) -> Variant {
    Variant::new(template, [pointer, Register]).implicit_destination()
}

/// Registers the classic instruction set.
pub(super) fn register(builder: &mut TableBuilder) -> Result<(), TableError> {
    for &(mnemonic, template, operands) in SINGLE_FORM {
        builder.insn(mnemonic, template, operands)?;
    }
    for &(mnemonic, template) in BRANCHES {
        builder.insn(mnemonic, template, [BranchOffset7, N])?;
    }
    for &(mnemonic, template) in FLAGS {
        builder.insn(mnemonic, template, [N, N])?;
    }
    for &(single, template, _) in SAME_OPERANDS {
        builder.variant(single, Variant::new(template, [Register, N]).duplicated())?;
    }

    builder.variant(
        "cbr",
        Variant::new("0111 KKKK dddd KKKK", [RegisterHigh, Unsigned8])
            .source_transform(Transform::Invert8),
    )?;
    builder.insn("sbr", "0110 KKKK dddd KKKK", [RegisterHigh, Unsigned8])?;

    builder.shaped(
        "ld",
        1,
        &[
            load("1001 000d dddd 1100", Pointer(X, Plain)),
            load("1001 000d dddd 1101", Pointer(X, PostIncrement)),
            load("1001 000d dddd 1110", Pointer(X, PreDecrement)),
            load("1000 000d dddd 1000", Pointer(Y, Plain)),
            load("1001 000d dddd 1001", Pointer(Y, PostIncrement)),
            load("1001 000d dddd 1010", Pointer(Y, PreDecrement)),
            load("1000 000d dddd 0000", Pointer(Z, Plain)),
            load("1001 000d dddd 0001", Pointer(Z, PostIncrement)),
            load("1001 000d dddd 0010", Pointer(Z, PreDecrement)),
        ],
    )?;
    builder.shaped(
        "ldd",
        1,
        &[
            Variant::new("10k0 kk0d dddd 1kkk", [Register, Displacement(Y)]),
            Variant::new("10k0 kk0d dddd 0kkk", [Register, Displacement(Z)]),
        ],
    )?;
    builder.shaped(
        "st",
        0,
        &[
            store("1001 001r rrrr 1100", Pointer(X, Plain)),
            store("1001 001r rrrr 1101", Pointer(X, PostIncrement)),
            store("1001 001r rrrr 1110", Pointer(X, PreDecrement)),
            store("1000 001r rrrr 1000", Pointer(Y, Plain)),
            store("1001 001r rrrr 1001", Pointer(Y, PostIncrement)),
            store("1001 001r rrrr 1010", Pointer(Y, PreDecrement)),
            store("1000 001r rrrr 0000", Pointer(Z, Plain)),
            store("1001 001r rrrr 0001", Pointer(Z, PostIncrement)),
            store("1001 001r rrrr 0010", Pointer(Z, PreDecrement)),
        ],
    )?;
    builder.shaped(
        "std",
        0,
        &[
            Variant::new("10d0 dd1s ssss 1ddd", [Displacement(Y), Register]),
            Variant::new("10d0 dd1s ssss 0ddd", [Displacement(Z), Register]),
        ],
    )?;
    builder.shaped(
        "lpm",
        1,
        &[
            Variant::bare("1001 0101 1100 1000"),
            load("1001 000d dddd 0100", Pointer(Z, Plain)),
            load("1001 000d dddd 0101", Pointer(Z, PostIncrement)),
        ],
    )?;
    builder.shaped(
        "spm",
        0,
        &[
            Variant::bare("1001 0101 1110 1000"),
            Variant::new("1001 0101 1111 1000", [Pointer(Z, PostIncrement), N])
                .implicit_destination(),
        ],
    )?;

    // The short forms overlap ldd/std and are never produced by the
    // disassembler.
    builder.direct_address(
        "lds",
        1,
        0,
        Variant::new("1010 0kkk dddd kkkk", [RegisterHigh, DataAddress7]).encode_only(),
        Variant::new(
            "1001 000d dddd 0000 kkkk kkkk kkkk kkkk",
            [Register, DataAddress16],
        ),
    )?;
    builder.direct_address(
        "sts",
        0,
        1,
        Variant::new("1010 1ddd ssss dddd", [DataAddress7, RegisterHigh]).encode_only(),
        Variant::new(
            "1001 001s ssss 0000 dddd dddd dddd dddd",
            [DataAddress16, Register],
        ),
    )?;

    builder.alias("brlo", "brcs")?;
    builder.alias("brsh", "brcc")?;
    builder.alias("cbr", "andi")?;
    builder.alias("sbr", "ori")?;
    for &(single, _, pair) in SAME_OPERANDS {
        builder.same_operands(single, pair)?;
    }
    Ok(())
}
