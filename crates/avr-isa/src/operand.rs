//! Operand kinds.
//!
//! Each kind fixes the width of its opcode field, whether the field is a
//! signed offset, and which operand shapes it accepts. The rules that turn an
//! operand node into a raw field value live in [`crate::resolve`].

use std::fmt;

/// Indirect address registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PointerRegister {
    /// R27:R26.
    X,
    /// R29:R28.
    Y,
    /// R31:R30.
    Z,
}

impl PointerRegister {
    /// Number of the low register of the pair.
    #[must_use]
    pub const fn low_register(self) -> u8 {
        match self {
            Self::X => 26,
            Self::Y => 28,
            Self::Z => 30,
        }
    }

    /// Maps a low register number back to its pointer name.
    #[must_use]
    pub const fn from_low_register(register: u8) -> Option<Self> {
        match register {
            26 => Some(Self::X),
            28 => Some(Self::Y),
            30 => Some(Self::Z),
            _ => None,
        }
    }
}

impl fmt::Display for PointerRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
        })
    }
}

/// Addressing mode of a pointer operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PointerMode {
    /// `X`
    Plain,
    /// `X+`
    PostIncrement,
    /// `-X`
    PreDecrement,
}

/// Spells a pointer operand the way it is written in source, e.g. `Z+`.
#[must_use]
pub fn pointer_text(register: PointerRegister, mode: PointerMode) -> String {
    match mode {
        PointerMode::Plain => register.to_string(),
        PointerMode::PostIncrement => format!("{register}+"),
        PointerMode::PreDecrement => format!("-{register}"),
    }
}

/// Semantic class of an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum OperandKind {
    /// No operand in this slot.
    None,
    /// Any register, r0..r31.
    Register,
    /// r0..r15.
    RegisterLow,
    /// r16..r31, stored as `n - 16`.
    RegisterHigh,
    /// r16..r23, stored as `n - 16`.
    RegisterMul,
    /// Upper register pair r25:r24 .. r31:r30, stored as 0..3.
    RegisterPair,
    /// Any even register pair, stored as `n / 2`.
    RegisterPairAny,
    /// Fixed pointer register in a fixed mode; never occupies field bits.
    Pointer(PointerRegister, PointerMode),
    /// Pointer register with a 6-bit displacement, `Y+q`.
    Displacement(PointerRegister),
    /// Unsigned 3-bit field (bit numbers).
    Unsigned3,
    /// Unsigned 4-bit field (`des` round).
    Unsigned4,
    /// Unsigned 6-bit field (`adiw` immediate).
    Unsigned6,
    /// Unsigned 8-bit field (immediates).
    Unsigned8,
    /// Lower 32 I/O registers.
    IoAddress5,
    /// All 64 I/O registers.
    IoAddress6,
    /// Short data-space address.
    DataAddress7,
    /// Full data-space address.
    DataAddress16,
    /// Absolute code address; byte address in source, word address in the
    /// opcode.
    FlashAddress22,
    /// Signed word offset of conditional branches.
    BranchOffset7,
    /// Signed word offset of `rjmp`/`rcall`.
    JumpOffset12,
}

impl OperandKind {
    /// Number of opcode bits the kind occupies.
    #[must_use]
    pub const fn field_width(self) -> u8 {
        match self {
            Self::None | Self::Pointer(..) => 0,
            Self::RegisterPair => 2,
            Self::Unsigned3 | Self::RegisterMul => 3,
            Self::RegisterLow | Self::RegisterHigh | Self::RegisterPairAny | Self::Unsigned4 => 4,
            Self::Register | Self::IoAddress5 => 5,
            Self::Displacement(_) | Self::Unsigned6 | Self::IoAddress6 => 6,
            Self::DataAddress7 | Self::BranchOffset7 => 7,
            Self::Unsigned8 => 8,
            Self::JumpOffset12 => 12,
            Self::DataAddress16 => 16,
            Self::FlashAddress22 => 22,
        }
    }

    /// Whether the field holds a two's-complement word offset.
    #[must_use]
    pub const fn is_relative(self) -> bool {
        matches!(self, Self::BranchOffset7 | Self::JumpOffset12)
    }

    /// Whether the operand is written as a register expression.
    #[must_use]
    pub const fn is_register(self) -> bool {
        matches!(
            self,
            Self::Register
                | Self::RegisterLow
                | Self::RegisterHigh
                | Self::RegisterMul
                | Self::RegisterPair
                | Self::RegisterPairAny
                | Self::Pointer(..)
                | Self::Displacement(_)
        )
    }

    /// Whether the operand is a register pair (`r25:r24`).
    #[must_use]
    pub const fn is_pair(self) -> bool {
        matches!(self, Self::RegisterPair | Self::RegisterPairAny)
    }

    /// Pointer register referenced by pointer and displacement kinds.
    #[must_use]
    pub const fn pointer(self) -> Option<PointerRegister> {
        match self {
            Self::Pointer(register, _) | Self::Displacement(register) => Some(register),
            _ => None,
        }
    }

    /// Fixed spelling of a kind that never occupies field bits.
    ///
    /// Only pointer kinds have one; they are the kinds an encoding may imply.
    #[must_use]
    pub fn implicit_text(self) -> Option<String> {
        match self {
            Self::Pointer(register, mode) => Some(pointer_text(register, mode)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{pointer_text, OperandKind, PointerMode, PointerRegister};

    #[test]
    fn pointer_spelling() {
        assert_eq!(pointer_text(PointerRegister::Z, PointerMode::PostIncrement), "Z+");
        assert_eq!(pointer_text(PointerRegister::X, PointerMode::PreDecrement), "-X");
        assert_eq!(pointer_text(PointerRegister::Y, PointerMode::Plain), "Y");
    }

    #[test]
    fn low_register_round_trips() {
        for register in [PointerRegister::X, PointerRegister::Y, PointerRegister::Z] {
            assert_eq!(
                PointerRegister::from_low_register(register.low_register()),
                Some(register)
            );
        }
        assert_eq!(PointerRegister::from_low_register(24), None);
    }

    #[test]
    fn only_pointer_kinds_have_implicit_text() {
        let kind = OperandKind::Pointer(PointerRegister::Z, PointerMode::Plain);
        assert_eq!(kind.implicit_text().as_deref(), Some("Z"));
        assert_eq!(kind.field_width(), 0);
        assert_eq!(OperandKind::Displacement(PointerRegister::Y).implicit_text(), None);
        assert_eq!(OperandKind::Register.implicit_text(), None);
    }

    #[test]
    fn widths_of_address_kinds() {
        assert_eq!(OperandKind::FlashAddress22.field_width(), 22);
        assert_eq!(OperandKind::DataAddress16.field_width(), 16);
        assert_eq!(OperandKind::JumpOffset12.field_width(), 12);
        assert!(OperandKind::BranchOffset7.is_relative());
        assert!(!OperandKind::DataAddress7.is_relative());
    }
}
