//! Operand node model handed to the encoder by a front-end.
//!
//! Nodes are read-only from the encoder's point of view. A front-end builds
//! them once per source line and may fill in values between the validation
//! pass and the compile pass.

use crate::operand::{PointerMode, PointerRegister};

/// Source position of a node (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Span {
    /// Line number.
    pub line: u32,
    /// Column number.
    pub column: u32,
}

impl Span {
    /// Creates a span.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Memory segment of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Segment {
    /// Program memory.
    Flash,
    /// Data space (registers, I/O, SRAM).
    Sram,
    /// EEPROM.
    Eeprom,
}

impl Segment {
    /// Lower-case segment name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Flash => "code",
            Self::Sram => "data",
            Self::Eeprom => "eeprom",
        }
    }
}

/// A byte address inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Address {
    /// Segment the address belongs to.
    pub segment: Segment,
    /// Byte offset inside the segment.
    pub byte_address: u32,
}

impl Address {
    /// Creates an address from a byte offset.
    #[must_use]
    pub const fn new(segment: Segment, byte_address: u32) -> Self {
        Self {
            segment,
            byte_address,
        }
    }

    /// Flash address from a byte offset.
    #[must_use]
    pub const fn flash(byte_address: u32) -> Self {
        Self::new(Segment::Flash, byte_address)
    }

    /// Data-space address.
    #[must_use]
    pub const fn sram(byte_address: u32) -> Self {
        Self::new(Segment::Sram, byte_address)
    }

    /// Word address (byte address halved, rounded down).
    #[must_use]
    pub const fn word_address(self) -> u32 {
        self.byte_address / 2
    }
}

/// Resolved value of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Value {
    /// Plain number.
    Number(i64),
    /// Address of a label or symbol.
    Address(Address),
}

/// Value-bearing operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueNode {
    /// Resolved value; `None` while symbols are unresolved.
    pub value: Option<Value>,
    /// Source position.
    pub span: Span,
}

impl ValueNode {
    /// Node with a known number.
    #[must_use]
    pub const fn number(value: i64, span: Span) -> Self {
        Self {
            value: Some(Value::Number(value)),
            span,
        }
    }

    /// Node with a known address.
    #[must_use]
    pub const fn address(address: Address, span: Span) -> Self {
        Self {
            value: Some(Value::Address(address)),
            span,
        }
    }

    /// Node whose value is not known yet.
    #[must_use]
    pub const fn unresolved(span: Span) -> Self {
        Self { value: None, span }
    }
}

/// A register reference as written in source.
///
/// `number` is the low register for pairs and pointers (`r25:r24` and `Y` are
/// both stored as their low register, 24 and 28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Register {
    /// Register number (low register of a pair).
    pub number: u8,
    /// Whether the reference names a register pair.
    pub compound: bool,
    /// `X+` form.
    pub post_increment: bool,
    /// `-X` form.
    pub pre_decrement: bool,
}

impl Register {
    /// Single register `rN`.
    #[must_use]
    pub const fn single(number: u8) -> Self {
        Self {
            number,
            compound: false,
            post_increment: false,
            pre_decrement: false,
        }
    }

    /// Register pair written as `rN+1:rN`.
    #[must_use]
    pub const fn pair(low: u8) -> Self {
        Self {
            number: low,
            compound: true,
            post_increment: false,
            pre_decrement: false,
        }
    }

    /// Pointer register in the given mode.
    #[must_use]
    pub const fn pointer_in_mode(register: PointerRegister, mode: PointerMode) -> Self {
        Self {
            number: register.low_register(),
            compound: true,
            post_increment: matches!(mode, PointerMode::PostIncrement),
            pre_decrement: matches!(mode, PointerMode::PreDecrement),
        }
    }

    /// Pointer name when the reference is X, Y or Z.
    #[must_use]
    pub const fn pointer(self) -> Option<PointerRegister> {
        if self.compound {
            PointerRegister::from_low_register(self.number)
        } else {
            None
        }
    }

    /// Addressing mode of the reference.
    #[must_use]
    pub const fn mode(self) -> PointerMode {
        if self.post_increment {
            PointerMode::PostIncrement
        } else if self.pre_decrement {
            PointerMode::PreDecrement
        } else {
            PointerMode::Plain
        }
    }
}

/// Register operand, with the optional `+q` displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterNode {
    /// Register reference.
    pub register: Register,
    /// Displacement expression of `Y+q`/`Z+q`.
    pub displacement: Option<ValueNode>,
    /// Source position.
    pub span: Span,
}

/// One explicit instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandNode {
    /// Number or address expression.
    Value(ValueNode),
    /// Register expression.
    Register(RegisterNode),
}

impl OperandNode {
    /// Source position of the operand.
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Value(node) => node.span,
            Self::Register(node) => node.span,
        }
    }

    /// Register reference if the operand is a register expression.
    #[must_use]
    pub const fn register(&self) -> Option<&RegisterNode> {
        match self {
            Self::Register(node) => Some(node),
            Self::Value(_) => None,
        }
    }

    /// Resolved value if the operand is a value expression.
    #[must_use]
    pub const fn value(&self) -> Option<Value> {
        match self {
            Self::Value(node) => node.value,
            Self::Register(_) => None,
        }
    }
}

/// A parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionNode {
    /// Mnemonic as written.
    pub mnemonic: String,
    /// Explicit operands in source order.
    pub operands: Vec<OperandNode>,
    /// Source position of the mnemonic.
    pub span: Span,
}

impl InstructionNode {
    /// Creates an instruction node.
    #[must_use]
    pub fn new(mnemonic: impl Into<String>, operands: Vec<OperandNode>, span: Span) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            operands,
            span,
        }
    }
}
