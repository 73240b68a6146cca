use std::fmt;

use thiserror::Error;

use crate::node::Span;
use crate::operand::PointerRegister;

/// Configuration defects in an instruction table.
///
/// These are raised while a table is built and indicate a broken table, never
/// bad user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Template length is zero, not a multiple of 8, or above 32 bits.
    #[error("opcode template '{template}' has {bits} bits, expected 8, 16, 24 or 32")]
    PatternLength {
        /// Template as written.
        template: String,
        /// Length after stripping separators.
        bits: usize,
    },
    /// Template contains a character that is neither fixed nor a role marker.
    #[error("opcode template '{template}' contains unsupported character '{found}'")]
    PatternCharacter {
        /// Template as written.
        template: String,
        /// Offending character.
        found: char,
    },
    /// Template role count does not match the operand kinds and shape.
    #[error("'{mnemonic}': template '{template}' has {found} operand field(s) but {expected} are needed")]
    RoleCount {
        /// Mnemonic being registered.
        mnemonic: String,
        /// Template as written.
        template: String,
        /// Fields needed by the operand kinds.
        expected: usize,
        /// Fields present in the template.
        found: usize,
    },
    /// Template field width does not match the operand kind.
    #[error("'{mnemonic}': operand {operand} needs a {expected}-bit field but template '{template}' has {found}")]
    FieldWidth {
        /// Mnemonic being registered.
        mnemonic: String,
        /// Template as written.
        template: String,
        /// Operand index.
        operand: usize,
        /// Width the kind needs.
        expected: u8,
        /// Width the template provides.
        found: u8,
    },
    /// Implied operand kind cannot be printed as fixed text.
    #[error("'{mnemonic}': operand {operand} is implied but its kind has no fixed spelling")]
    ImplicitKind {
        /// Mnemonic being registered.
        mnemonic: String,
        /// Operand index.
        operand: usize,
    },
    /// Mnemonic contains upper-case characters.
    #[error("mnemonic '{0}' must be lower-case")]
    UpperCaseMnemonic(String),
    /// Mnemonic registered twice.
    #[error("duplicate entry for mnemonic '{0}'")]
    DuplicateMnemonic(String),
    /// An alias or tie-breaker names a mnemonic that is not registered.
    #[error("mnemonic '{0}' is referenced but has no entry")]
    MissingEntry(String),
    /// An entry was created without encodings.
    #[error("entry for '{0}' has no encodings")]
    EmptyEntry(String),
    /// A selector cannot interpret its entry's candidate list.
    #[error("selector for '{mnemonic}' cannot handle its candidates: {reason}")]
    SelectorMismatch {
        /// Mnemonic of the entry.
        mnemonic: String,
        /// What is wrong with the candidates.
        reason: String,
    },
}

/// Recoverable problems with a single operand.
///
/// The message text is what ends up in the user's diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperandError {
    /// A single register was required.
    #[error("operand needs to be a single register")]
    NotSingleRegister,
    /// A register pair or pointer register was required.
    #[error("operand needs to be a compound register expression")]
    NotCompoundRegister,
    /// A register was given where a value was required.
    #[error("operand must evaluate to a constant")]
    NotAValue,
    /// Register outside the allowed sub-range.
    #[error("illegal register r{register}, expected {expected}")]
    RegisterOutOfRange {
        /// Register number as written.
        register: u8,
        /// Allowed registers.
        expected: &'static str,
    },
    /// Wrong pointer register.
    #[error("operand needs to be the {expected} register")]
    WrongPointer {
        /// Pointer register the encoding uses.
        expected: PointerRegister,
    },
    /// Right pointer register, wrong increment/decrement form.
    #[error("operand needs to be {expected}")]
    WrongPointerMode {
        /// Required spelling, e.g. `Z+`.
        expected: String,
    },
    /// The encoding takes no operand here.
    #[error("instruction does not support any operands")]
    UnexpectedOperand,
    /// Value not known at a point where it has to be.
    #[error("operand value could not be resolved")]
    Unresolved,
    /// Unsigned value does not fit its field.
    #[error("value {value} does not fit into an unsigned {bits}-bit field")]
    ValueOutOfRange {
        /// Offending value.
        value: i64,
        /// Field width.
        bits: u8,
    },
    /// Relative target too far away.
    #[error("jump distance out of {bits}-bit range (was: {delta})")]
    JumpOutOfRange {
        /// Field width.
        bits: u8,
        /// Distance in words.
        delta: i64,
    },
    /// Address in the wrong memory segment.
    #[error("expected an address in the {expected} segment")]
    WrongSegment {
        /// Segment the operand has to live in.
        expected: &'static str,
    },
    /// Relative forms only make sense when assembling into flash.
    #[error("relative jumps must be assembled into the code segment")]
    NotAssemblingIntoFlash,
    /// Flash addresses are byte addresses of whole words.
    #[error("flash address 0x{address:x} is not word-aligned")]
    MisalignedAddress {
        /// Offending byte address.
        address: i64,
    },
    /// Address beyond the target's flash memory.
    #[error("address {address} is out of range, target architecture only has {size} bytes of flash memory")]
    FlashOutOfRange {
        /// Offending byte address.
        address: i64,
        /// Flash size in bytes.
        size: u32,
    },
    /// Address beyond the target's data space.
    #[error("address {address} is out of range, target architecture data space ends at {end}")]
    DataOutOfRange {
        /// Offending address.
        address: i64,
        /// First address past the data space.
        end: u32,
    },
    /// I/O register outside the I/O window.
    #[error("I/O address {address} is outside the I/O window {start}..{end}")]
    IoOutOfRange {
        /// Offending address.
        address: i64,
        /// First memory-mapped I/O address.
        start: u32,
        /// First address past the window.
        end: u32,
    },
    /// Numeric I/O port beyond the layout's I/O window.
    #[error("I/O port {port} is outside the I/O window 0..{window}")]
    PortOutOfRange {
        /// Offending port number.
        port: i64,
        /// Size of the I/O window.
        window: u32,
    },
    /// Displacement operand is not a plain number.
    #[error("displacement needs to be a number")]
    DisplacementNotANumber,
}

/// Instruction-level failure raised while selecting or compiling an encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeError {
    /// Kind of error.
    pub kind: EncodeErrorKind,
    /// Source position the error is reported against.
    pub span: Span,
}

impl EncodeError {
    /// Creates an error at `span`.
    #[must_use]
    pub const fn new(kind: EncodeErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Classification of encoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeErrorKind {
    /// Mnemonic not present in the architecture's table.
    UnknownMnemonic(String),
    /// Wrong number of explicit operands.
    OperandCount {
        /// Mnemonic as looked up.
        mnemonic: String,
        /// Operands the selected form takes.
        expected: usize,
        /// Operands written.
        found: usize,
    },
    /// No form of the mnemonic accepts the written operands.
    NoMatchingForm(String),
    /// An operand failed validation.
    Operand(OperandError),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for EncodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMnemonic(mnemonic) => write!(f, "unknown instruction: {mnemonic}"),
            Self::OperandCount {
                mnemonic,
                expected,
                found,
            } => write!(
                f,
                "'{mnemonic}' takes {expected} operand(s) but {found} were given"
            ),
            Self::NoMatchingForm(mnemonic) => {
                write!(f, "no form of '{mnemonic}' accepts these operands")
            }
            Self::Operand(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for EncodeError {}
