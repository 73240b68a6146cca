//! Instruction-set engine for 8-bit AVR microcontrollers.
//!
//! Compiles textual opcode templates into bidirectional encoders, validates
//! operands against each architecture's memory layout, and disassembles raw
//! bytes through a prefix trie over the fixed opcode bits.

#[cfg(test)]
use proptest as _;

/// Shift/mask strategies moving operand values in and out of opcode words.
pub mod codec;
pub use codec::{low_bits, right_align, BitRun, FieldCodec};

/// Opcode template compiler.
pub mod pattern;
pub use pattern::{BitPattern, Role};

/// Operand kinds and pointer-register spelling.
pub mod operand;
pub use operand::{pointer_text, OperandKind, PointerMode, PointerRegister};

/// Operand node model consumed by the encoder.
pub mod node;
pub use node::{
    Address, InstructionNode, OperandNode, Register, RegisterNode, Segment, Span, Value, ValueNode,
};

/// Interface between the encoder and the surrounding assembler.
pub mod context;
pub use context::CompilationContext;

/// Table defects, operand diagnostics and encoding errors.
pub mod error;
pub use error::{EncodeError, EncodeErrorKind, OperandError, TableError};

/// Operand validation and conversion to raw field values.
pub mod resolve;
pub use resolve::{resolve, sign_extend, Phase, Transform};

/// Instruction encodings and form selectors.
pub mod encoding;
pub use encoding::{
    DecodedOperand, DisassemblySelector, EncodingId, EncodingShape, InstructionEncoding,
    InstructionSelector, Variant,
};

/// Prefix trie used for decoding.
pub mod trie;
pub use trie::PrefixTrie;

/// Instruction table and its builder.
pub mod table;
pub use table::{EncodingEntry, EncodingTable, TableBuilder};

/// Target architectures and memory layouts.
pub mod arch;
pub use arch::{
    classic_table, extended_table, Architecture, MemoryLayout, UnknownArchitecture, ARCHITECTURES,
};

/// Byte-to-instruction decoder.
pub mod decoder;
pub use decoder::{Decoded, Decoder};

/// Disassembly driver and listing output.
pub mod disasm;
pub use disasm::{disassemble, format_listing, DisassemblerSettings, DisassemblyRow};
