//! Two-pass AVR assembler built on the `avr-isa` encoding tables.

use tracing_subscriber as _;

/// Top-level two-pass assembler pipeline.
pub mod assembler;
/// Output buffer implementing the encoder's compilation context.
pub mod context;
/// Structured parse/assembly error types.
pub mod errors;
/// Assembly parser for instructions, labels and directives.
pub mod parser;
/// Labels and `.equ` constants.
pub mod symbols;
