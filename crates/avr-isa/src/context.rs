//! Output and diagnostic sink used while encoding.

use crate::node::{Address, Span};

/// What the encoder needs from the surrounding compilation.
///
/// Implementations record diagnostics instead of failing, so one pass can
/// report every problem in a source file.
pub trait CompilationContext {
    /// Records a diagnostic at `span`.
    fn error(&mut self, message: &str, span: Span);

    /// Address the next instruction will be written to.
    fn current_address(&self) -> Address;

    /// Appends one 16-bit instruction word to the output.
    fn write_word(&mut self, word: u16);
}
