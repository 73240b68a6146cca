//! Output buffer handed to the instruction encoder.

use avr_isa::{Address, CompilationContext, Span};

/// Collects encoded bytes and encoder diagnostics for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferContext {
    /// Little-endian output bytes.
    pub bytes: Vec<u8>,
    /// Flash byte address of the next write.
    pub address: u32,
    /// Diagnostics reported since the last [`BufferContext::take_diagnostics`].
    pub diagnostics: Vec<(String, Span)>,
}

impl BufferContext {
    /// Creates an empty buffer starting at `address`.
    #[must_use]
    pub const fn at(address: u32) -> Self {
        Self {
            bytes: Vec::new(),
            address,
            diagnostics: Vec::new(),
        }
    }

    /// Appends raw data bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
        self.address += bytes.len() as u32;
    }

    /// Drains the recorded diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<(String, Span)> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl CompilationContext for BufferContext {
    fn error(&mut self, message: &str, span: Span) {
        self.diagnostics.push((message.to_string(), span));
    }

    fn current_address(&self) -> Address {
        Address::flash(self.address)
    }

    fn write_word(&mut self, word: u16) {
        self.write_bytes(&word.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_written_little_endian() {
        let mut buffer = BufferContext::at(0x10);
        buffer.write_word(0x940E);
        assert_eq!(buffer.bytes, vec![0x0E, 0x94]);
        assert_eq!(buffer.current_address(), Address::flash(0x12));
    }

    #[test]
    fn diagnostics_are_drained() {
        let mut buffer = BufferContext::default();
        buffer.error("bad", Span::new(1, 2));
        assert_eq!(buffer.take_diagnostics(), vec![("bad".to_string(), Span::new(1, 2))]);
        assert!(buffer.diagnostics.is_empty());
    }
}
