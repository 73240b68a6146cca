//! Instruction decoder.
//!
//! Decoding runs in three steps: the prefix trie narrows the table down to the
//! encodings whose fixed bits match, the most specific of those are kept, and
//! the remaining ties are broken by alias and same-operand rules.

use tracing::trace;

use crate::encoding::{DecodedOperand, EncodingId, InstructionEncoding};
use crate::table::EncodingTable;

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<'a> {
    /// Id of the matched encoding.
    pub id: EncodingId,
    /// Matched encoding.
    pub encoding: &'a InstructionEncoding,
    /// Bytes consumed.
    pub len: usize,
    /// Written operands in source order.
    pub operands: Vec<DecodedOperand>,
}

/// Decoder bound to one instruction table.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    table: &'a EncodingTable,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder for `table`.
    #[must_use]
    pub const fn new(table: &'a EncodingTable) -> Self {
        Self { table }
    }

    /// Decodes the instruction at the start of `bytes`.
    ///
    /// Instruction words are little-endian. Returns `None` when fewer than two
    /// bytes remain or no encoding matches.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> Option<Decoded<'a>> {
        let (word, available) = left_aligned_word(bytes)?;
        let encodings = self.table.encodings();
        let candidates = self.table.trie().lookup(word, available, encodings);

        let best = candidates
            .iter()
            .map(|id| encodings[id.index()].pattern().fixed_bit_count())
            .max()?;
        let tie: Vec<EncodingId> = candidates
            .into_iter()
            .filter(|id| encodings[id.index()].pattern().fixed_bit_count() == best)
            .collect();

        let id = tie.iter().copied().find(|id| {
            let encoding = &encodings[id.index()];
            let aliased = encoding
                .alias_of()
                .is_some_and(|target| target != *id && tie.contains(&target));
            !aliased && encoding.disassembly().accepts(*id, &tie, word, encodings)
        })?;

        let encoding = &encodings[id.index()];
        trace!(
            word = format_args!("{word:#010x}"),
            mnemonic = encoding.mnemonic(),
            candidates = tie.len(),
            "decoded instruction"
        );
        Some(Decoded {
            id,
            encoding,
            len: encoding.len_bytes(),
            operands: encoding.decode(word),
        })
    }
}

/// Reassembles up to two little-endian instruction words into one
/// left-aligned big-endian word, with the number of bytes it covers.
fn left_aligned_word(bytes: &[u8]) -> Option<(u32, usize)> {
    let word = |index: usize| -> Option<u32> {
        let low = *bytes.get(index)?;
        let high = *bytes.get(index + 1)?;
        Some(u32::from(u16::from_le_bytes([low, high])))
    };
    let first = word(0)?;
    Some(match word(2) {
        Some(second) => ((first << 16) | second, 4),
        None => (first << 16, 2),
    })
}
