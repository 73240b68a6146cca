//! Binary prefix trie over the leading fixed bits of every decodable opcode.
//!
//! Each encoding is stored at the node reached by its fixed-bit prefix (the
//! template bits before the first operand bit, most-significant first).
//! Looking up a word walks as deep as the word's bits allow and then tests the
//! encodings stored on that path, deepest first, so an encoding whose prefix
//! diverges from the word is never examined.

use crate::encoding::{EncodingId, InstructionEncoding};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TrieNode {
    children: [Option<usize>; 2],
    terminal: Vec<EncodingId>,
}

/// Prefix trie used by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTrie {
    nodes: Vec<TrieNode>,
}

impl Default for PrefixTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl PrefixTrie {
    /// Builds the trie from every decodable encoding.
    ///
    /// Encodings sharing a node are ordered by descending fixed-bit count.
    #[must_use]
    pub fn build(encodings: &[InstructionEncoding]) -> Self {
        let mut trie = Self::default();
        for (index, encoding) in encodings.iter().enumerate() {
            if encoding.is_decodable() {
                trie.insert(&encoding.pattern().fixed_prefix(), EncodingId(index));
            }
        }
        for node in &mut trie.nodes {
            node.terminal.sort_by_key(|id| {
                std::cmp::Reverse(encodings[id.index()].pattern().fixed_bit_count())
            });
        }
        trie
    }

    fn insert(&mut self, prefix: &[bool], id: EncodingId) {
        let mut current = 0;
        for &bit in prefix {
            let slot = usize::from(bit);
            current = match self.nodes[current].children[slot] {
                Some(next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[current].children[slot] = Some(next);
                    next
                }
            };
        }
        self.nodes[current].terminal.push(id);
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Encodings whose fixed bits match `word` and that fit into `available`
    /// bytes.
    ///
    /// `word` is left-aligned: its most-significant bit is the first template
    /// character. The result lists the deepest matches first.
    #[must_use]
    pub fn lookup(
        &self,
        word: u32,
        available: usize,
        encodings: &[InstructionEncoding],
    ) -> Vec<EncodingId> {
        let mut path = vec![0];
        let mut current = 0;
        for shift in (0..32).rev() {
            let slot = usize::from((word >> shift) & 1 == 1);
            match self.nodes[current].children[slot] {
                Some(next) => {
                    path.push(next);
                    current = next;
                }
                None => break,
            }
        }

        path.iter()
            .rev()
            .flat_map(|node| self.nodes[*node].terminal.iter().copied())
            .filter(|id| {
                let encoding = &encodings[id.index()];
                encoding.len_bytes() <= available && encoding.pattern().matches(word)
            })
            .collect()
    }
}
