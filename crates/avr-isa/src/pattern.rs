//! Opcode template compiler.
//!
//! Templates are written the way the AVR instruction set manual prints them:
//! groups of `0`/`1` for fixed bits and letters for operand bits, with spaces
//! or underscores as free-form separators.
//!
//! ```text
//! add  0000 11rd dddd rrrr
//! call 1001 010k kkkk 111k kkkk kkkk kkkk kkkk
//! ```
//!
//! `k`, `r` and `s` mark the source role and `d` the destination role. A
//! template with a single operand letter always uses the destination role,
//! whatever the letter.

use std::collections::BTreeSet;
use std::fmt;

use crate::codec::{low_bits, right_align, FieldCodec};
use crate::error::TableError;

const SOURCE_MARKER: char = 's';
const DESTINATION_MARKER: char = 'd';

/// Operand role inside an opcode template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Role {
    /// First (or only) operand field.
    Destination,
    /// Second operand field.
    Source,
}

/// A compiled opcode template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitPattern {
    normalized: String,
    len_bits: u8,
    fixed_mask: u32,
    fixed_value: u32,
    destination_positions: Vec<u8>,
    source_positions: Vec<u8>,
    destination: FieldCodec,
    source: FieldCodec,
}

impl BitPattern {
    /// Compiles a template.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::PatternLength`] when the stripped template is
    /// empty, not a whole number of bytes or longer than 32 bits, and
    /// [`TableError::PatternCharacter`] for characters that are neither fixed
    /// bits nor role markers.
    #[allow(clippy::cast_possible_truncation)]
    pub fn compile(template: &str) -> Result<Self, TableError> {
        let normalized = normalize(template);
        let len = normalized.len();
        if len == 0 || len % 8 != 0 || len > 32 {
            return Err(TableError::PatternLength {
                template: template.to_string(),
                bits: len,
            });
        }

        let markers: BTreeSet<char> = normalized
            .chars()
            .filter(|c| !matches!(c, '0' | '1'))
            .collect();
        if let Some(found) = markers
            .iter()
            .copied()
            .find(|c| *c != SOURCE_MARKER && *c != DESTINATION_MARKER)
        {
            return Err(TableError::PatternCharacter {
                template: template.to_string(),
                found,
            });
        }
        let single_role = markers.len() == 1;

        let mut fixed_mask = 0u32;
        let mut fixed_value = 0u32;
        let mut destination_positions = Vec::new();
        let mut source_positions = Vec::new();

        // Scan from the least-significant character so value bit 0 comes first.
        for (position, c) in normalized.chars().rev().enumerate() {
            let position = position as u8;
            match c {
                '0' => fixed_mask |= 1 << position,
                '1' => {
                    fixed_mask |= 1 << position;
                    fixed_value |= 1 << position;
                }
                DESTINATION_MARKER => destination_positions.push(position),
                _ if single_role => destination_positions.push(position),
                _ => source_positions.push(position),
            }
        }

        Ok(Self {
            destination: FieldCodec::from_positions(&destination_positions),
            source: FieldCodec::from_positions(&source_positions),
            normalized,
            len_bits: len as u8,
            fixed_mask,
            fixed_value,
            destination_positions,
            source_positions,
        })
    }

    /// Template after normalization (lower-case, separators removed).
    #[must_use]
    pub fn template(&self) -> &str {
        &self.normalized
    }

    /// Instruction length in bits.
    #[must_use]
    pub const fn len_bits(&self) -> u8 {
        self.len_bits
    }

    /// Instruction length in bytes.
    #[must_use]
    pub const fn len_bytes(&self) -> usize {
        self.len_bits as usize / 8
    }

    /// Mask of the fixed bits, right-aligned.
    #[must_use]
    pub const fn fixed_mask(&self) -> u32 {
        self.fixed_mask
    }

    /// Value of the fixed bits, right-aligned.
    #[must_use]
    pub const fn fixed_value(&self) -> u32 {
        self.fixed_value
    }

    /// Number of fixed bits; higher means more specific.
    #[must_use]
    pub const fn fixed_bit_count(&self) -> u32 {
        self.fixed_mask.count_ones()
    }

    /// Physical bit positions of a role, lowest value bit first.
    #[must_use]
    pub fn positions(&self, role: Role) -> &[u8] {
        match role {
            Role::Destination => &self.destination_positions,
            Role::Source => &self.source_positions,
        }
    }

    /// Codec for a role.
    #[must_use]
    pub const fn codec(&self, role: Role) -> &FieldCodec {
        match role {
            Role::Destination => &self.destination,
            Role::Source => &self.source,
        }
    }

    /// Number of roles present in the template (0, 1 or 2).
    #[must_use]
    pub fn role_count(&self) -> usize {
        usize::from(!self.destination_positions.is_empty())
            + usize::from(!self.source_positions.is_empty())
    }

    /// Builds the right-aligned instruction word.
    #[must_use]
    pub fn encode(&self, destination: u32, source: u32) -> u32 {
        self.fixed_value | self.destination.encode(destination) | self.source.encode(source)
    }

    /// Decodes both roles from a left-aligned 32-bit word.
    ///
    /// Absent roles decode to `None`.
    #[must_use]
    pub fn decode(&self, word: u32) -> (Option<u32>, Option<u32>) {
        let len_bytes = self.len_bytes();
        let field = |role: Role| {
            (!self.positions(role).is_empty()).then(|| self.codec(role).decode(word, len_bytes))
        };
        (field(Role::Destination), field(Role::Source))
    }

    /// Tests the fixed bits against a left-aligned 32-bit word.
    #[must_use]
    pub const fn matches(&self, word: u32) -> bool {
        right_align(word, self.len_bytes()) & self.fixed_mask == self.fixed_value
    }

    /// Fixed bits before the first operand bit, most-significant first.
    #[must_use]
    pub fn fixed_prefix(&self) -> Vec<bool> {
        self.normalized
            .chars()
            .map_while(|c| match c {
                '0' => Some(false),
                '1' => Some(true),
                _ => None,
            })
            .collect()
    }

    /// Right-aligned mask covering the whole instruction.
    #[must_use]
    pub const fn word_mask(&self) -> u32 {
        low_bits(self.len_bits)
    }
}

impl fmt::Display for BitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.normalized.as_bytes().chunks(4).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&String::from_utf8_lossy(chunk))?;
        }
        Ok(())
    }
}

fn normalize(template: &str) -> String {
    template
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .map(|c| match c.to_ascii_lowercase() {
            'k' | 'r' => SOURCE_MARKER,
            other => other,
        })
        .collect()
}
