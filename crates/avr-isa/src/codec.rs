//! Field codecs moving operand values in and out of opcode words.
//!
//! A codec is chosen once per operand role from the physical bit positions the
//! role occupies. Contiguous fields use plain shift/mask arithmetic, fields
//! split into two runs use two masked shifts, and anything more scattered falls
//! back to a bit-by-bit copy.

/// One contiguous run of a split field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BitRun {
    /// Number of bits in the run.
    pub len: u8,
    /// Distance between the run's first value bit and its physical position.
    pub shift: u8,
    /// Mask selecting the run's bits in the (unshifted) operand value.
    pub mask: u32,
}

impl BitRun {
    const fn new(len: u8, value_bit: u8, position: u8) -> Self {
        Self {
            len,
            shift: position - value_bit,
            mask: low_bits(len) << value_bit,
        }
    }

    const fn place(self, value: u32) -> u32 {
        (value & self.mask) << self.shift
    }

    const fn extract(self, word: u32) -> u32 {
        (word >> self.shift) & self.mask
    }
}

/// Encode/decode strategy for one operand role.
///
/// All variants work on the right-aligned instruction word: bit 0 is the
/// least-significant bit of the last template character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FieldCodec {
    /// Role absent from the template.
    None,
    /// Contiguous field starting at bit 0.
    Identity {
        /// Field width in bits.
        width: u8,
    },
    /// Contiguous field starting above bit 0.
    Shifted {
        /// Field width in bits.
        width: u8,
        /// Physical position of the field's lowest bit.
        shift: u8,
    },
    /// Field made of exactly two contiguous runs.
    Split {
        /// Run holding the low value bits.
        low: BitRun,
        /// Run holding the high value bits.
        high: BitRun,
    },
    /// Field scattered over three or more runs; `positions[j]` is the
    /// physical position of value bit `j`.
    Scatter {
        /// Physical bit position per value bit.
        positions: Vec<u8>,
    },
}

impl FieldCodec {
    /// Picks the cheapest codec for a role.
    ///
    /// `positions` lists the physical bit position of each value bit, lowest
    /// value bit first, as produced by the pattern compiler.
    #[must_use]
    pub fn from_positions(positions: &[u8]) -> Self {
        let runs = collapse_runs(positions);
        match runs.as_slice() {
            [] => Self::None,
            [(_, position, len)] if *position == 0 => Self::Identity { width: *len },
            [(_, position, len)] => Self::Shifted {
                width: *len,
                shift: *position,
            },
            [(low_bit, low_pos, low_len), (high_bit, high_pos, high_len)] => Self::Split {
                low: BitRun::new(*low_len, *low_bit, *low_pos),
                high: BitRun::new(*high_len, *high_bit, *high_pos),
            },
            _ => Self::Scatter {
                positions: positions.to_vec(),
            },
        }
    }

    /// Width of the field in bits (0 for [`FieldCodec::None`]).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn width(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Identity { width } | Self::Shifted { width, .. } => *width,
            Self::Split { low, high } => low.len + high.len,
            Self::Scatter { positions } => positions.len() as u8,
        }
    }

    /// Places `value` into its bit positions. Bits above the field width are
    /// discarded.
    #[must_use]
    pub fn encode(&self, value: u32) -> u32 {
        let value = value & low_bits(self.width());
        match self {
            Self::None => 0,
            Self::Identity { .. } => value,
            Self::Shifted { shift, .. } => value << shift,
            Self::Split { low, high } => low.place(value) | high.place(value),
            Self::Scatter { positions } => positions
                .iter()
                .enumerate()
                .filter(|(bit, _)| value & (1 << bit) != 0)
                .fold(0, |word, (_, position)| word | (1 << position)),
        }
    }

    /// Extracts the field from an instruction word.
    ///
    /// `word` is left-aligned in 32 bits, the way the disassembler reads it;
    /// `len_bytes` is the instruction length used to right-align it first.
    #[must_use]
    pub fn decode(&self, word: u32, len_bytes: usize) -> u32 {
        let word = right_align(word, len_bytes);
        match self {
            Self::None => 0,
            Self::Identity { width } => word & low_bits(*width),
            Self::Shifted { width, shift } => (word >> shift) & low_bits(*width),
            Self::Split { low, high } => low.extract(word) | high.extract(word),
            Self::Scatter { positions } => positions
                .iter()
                .enumerate()
                .filter(|(_, position)| word & (1 << **position) != 0)
                .fold(0, |value, (bit, _)| value | (1 << bit)),
        }
    }
}

/// Mask with the lowest `n` bits set.
#[must_use]
pub const fn low_bits(n: u8) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1 << n) - 1
    }
}

/// Shifts a left-aligned 32-bit word so the instruction's last bit is bit 0.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn right_align(word: u32, len_bytes: usize) -> u32 {
    match len_bytes {
        1..=3 => word >> ((4 - len_bytes as u32) * 8),
        _ => word,
    }
}

/// Collapses positions into `(first value bit, first position, length)` runs.
#[allow(clippy::cast_possible_truncation)]
fn collapse_runs(positions: &[u8]) -> Vec<(u8, u8, u8)> {
    let mut runs: Vec<(u8, u8, u8)> = Vec::new();
    for (bit, &position) in positions.iter().enumerate() {
        match runs.last_mut() {
            Some((_, start, len)) if *start + *len == position => *len += 1,
            _ => runs.push((bit as u8, position, 1)),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::{right_align, FieldCodec};

    #[test]
    fn empty_positions_select_none() {
        let codec = FieldCodec::from_positions(&[]);
        assert_eq!(codec, FieldCodec::None);
        assert_eq!(codec.width(), 0);
        assert_eq!(codec.encode(0xFFFF), 0);
    }

    #[test]
    fn contiguous_low_field_is_identity() {
        let codec = FieldCodec::from_positions(&[0, 1, 2, 3]);
        assert_eq!(codec, FieldCodec::Identity { width: 4 });
        assert_eq!(codec.encode(0b1011), 0b1011);
        assert_eq!(codec.encode(0x1F), 0xF);
    }

    #[test]
    fn contiguous_high_field_is_shifted() {
        let codec = FieldCodec::from_positions(&[4, 5, 6, 7, 8]);
        assert_eq!(codec, FieldCodec::Shifted { width: 5, shift: 4 });
        assert_eq!(codec.encode(0b10001), 0b1_0001_0000);
        assert_eq!(codec.decode(0b1_0001_0000 << 16, 2), 0b10001);
    }

    #[test]
    fn two_runs_use_split_codec() {
        // `rd dddd rrrr`: source register bits 0..=3 plus bit 9.
        let codec = FieldCodec::from_positions(&[0, 1, 2, 3, 9]);
        assert!(matches!(codec, FieldCodec::Split { .. }));
        assert_eq!(codec.encode(0b1_0110), 0b10_0000_0110);
        assert_eq!(codec.decode(0b10_0000_0110 << 16, 2), 0b1_0110);
    }

    #[test]
    fn three_runs_fall_back_to_scatter() {
        // `10q0 qq0d dddd 0qqq`: displacement bits 0..=2, 10, 11, 13.
        let codec = FieldCodec::from_positions(&[0, 1, 2, 10, 11, 13]);
        assert!(matches!(codec, FieldCodec::Scatter { .. }));
        assert_eq!(codec.width(), 6);
        let word = codec.encode(0b11_1111);
        assert_eq!(word, 0b0010_1100_0000_0111);
        assert_eq!(codec.decode(word << 16, 2), 0b11_1111);
    }

    #[test]
    fn right_align_handles_every_length() {
        assert_eq!(right_align(0xAB00_0000, 1), 0xAB);
        assert_eq!(right_align(0xABCD_0000, 2), 0xABCD);
        assert_eq!(right_align(0xABCD_EF00, 3), 0x00AB_CDEF);
        assert_eq!(right_align(0xABCD_EF01, 4), 0xABCD_EF01);
    }
}
