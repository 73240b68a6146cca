//! Supported target architectures, their memory layouts and instruction
//! tables.

mod atmega88;
mod xmega;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use thiserror::Error;

use crate::error::TableError;
use crate::table::{EncodingTable, TableBuilder};

/// Target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Architecture {
    /// ATmega88 with the classic instruction set.
    #[default]
    ATMega88,
    /// ATmega328p; same instruction set as the ATmega88, more memory.
    ATMega328p,
    /// XMega core with the extended instruction set.
    XMega,
}

/// Every architecture, in the order they are listed in diagnostics.
pub const ARCHITECTURES: [Architecture; 3] = [
    Architecture::ATMega88,
    Architecture::ATMega328p,
    Architecture::XMega,
];

/// Unknown architecture name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown architecture '{0}' (expected atmega88, atmega328p or xmega)")]
pub struct UnknownArchitecture(pub String);

impl Architecture {
    /// Lower-case name accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ATMega88 => "atmega88",
            Self::ATMega328p => "atmega328p",
            Self::XMega => "xmega",
        }
    }

    /// Memory sizes used for operand range checks.
    #[must_use]
    pub const fn layout(self) -> MemoryLayout {
        match self {
            Self::ATMega88 => MemoryLayout {
                flash_bytes: 8192,
                sram_start: 0x100,
                sram_bytes: 1024,
                eeprom_bytes: 512,
                register_file: 32,
                io_window: 64,
            },
            Self::ATMega328p | Self::XMega => MemoryLayout {
                flash_bytes: 32768,
                sram_start: 0x100,
                sram_bytes: 2048,
                eeprom_bytes: 1024,
                register_file: 32,
                io_window: 64,
            },
        }
    }

    /// Instruction table, built on first use and shared afterwards.
    ///
    /// # Panics
    ///
    /// Panics when the built-in table is inconsistent. That is a defect of
    /// this crate and is caught by its tests.
    #[must_use]
    pub fn table(self) -> &'static EncodingTable {
        static CLASSIC: OnceLock<EncodingTable> = OnceLock::new();
        static EXTENDED: OnceLock<EncodingTable> = OnceLock::new();
        let (cell, build): (_, fn() -> Result<EncodingTable, TableError>) = match self {
            Self::ATMega88 | Self::ATMega328p => (&CLASSIC, classic_table),
            Self::XMega => (&EXTENDED, extended_table),
        };
        cell.get_or_init(|| match build() {
            Ok(table) => table,
            Err(error) => panic!("built-in {} instruction table is broken: {error}", self.name()),
        })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = UnknownArchitecture;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ARCHITECTURES
            .into_iter()
            .find(|arch| arch.name() == wanted)
            .ok_or_else(|| UnknownArchitecture(s.to_string()))
    }
}

/// Builds the classic AVR instruction table.
///
/// # Errors
///
/// Returns the first [`TableError`] found while registering instructions.
pub fn classic_table() -> Result<EncodingTable, TableError> {
    let mut builder = TableBuilder::new();
    atmega88::register(&mut builder)?;
    builder.build()
}

/// Builds the classic table plus the XMega extensions.
///
/// # Errors
///
/// Returns the first [`TableError`] found while registering instructions.
pub fn extended_table() -> Result<EncodingTable, TableError> {
    let mut builder = TableBuilder::new();
    atmega88::register(&mut builder)?;
    xmega::register(&mut builder)?;
    builder.build()
}

/// Memory sizes of a target, all in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryLayout {
    /// Program memory size.
    pub flash_bytes: u32,
    /// First SRAM address in data space.
    pub sram_start: u32,
    /// SRAM size.
    pub sram_bytes: u32,
    /// EEPROM size.
    pub eeprom_bytes: u32,
    /// Number of general purpose registers, mapped at data address 0.
    pub register_file: u32,
    /// Size of the I/O window reachable by `in`/`out`, mapped right after
    /// the register file.
    pub io_window: u32,
}

impl MemoryLayout {
    /// First data-space address past SRAM.
    #[must_use]
    pub const fn data_end(&self) -> u32 {
        self.sram_start + self.sram_bytes
    }

    /// Data-space address of I/O port 0.
    #[must_use]
    pub const fn io_start(&self) -> u32 {
        self.register_file
    }

    /// First data-space address past the I/O window.
    #[must_use]
    pub const fn io_end(&self) -> u32 {
        self.register_file + self.io_window
    }
}

#[cfg(test)]
mod tests {
    use super::{Architecture, ARCHITECTURES};
    use rstest::rstest;

    #[rstest]
    #[case("atmega88", Architecture::ATMega88)]
    #[case("ATmega328P", Architecture::ATMega328p)]
    #[case(" xmega ", Architecture::XMega)]
    fn names_parse_case_insensitively(#[case] name: &str, #[case] expected: Architecture) {
        assert_eq!(name.parse::<Architecture>(), Ok(expected));
    }

    #[test]
    fn unknown_name_is_rejected() {
        let error = "attiny".parse::<Architecture>().unwrap_err();
        assert!(error.to_string().contains("attiny"));
    }

    #[test]
    fn every_table_builds() {
        for arch in ARCHITECTURES {
            assert!(arch.table().entry("nop").is_some(), "{arch} lacks nop");
        }
    }

    #[test]
    fn xmega_extends_the_classic_set() {
        let classic = Architecture::ATMega88.table();
        let extended = Architecture::XMega.table();
        assert!(classic.entry("xch").is_none());
        assert!(extended.entry("xch").is_some());
        assert!(classic.mnemonics().all(|m| extended.entry(m).is_some()));
        assert!(std::ptr::eq(classic, Architecture::ATMega328p.table()));
    }

    #[test]
    fn layouts_describe_data_space() {
        let layout = Architecture::ATMega88.layout();
        assert_eq!(layout.data_end(), 0x500);
        assert_eq!((layout.io_start(), layout.io_end()), (32, 96));
        assert_eq!(Architecture::XMega.layout().flash_bytes, 32768);
    }
}
