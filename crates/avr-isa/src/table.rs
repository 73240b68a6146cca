//! Per-architecture instruction table.
//!
//! Tables are assembled once with a [`TableBuilder`] and are read-only
//! afterwards. The table is the encoder's entry point: it looks up a
//! mnemonic, lets the entry's selector pick a form, resolves the operands and
//! writes the opcode words through a [`CompilationContext`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::arch::MemoryLayout;
use crate::context::CompilationContext;
use crate::encoding::{
    DisassemblySelector, EncodingId, InstructionEncoding, InstructionSelector, Variant,
};
use crate::error::{EncodeError, EncodeErrorKind, TableError};
use crate::node::InstructionNode;
use crate::operand::OperandKind;
use crate::resolve::{resolve, Phase};
use crate::trie::PrefixTrie;

/// All forms of one mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingEntry {
    mnemonic: String,
    variants: Vec<EncodingId>,
    selector: InstructionSelector,
}

impl EncodingEntry {
    /// Lower-case mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Forms in registration order.
    #[must_use]
    pub fn variants(&self) -> &[EncodingId] {
        &self.variants
    }

    /// Selector choosing between the forms.
    #[must_use]
    pub const fn selector(&self) -> InstructionSelector {
        self.selector
    }
}

/// Collects encodings and entries for one architecture.
#[derive(Debug, Default)]
pub struct TableBuilder {
    encodings: Vec<InstructionEncoding>,
    entries: BTreeMap<String, EncodingEntry>,
}

impl TableBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mnemonic with a single plain form.
    ///
    /// # Errors
    ///
    /// Returns a [`TableError`] for a malformed template, a template that
    /// disagrees with `operands`, or a mnemonic registered twice.
    pub fn insn(
        &mut self,
        mnemonic: &str,
        template: &'static str,
        operands: [OperandKind; 2],
    ) -> Result<EncodingId, TableError> {
        self.variant(mnemonic, Variant::new(template, operands))
    }

    /// Registers a mnemonic with a single, customised form.
    ///
    /// # Errors
    ///
    /// See [`TableBuilder::insn`].
    pub fn variant(&mut self, mnemonic: &str, variant: Variant) -> Result<EncodingId, TableError> {
        let ids = self.add_entry(mnemonic, &[variant], |_| InstructionSelector::Single)?;
        Ok(ids[0])
    }

    /// Registers a mnemonic whose forms differ in the pointer shape of
    /// operand `operand`.
    ///
    /// # Errors
    ///
    /// See [`TableBuilder::insn`]; also fails when `variants` is empty.
    pub fn shaped(
        &mut self,
        mnemonic: &str,
        operand: usize,
        variants: &[Variant],
    ) -> Result<Vec<EncodingId>, TableError> {
        self.add_entry(mnemonic, variants, |_| InstructionSelector::OperandShape {
            operand,
        })
    }

    /// Registers a direct load/store with a short and a long address form.
    ///
    /// # Errors
    ///
    /// See [`TableBuilder::insn`].
    pub fn direct_address(
        &mut self,
        mnemonic: &str,
        address: usize,
        register: usize,
        short: Variant,
        long: Variant,
    ) -> Result<(), TableError> {
        self.add_entry(mnemonic, &[short, long], |ids| {
            InstructionSelector::DirectAddress {
                address,
                register,
                short: ids[0],
                long: ids[1],
            }
        })
        .map(|_| ())
    }

    /// Makes the disassembler print `target` instead of `mnemonic` when both
    /// match.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingEntry`] when either mnemonic is unknown.
    pub fn alias(&mut self, mnemonic: &str, target: &str) -> Result<(), TableError> {
        let target = self.first_variant(target)?;
        let variants = self.variants_of(mnemonic)?;
        for id in variants {
            self.encodings[id.0].set_alias_of(target);
        }
        Ok(())
    }

    /// Folds the two-operand form `pair` into the one-operand `single` when
    /// both decoded operands are equal.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingEntry`] when either mnemonic is unknown.
    pub fn same_operands(&mut self, single: &str, pair: &str) -> Result<(), TableError> {
        let single = self.first_variant(single)?;
        let pair = self.first_variant(pair)?;
        let selector = DisassemblySelector::SameOperands { single, pair };
        self.encodings[single.0].set_disassembly(selector);
        self.encodings[pair.0].set_disassembly(selector);
        Ok(())
    }

    /// Checks every selector and builds the decoder trie.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::SelectorMismatch`] when a selector cannot handle
    /// its candidates.
    pub fn build(self) -> Result<EncodingTable, TableError> {
        for entry in self.entries.values() {
            entry
                .selector
                .check(&entry.mnemonic, &entry.variants, &self.encodings)?;
        }
        for encoding in &self.encodings {
            let DisassemblySelector::SameOperands { single, pair } = encoding.disassembly() else {
                continue;
            };
            let (single, pair) = (&self.encodings[single.0], &self.encodings[pair.0]);
            if single.pattern().fixed_mask() != pair.pattern().fixed_mask()
                || single.pattern().fixed_value() != pair.pattern().fixed_value()
            {
                return Err(TableError::SelectorMismatch {
                    mnemonic: single.mnemonic().to_string(),
                    reason: format!("'{}' does not share its fixed bits", pair.mnemonic()),
                });
            }
        }
        let trie = PrefixTrie::build(&self.encodings);
        debug!(
            mnemonics = self.entries.len(),
            encodings = self.encodings.len(),
            trie_nodes = trie.node_count(),
            "built instruction table"
        );
        Ok(EncodingTable {
            encodings: self.encodings,
            entries: self.entries,
            trie,
        })
    }

    fn add_entry(
        &mut self,
        mnemonic: &str,
        variants: &[Variant],
        selector: impl FnOnce(&[EncodingId]) -> InstructionSelector,
    ) -> Result<Vec<EncodingId>, TableError> {
        if variants.is_empty() {
            return Err(TableError::EmptyEntry(mnemonic.to_string()));
        }
        if self.entries.contains_key(mnemonic) {
            return Err(TableError::DuplicateMnemonic(mnemonic.to_string()));
        }
        let compiled = variants
            .iter()
            .map(|variant| InstructionEncoding::compile(mnemonic, variant))
            .collect::<Result<Vec<_>, _>>()?;
        let first = self.encodings.len();
        self.encodings.extend(compiled);
        let ids: Vec<EncodingId> = (first..self.encodings.len()).map(EncodingId).collect();
        self.entries.insert(
            mnemonic.to_string(),
            EncodingEntry {
                mnemonic: mnemonic.to_string(),
                selector: selector(&ids),
                variants: ids.clone(),
            },
        );
        Ok(ids)
    }

    fn variants_of(&self, mnemonic: &str) -> Result<Vec<EncodingId>, TableError> {
        self.entries
            .get(mnemonic)
            .map(|entry| entry.variants.clone())
            .ok_or_else(|| TableError::MissingEntry(mnemonic.to_string()))
    }

    fn first_variant(&self, mnemonic: &str) -> Result<EncodingId, TableError> {
        self.variants_of(mnemonic)?
            .first()
            .copied()
            .ok_or_else(|| TableError::EmptyEntry(mnemonic.to_string()))
    }
}

/// Immutable instruction table of one architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingTable {
    encodings: Vec<InstructionEncoding>,
    entries: BTreeMap<String, EncodingEntry>,
    trie: PrefixTrie,
}

impl EncodingTable {
    /// Encoding by id.
    #[must_use]
    pub fn encoding(&self, id: EncodingId) -> &InstructionEncoding {
        &self.encodings[id.0]
    }

    /// All encodings in registration order.
    #[must_use]
    pub fn encodings(&self) -> &[InstructionEncoding] {
        &self.encodings
    }

    /// Looks up a mnemonic, ignoring case.
    #[must_use]
    pub fn entry(&self, mnemonic: &str) -> Option<&EncodingEntry> {
        self.entries.get(&mnemonic.to_ascii_lowercase())
    }

    /// Registered mnemonics in alphabetical order.
    pub fn mnemonics(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Prefix trie over the decodable encodings.
    #[must_use]
    pub const fn trie(&self) -> &PrefixTrie {
        &self.trie
    }

    /// Picks the form of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeErrorKind::UnknownMnemonic`] or the selector's error.
    pub fn select(
        &self,
        node: &InstructionNode,
        reserved: Option<usize>,
    ) -> Result<EncodingId, EncodeError> {
        let entry = self.entry(&node.mnemonic).ok_or_else(|| {
            EncodeError::new(
                EncodeErrorKind::UnknownMnemonic(node.mnemonic.to_lowercase()),
                node.span,
            )
        })?;
        entry
            .selector
            .pick(node, &entry.variants, &self.encodings, reserved)
    }

    /// Worst-case size of `node` in bytes, or `None` for an unknown mnemonic.
    #[must_use]
    pub fn estimate_size(&self, node: &InstructionNode) -> Option<usize> {
        let entry = self.entry(&node.mnemonic)?;
        Some(
            entry
                .selector
                .estimate_max_length(node, &entry.variants, &self.encodings),
        )
    }

    /// Early check of `node` before addresses are assigned.
    ///
    /// Every problem is reported through `context`; the return value tells
    /// whether there were any.
    pub fn validate<C>(&self, node: &InstructionNode, layout: &MemoryLayout, context: &mut C) -> bool
    where
        C: CompilationContext + ?Sized,
    {
        let encoding = match self.select(node, None) {
            Ok(id) => self.encoding(id),
            Err(error) => {
                context.error(&error.to_string(), error.span);
                return false;
            }
        };
        if let Err(error) = check_arity(node, encoding) {
            context.error(&error.to_string(), error.span);
            return false;
        }

        let current = context.current_address();
        let mut valid = true;
        for (operand, kind) in node.operands.iter().zip(encoding.operands()) {
            if let Err(error) = resolve(operand, kind, layout, current, Phase::Validate) {
                context.error(&error.to_string(), operand.span());
                valid = false;
            }
        }
        valid
    }

    /// Encodes `node` and writes its opcode words to `context`.
    ///
    /// `reserved` is the size assigned to the instruction in an earlier pass.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns the first selection, arity or operand error; nothing is
    /// written in that case.
    pub fn compile<C>(
        &self,
        node: &InstructionNode,
        layout: &MemoryLayout,
        context: &mut C,
        reserved: Option<usize>,
    ) -> Result<usize, EncodeError>
    where
        C: CompilationContext + ?Sized,
    {
        let encoding = self.encoding(self.select(node, reserved)?);
        check_arity(node, encoding)?;

        let current = context.current_address();
        let mut raw = [0u32; 2];
        for (slot, (operand, kind)) in raw
            .iter_mut()
            .zip(node.operands.iter().zip(encoding.operands()))
        {
            *slot = resolve(operand, kind, layout, current, Phase::Compile)
                .map_err(|error| EncodeError::new(EncodeErrorKind::Operand(error), operand.span()))?
                .unwrap_or(0);
        }

        let word = encoding.encode(raw);
        let len = encoding.len_bytes();
        for index in (0..len.div_ceil(2)).rev() {
            #[allow(clippy::cast_possible_truncation)]
            context.write_word((word >> (16 * index)) as u16);
        }
        Ok(len)
    }
}

fn check_arity(node: &InstructionNode, encoding: &InstructionEncoding) -> Result<(), EncodeError> {
    let expected = encoding.explicit_count();
    if node.operands.len() == expected {
        return Ok(());
    }
    Err(EncodeError::new(
        EncodeErrorKind::OperandCount {
            mnemonic: encoding.mnemonic().to_string(),
            expected,
            found: node.operands.len(),
        },
        node.span,
    ))
}
