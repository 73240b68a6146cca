//! Instruction encodings and the selectors choosing between them.
//!
//! An [`InstructionEncoding`] is one concrete form of a mnemonic: a compiled
//! opcode template plus the operand kinds it takes. Mnemonics with several
//! addressing forms (`ld X` / `ld Y+` / ...) own more than one encoding and an
//! [`InstructionSelector`] that picks the right one from the written operands.
//! In the other direction a [`DisassemblySelector`] breaks ties between
//! encodings whose bit patterns coincide.

use tracing::trace;

use crate::error::{EncodeError, EncodeErrorKind, TableError};
use crate::node::{InstructionNode, OperandNode, Segment, Value};
use crate::operand::{OperandKind, PointerMode};
use crate::pattern::{BitPattern, Role};
use crate::resolve::Transform;

/// Index of an encoding inside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodingId(pub(crate) usize);

impl EncodingId {
    /// Position in the table's encoding list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// How written operands map onto the template's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum EncodingShape {
    /// Operand 0 fills the destination role, operand 1 the source role.
    #[default]
    Direct,
    /// Operand 0 is implied by the form (e.g. `st X+, r1`); operand 1 fills
    /// the destination role.
    ImplicitDestination,
    /// Operand 1 is implied by the form (e.g. `ld r1, Z`); operand 0 fills
    /// the destination role.
    ImplicitSource,
    /// The single operand is written into both roles (`clr rd` is
    /// `eor rd,rd`).
    Duplicated,
}

impl EncodingShape {
    /// Operand kind expected in the destination and source roles.
    #[must_use]
    pub const fn role_kinds(self, operands: [OperandKind; 2]) -> [Option<OperandKind>; 2] {
        const fn present(kind: OperandKind) -> Option<OperandKind> {
            match kind {
                OperandKind::None => None,
                kind => Some(kind),
            }
        }
        match self {
            Self::Direct => [present(operands[0]), present(operands[1])],
            Self::ImplicitDestination => [present(operands[1]), None],
            Self::ImplicitSource => [present(operands[0]), None],
            Self::Duplicated => [present(operands[0]), present(operands[0])],
        }
    }

    /// Index of the operand the form implies, if any.
    #[must_use]
    pub const fn implied_operand(self) -> Option<usize> {
        match self {
            Self::ImplicitDestination => Some(0),
            Self::ImplicitSource => Some(1),
            Self::Direct | Self::Duplicated => None,
        }
    }
}

/// Declarative description of one encoding, consumed by the table builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    /// Opcode template.
    pub template: &'static str,
    /// Operand kinds in source order.
    pub operands: [OperandKind; 2],
    /// Operand-to-role mapping.
    pub shape: EncodingShape,
    /// Per-operand value transforms.
    pub transforms: [Transform; 2],
    /// Whether the disassembler may produce this form.
    pub decodable: bool,
}

impl Variant {
    /// Plain form: operand 0 to the destination role, operand 1 to the source.
    #[must_use]
    pub const fn new(template: &'static str, operands: [OperandKind; 2]) -> Self {
        Self {
            template,
            operands,
            shape: EncodingShape::Direct,
            transforms: [Transform::None, Transform::None],
            decodable: true,
        }
    }

    /// Form without operands.
    #[must_use]
    pub const fn bare(template: &'static str) -> Self {
        Self::new(template, [OperandKind::None, OperandKind::None])
    }

    /// Marks operand 0 as implied by the form.
    #[must_use]
    pub const fn implicit_destination(mut self) -> Self {
        self.shape = EncodingShape::ImplicitDestination;
        self
    }

    /// Marks operand 1 as implied by the form.
    #[must_use]
    pub const fn implicit_source(mut self) -> Self {
        self.shape = EncodingShape::ImplicitSource;
        self
    }

    /// Writes the single operand into both roles.
    #[must_use]
    pub const fn duplicated(mut self) -> Self {
        self.shape = EncodingShape::Duplicated;
        self
    }

    /// Applies `transform` to operand 1 before encoding.
    #[must_use]
    pub const fn source_transform(mut self, transform: Transform) -> Self {
        self.transforms[1] = transform;
        self
    }

    /// Keeps the form out of the disassembler's search structure.
    #[must_use]
    pub const fn encode_only(mut self) -> Self {
        self.decodable = false;
        self
    }
}

/// One decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodedOperand {
    /// Value read from the opcode, after the encoding's transform.
    Field {
        /// Kind of the operand.
        kind: OperandKind,
        /// Raw field value.
        raw: u32,
    },
    /// Operand implied by the form; printed from its kind.
    Implicit(OperandKind),
}

/// A concrete instruction form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionEncoding {
    mnemonic: String,
    pattern: BitPattern,
    operands: [OperandKind; 2],
    shape: EncodingShape,
    transforms: [Transform; 2],
    alias_of: Option<EncodingId>,
    disassembly: DisassemblySelector,
    decodable: bool,
}

impl InstructionEncoding {
    /// Compiles a variant and checks it against its operand kinds.
    ///
    /// # Errors
    ///
    /// Returns a [`TableError`] when the template is malformed, its role count
    /// or field widths disagree with the operand kinds, or an implied operand
    /// has a kind without a fixed spelling.
    pub fn compile(mnemonic: &str, variant: &Variant) -> Result<Self, TableError> {
        if mnemonic.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(TableError::UpperCaseMnemonic(mnemonic.to_string()));
        }
        let pattern = BitPattern::compile(variant.template)?;

        if let Some(index) = variant.shape.implied_operand() {
            if variant.operands[index].implicit_text().is_none() {
                return Err(TableError::ImplicitKind {
                    mnemonic: mnemonic.to_string(),
                    operand: index,
                });
            }
        }

        let role_kinds = variant.shape.role_kinds(variant.operands);
        let expected = role_kinds.iter().flatten().count();
        if pattern.role_count() != expected {
            return Err(TableError::RoleCount {
                mnemonic: mnemonic.to_string(),
                template: variant.template.to_string(),
                expected,
                found: pattern.role_count(),
            });
        }
        for (operand, (role, kind)) in [Role::Destination, Role::Source]
            .into_iter()
            .zip(role_kinds)
            .enumerate()
        {
            let found = pattern.codec(role).width();
            let expected = kind.map_or(0, OperandKind::field_width);
            if found != expected {
                return Err(TableError::FieldWidth {
                    mnemonic: mnemonic.to_string(),
                    template: variant.template.to_string(),
                    operand,
                    expected,
                    found,
                });
            }
        }

        Ok(Self {
            mnemonic: mnemonic.to_string(),
            pattern,
            operands: variant.operands,
            shape: variant.shape,
            transforms: variant.transforms,
            alias_of: None,
            disassembly: DisassemblySelector::Canonical,
            decodable: variant.decodable,
        })
    }

    /// Lower-case mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Compiled template.
    #[must_use]
    pub const fn pattern(&self) -> &BitPattern {
        &self.pattern
    }

    /// Operand kinds in source order.
    #[must_use]
    pub const fn operands(&self) -> [OperandKind; 2] {
        self.operands
    }

    /// Operand-to-role mapping.
    #[must_use]
    pub const fn shape(&self) -> EncodingShape {
        self.shape
    }

    /// Preferred encoding printed instead of this one.
    #[must_use]
    pub const fn alias_of(&self) -> Option<EncodingId> {
        self.alias_of
    }

    /// Tie-breaker used by the disassembler.
    #[must_use]
    pub const fn disassembly(&self) -> DisassemblySelector {
        self.disassembly
    }

    /// Whether the disassembler may produce this form.
    #[must_use]
    pub const fn is_decodable(&self) -> bool {
        self.decodable
    }

    /// Instruction length in bytes.
    #[must_use]
    pub const fn len_bytes(&self) -> usize {
        self.pattern.len_bytes()
    }

    /// Number of operands the programmer writes.
    #[must_use]
    pub fn explicit_count(&self) -> usize {
        self.operands
            .iter()
            .filter(|kind| **kind != OperandKind::None)
            .count()
    }

    pub(crate) fn set_alias_of(&mut self, target: EncodingId) {
        self.alias_of = Some(target);
    }

    pub(crate) fn set_disassembly(&mut self, selector: DisassemblySelector) {
        self.disassembly = selector;
    }

    /// Builds the right-aligned opcode from raw operand values in source
    /// order. Implied operands are ignored.
    #[must_use]
    pub fn encode(&self, raw: [u32; 2]) -> u32 {
        let first = self.transforms[0].apply(raw[0]);
        let second = self.transforms[1].apply(raw[1]);
        let (destination, source) = match self.shape {
            EncodingShape::Direct => (first, second),
            EncodingShape::ImplicitDestination => (second, 0),
            EncodingShape::ImplicitSource => (first, 0),
            EncodingShape::Duplicated => (first, first),
        };
        self.pattern.encode(destination, source)
    }

    /// Decodes the written operands from a left-aligned word.
    #[must_use]
    pub fn decode(&self, word: u32) -> Vec<DecodedOperand> {
        let (destination, source) = self.pattern.decode(word);
        let field = |index: usize, value: Option<u32>| DecodedOperand::Field {
            kind: self.operands[index],
            raw: self.transforms[index].apply(value.unwrap_or(0)),
        };
        let decoded = match self.shape {
            EncodingShape::Direct => [field(0, destination), field(1, source)],
            EncodingShape::ImplicitDestination => [
                DecodedOperand::Implicit(self.operands[0]),
                field(1, destination),
            ],
            EncodingShape::ImplicitSource => [
                field(0, destination),
                DecodedOperand::Implicit(self.operands[1]),
            ],
            EncodingShape::Duplicated => [field(0, destination), field(1, None)],
        };
        decoded
            .into_iter()
            .zip(self.operands)
            .filter(|(_, kind)| *kind != OperandKind::None)
            .map(|(operand, _)| operand)
            .collect()
    }

    /// Whether both roles decode to the same value; a missing role counts as
    /// equal to the present one.
    #[must_use]
    pub fn roles_equal(&self, word: u32) -> bool {
        match self.pattern.decode(word) {
            (Some(destination), Some(source)) => destination == source,
            _ => true,
        }
    }
}

/// Picks one encoding of a mnemonic from the written operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionSelector {
    /// The mnemonic has exactly one form.
    Single,
    /// Forms differ in the pointer register or addressing mode of one
    /// operand. A form without operands is chosen when none are written.
    OperandShape {
        /// Index of the discriminating operand.
        operand: usize,
    },
    /// Direct load/store with a short and a long address form.
    DirectAddress {
        /// Index of the address operand.
        address: usize,
        /// Index of the register operand.
        register: usize,
        /// Short form.
        short: EncodingId,
        /// Long form.
        long: EncodingId,
    },
}

impl InstructionSelector {
    /// Picks the encoding for `node`.
    ///
    /// `reserved` is the size assigned in an earlier pass; a form longer than
    /// the reserved size is never picked, and a form shorter than it is only
    /// picked when no form fills it.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeErrorKind::NoMatchingForm`] when no candidate accepts
    /// the operand shapes.
    pub fn pick(
        &self,
        node: &InstructionNode,
        candidates: &[EncodingId],
        encodings: &[InstructionEncoding],
        reserved: Option<usize>,
    ) -> Result<EncodingId, EncodeError> {
        let no_match = |span| {
            EncodeError::new(EncodeErrorKind::NoMatchingForm(node.mnemonic.to_lowercase()), span)
        };
        let picked = match *self {
            Self::Single => candidates.first().copied().ok_or_else(|| no_match(node.span))?,
            Self::OperandShape { operand } => {
                if node.operands.is_empty() {
                    candidates
                        .iter()
                        .copied()
                        .find(|id| encodings[id.0].explicit_count() == 0)
                        .ok_or_else(|| no_match(node.span))?
                } else {
                    let written = node.operands.get(operand);
                    candidates
                        .iter()
                        .copied()
                        .find(|id| shape_matches(encodings[id.0].operands[operand], written))
                        .ok_or_else(|| no_match(written.map_or(node.span, OperandNode::span)))?
                }
            }
            Self::DirectAddress {
                address,
                register,
                short,
                long,
            } => {
                let long_len = encodings[long.0].len_bytes();
                let address = node.operands.get(address).and_then(OperandNode::value);
                let register = node
                    .operands
                    .get(register)
                    .and_then(OperandNode::register)
                    .map(|node| node.register.number);
                match (address, register) {
                    _ if reserved.is_some_and(|bytes| bytes >= long_len) => long,
                    (Some(value), Some(number)) if number >= 16 && fits_short(value) => short,
                    _ => long,
                }
            }
        };
        trace!(
            mnemonic = %node.mnemonic,
            encoding = picked.0,
            "selected instruction form"
        );
        Ok(picked)
    }

    /// Worst-case length in bytes for `node`, used before symbols are
    /// resolved.
    #[must_use]
    pub fn estimate_max_length(
        &self,
        node: &InstructionNode,
        candidates: &[EncodingId],
        encodings: &[InstructionEncoding],
    ) -> usize {
        let longest = || {
            candidates
                .iter()
                .map(|id| encodings[id.0].len_bytes())
                .max()
                .unwrap_or(0)
        };
        if let Self::DirectAddress { address, .. } = *self {
            let known = node.operands.get(address).and_then(OperandNode::value);
            if known.is_none() {
                return longest();
            }
        }
        self.pick(node, candidates, encodings, None)
            .map_or_else(|_| longest(), |id| encodings[id.0].len_bytes())
    }

    /// Checks that the selector can interpret its candidates.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::SelectorMismatch`] describing the defect.
    pub fn check(
        &self,
        mnemonic: &str,
        candidates: &[EncodingId],
        encodings: &[InstructionEncoding],
    ) -> Result<(), TableError> {
        let mismatch = |reason: &str| TableError::SelectorMismatch {
            mnemonic: mnemonic.to_string(),
            reason: reason.to_string(),
        };
        match *self {
            Self::Single if candidates.len() != 1 => Err(mismatch("expected exactly one form")),
            Self::Single => Ok(()),
            Self::OperandShape { operand } => {
                let mut seen = Vec::new();
                let mut bare = 0;
                for id in candidates {
                    let encoding = &encodings[id.0];
                    if encoding.explicit_count() == 0 {
                        bare += 1;
                        continue;
                    }
                    let kind = encoding.operands.get(operand).copied();
                    match kind {
                        Some(kind @ (OperandKind::Pointer(..) | OperandKind::Displacement(_))) => {
                            if seen.contains(&kind) {
                                return Err(mismatch("two forms share an operand shape"));
                            }
                            seen.push(kind);
                        }
                        _ => return Err(mismatch("discriminating operand is not a pointer")),
                    }
                }
                if bare > 1 {
                    return Err(mismatch("more than one form without operands"));
                }
                Ok(())
            }
            Self::DirectAddress {
                address,
                short,
                long,
                ..
            } => {
                if candidates != [short, long] {
                    return Err(mismatch("expected a short and a long form"));
                }
                let (short, long) = (&encodings[short.0], &encodings[long.0]);
                if short.len_bytes() >= long.len_bytes() {
                    return Err(mismatch("short form is not shorter than the long form"));
                }
                let is_address = |encoding: &InstructionEncoding| {
                    matches!(
                        encoding.operands.get(address),
                        Some(OperandKind::DataAddress7 | OperandKind::DataAddress16)
                    )
                };
                if !is_address(short) || !is_address(long) {
                    return Err(mismatch("address operand is not a data address"));
                }
                Ok(())
            }
        }
    }
}

fn shape_matches(kind: OperandKind, written: Option<&OperandNode>) -> bool {
    let Some(OperandNode::Register(node)) = written else {
        return false;
    };
    let register = node.register;
    match kind {
        OperandKind::Pointer(pointer, mode) => {
            register.pointer() == Some(pointer)
                && register.mode() == mode
                && node.displacement.is_none()
        }
        OperandKind::Displacement(pointer) => {
            register.pointer() == Some(pointer) && register.mode() == PointerMode::Plain
        }
        _ => false,
    }
}

fn fits_short(value: Value) -> bool {
    match value {
        Value::Number(n) => (0..=127).contains(&n),
        Value::Address(address) => {
            address.segment == Segment::Sram && address.byte_address <= 127
        }
    }
}

/// Tie-breaker between encodings matching the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisassemblySelector {
    /// No preference.
    #[default]
    Canonical,
    /// `single` is printed when both roles of `pair` decode to the same
    /// register (`clr r5` instead of `eor r5,r5`), `pair` otherwise.
    SameOperands {
        /// Duplicated one-operand form.
        single: EncodingId,
        /// Two-operand form.
        pair: EncodingId,
    },
}

impl DisassemblySelector {
    /// Whether `id` survives among the tied candidates `tie` for `word`.
    #[must_use]
    pub fn accepts(
        &self,
        id: EncodingId,
        tie: &[EncodingId],
        word: u32,
        encodings: &[InstructionEncoding],
    ) -> bool {
        match *self {
            Self::Canonical => true,
            Self::SameOperands { single, pair } => {
                if !(tie.contains(&single) && tie.contains(&pair)) {
                    return true;
                }
                let equal = encodings[pair.0].roles_equal(word);
                if id == single {
                    equal
                } else {
                    !equal
                }
            }
        }
    }
}
