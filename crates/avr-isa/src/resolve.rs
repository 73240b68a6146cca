//! Operand validation and conversion to raw field values.

use crate::arch::MemoryLayout;
use crate::codec::low_bits;
use crate::error::OperandError;
use crate::node::{Address, OperandNode, RegisterNode, Segment, Value, ValueNode};
use crate::operand::{pointer_text, OperandKind, PointerMode, PointerRegister};

/// Which pass is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Early syntax and range check; unresolved symbols are tolerated.
    Validate,
    /// Final code generation; every value must be known.
    Compile,
}

/// Post-processing applied to a raw field value before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Transform {
    /// Use the value as is.
    #[default]
    None,
    /// Bitwise complement of an 8-bit immediate (`cbr` as `andi`).
    Invert8,
}

impl Transform {
    /// Applies the transform.
    #[must_use]
    pub const fn apply(self, raw: u32) -> u32 {
        match self {
            Self::None => raw,
            Self::Invert8 => !raw & 0xFF,
        }
    }
}

/// Converts one operand into the raw value for its opcode field.
///
/// Returns `Ok(None)` during [`Phase::Validate`] when the value depends on a
/// symbol that is not resolved yet. `current` is the address of the
/// instruction being encoded and only matters for relative kinds.
///
/// # Errors
///
/// Returns an [`OperandError`] when the operand has the wrong shape, does not
/// fit its field or the target's memory, or is still unresolved during
/// [`Phase::Compile`].
pub fn resolve(
    operand: &OperandNode,
    kind: OperandKind,
    layout: &MemoryLayout,
    current: Address,
    phase: Phase,
) -> Result<Option<u32>, OperandError> {
    if kind.is_register() {
        let OperandNode::Register(node) = operand else {
            return Err(if kind.is_pair() || kind.pointer().is_some() {
                OperandError::NotCompoundRegister
            } else {
                OperandError::NotSingleRegister
            });
        };
        return resolve_register(node, kind, layout, phase);
    }

    let OperandNode::Value(node) = operand else {
        return Err(OperandError::NotAValue);
    };
    let Some(value) = known(node, phase)? else {
        return Ok(None);
    };
    resolve_value(value, kind, layout, current).map(Some)
}

fn known(node: &ValueNode, phase: Phase) -> Result<Option<Value>, OperandError> {
    match (node.value, phase) {
        (Some(value), _) => Ok(Some(value)),
        (None, Phase::Validate) => Ok(None),
        (None, Phase::Compile) => Err(OperandError::Unresolved),
    }
}

fn resolve_register(
    node: &RegisterNode,
    kind: OperandKind,
    layout: &MemoryLayout,
    phase: Phase,
) -> Result<Option<u32>, OperandError> {
    let register = node.register;
    let number = u32::from(register.number);
    if number >= layout.register_file {
        return Err(OperandError::RegisterOutOfRange {
            register: register.number,
            expected: "r0..r31",
        });
    }
    let out_of_range = |expected| OperandError::RegisterOutOfRange {
        register: register.number,
        expected,
    };
    let plain_single = !register.compound && register.mode() == PointerMode::Plain;
    let plain_pair = register.mode() == PointerMode::Plain && node.displacement.is_none();

    let raw = match kind {
        OperandKind::Register if plain_single => number,
        OperandKind::RegisterLow if plain_single => {
            if number > 15 {
                return Err(out_of_range("r0..r15"));
            }
            number
        }
        OperandKind::RegisterHigh if plain_single => {
            if number < 16 {
                return Err(out_of_range("r16..r31"));
            }
            number - 16
        }
        OperandKind::RegisterMul if plain_single => {
            if !(16..=23).contains(&number) {
                return Err(out_of_range("r16..r23"));
            }
            number - 16
        }
        OperandKind::Register
        | OperandKind::RegisterLow
        | OperandKind::RegisterHigh
        | OperandKind::RegisterMul => return Err(OperandError::NotSingleRegister),
        OperandKind::RegisterPair if plain_pair => {
            if !matches!(number, 24 | 26 | 28 | 30) {
                return Err(out_of_range("r24, r26, r28 or r30"));
            }
            (number - 24) / 2
        }
        OperandKind::RegisterPairAny if plain_pair => {
            if number % 2 != 0 {
                return Err(out_of_range("an even register"));
            }
            number / 2
        }
        OperandKind::RegisterPair | OperandKind::RegisterPairAny => {
            return Err(OperandError::NotCompoundRegister)
        }
        OperandKind::Pointer(expected, mode) => {
            check_pointer(node, expected, mode)?;
            if node.displacement.is_some() {
                return Err(OperandError::WrongPointerMode {
                    expected: pointer_text(expected, mode),
                });
            }
            0
        }
        OperandKind::Displacement(expected) => {
            check_pointer(node, expected, PointerMode::Plain)?;
            let Some(displacement) = node.displacement.as_ref() else {
                return Ok(Some(0));
            };
            match known(displacement, phase)? {
                None => return Ok(None),
                Some(Value::Number(q)) => checked_unsigned(q, 6)?,
                Some(Value::Address(_)) => return Err(OperandError::DisplacementNotANumber),
            }
        }
        _ => return Err(OperandError::NotAValue),
    };
    Ok(Some(raw))
}

fn check_pointer(
    node: &RegisterNode,
    expected: PointerRegister,
    mode: PointerMode,
) -> Result<(), OperandError> {
    if node.register.pointer() != Some(expected) {
        return Err(OperandError::WrongPointer { expected });
    }
    if node.register.mode() != mode {
        return Err(OperandError::WrongPointerMode {
            expected: pointer_text(expected, mode),
        });
    }
    Ok(())
}

fn resolve_value(
    value: Value,
    kind: OperandKind,
    layout: &MemoryLayout,
    current: Address,
) -> Result<u32, OperandError> {
    let bits = kind.field_width();
    match kind {
        OperandKind::Unsigned3
        | OperandKind::Unsigned4
        | OperandKind::Unsigned6
        | OperandKind::Unsigned8 => checked_unsigned(plain(value), bits),
        OperandKind::IoAddress5 | OperandKind::IoAddress6 => {
            match value {
                Value::Number(port) => {
                    let raw = checked_unsigned(port, bits)?;
                    if raw >= layout.io_window {
                        return Err(OperandError::PortOutOfRange {
                            port,
                            window: layout.io_window,
                        });
                    }
                    Ok(raw)
                }
                Value::Address(address) => checked_unsigned(io_port(address, layout)?, bits),
            }
        }
        OperandKind::DataAddress7 | OperandKind::DataAddress16 => {
            let address = in_segment(value, Segment::Sram)?;
            let end = layout.data_end();
            if address < 0 || address >= i64::from(end) {
                return Err(OperandError::DataOutOfRange { address, end });
            }
            checked_unsigned(address, bits)
        }
        OperandKind::FlashAddress22 => {
            let address = in_segment(value, Segment::Flash)?;
            let size = layout.flash_bytes;
            if address < 0 || address >= i64::from(size) {
                return Err(OperandError::FlashOutOfRange { address, size });
            }
            if address % 2 != 0 {
                return Err(OperandError::MisalignedAddress { address });
            }
            checked_unsigned(address / 2, bits)
        }
        OperandKind::BranchOffset7 | OperandKind::JumpOffset12 => {
            let delta = match value {
                Value::Number(delta) => delta,
                Value::Address(target) => {
                    if target.segment != Segment::Flash {
                        return Err(OperandError::WrongSegment {
                            expected: Segment::Flash.name(),
                        });
                    }
                    if current.segment != Segment::Flash {
                        return Err(OperandError::NotAssemblingIntoFlash);
                    }
                    i64::from(target.word_address()) - i64::from(current.word_address())
                }
            };
            checked_signed(delta, bits)
        }
        _ => Err(OperandError::UnexpectedOperand),
    }
}

fn plain(value: Value) -> i64 {
    match value {
        Value::Number(n) => n,
        Value::Address(address) => i64::from(address.byte_address),
    }
}

fn in_segment(value: Value, segment: Segment) -> Result<i64, OperandError> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Address(address) if address.segment == segment => {
            Ok(i64::from(address.byte_address))
        }
        Value::Address(_) => Err(OperandError::WrongSegment {
            expected: segment.name(),
        }),
    }
}

/// Maps a memory-mapped I/O address to its port number.
fn io_port(address: Address, layout: &MemoryLayout) -> Result<i64, OperandError> {
    if address.segment != Segment::Sram {
        return Err(OperandError::WrongSegment {
            expected: Segment::Sram.name(),
        });
    }
    let start = layout.io_start();
    let end = layout.io_end();
    if !(start..end).contains(&address.byte_address) {
        return Err(OperandError::IoOutOfRange {
            address: i64::from(address.byte_address),
            start,
            end,
        });
    }
    Ok(i64::from(address.byte_address - start))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn checked_unsigned(value: i64, bits: u8) -> Result<u32, OperandError> {
    if value < 0 || value > i64::from(low_bits(bits)) {
        return Err(OperandError::ValueOutOfRange { value, bits });
    }
    Ok(value as u32)
}

/// Two's-complement range check; the result is masked to the field width.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn checked_signed(delta: i64, bits: u8) -> Result<u32, OperandError> {
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    if delta < min || delta > max {
        return Err(OperandError::JumpOutOfRange { bits, delta });
    }
    Ok((delta as u32) & low_bits(bits))
}

/// Sign-extends a decoded relative field back to a word offset.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_lossless)]
pub const fn sign_extend(raw: u32, bits: u8) -> i32 {
    let shift = 32 - bits as u32;
    ((raw << shift) as i32) >> shift
}

#[cfg(test)]
mod tests {
    use super::{resolve, sign_extend, Phase, Transform};
    use crate::arch::{Architecture, MemoryLayout};
    use crate::error::OperandError;
    use crate::node::{Address, OperandNode, Register, RegisterNode, Span, ValueNode};
    use crate::operand::{OperandKind, PointerMode, PointerRegister};

    fn register(register: Register) -> OperandNode {
        OperandNode::Register(RegisterNode {
            register,
            displacement: None,
            span: Span::default(),
        })
    }

    fn number(value: i64) -> OperandNode {
        OperandNode::Value(ValueNode::number(value, Span::default()))
    }

    fn run(operand: &OperandNode, kind: OperandKind) -> Result<Option<u32>, OperandError> {
        resolve(
            operand,
            kind,
            &Architecture::ATMega88.layout(),
            Address::flash(0),
            Phase::Compile,
        )
    }

    #[test]
    fn register_sub_ranges_are_offset() {
        assert_eq!(run(&register(Register::single(31)), OperandKind::RegisterHigh), Ok(Some(15)));
        assert_eq!(run(&register(Register::single(23)), OperandKind::RegisterMul), Ok(Some(7)));
        assert!(matches!(
            run(&register(Register::single(15)), OperandKind::RegisterHigh),
            Err(OperandError::RegisterOutOfRange { register: 15, .. })
        ));
        assert!(matches!(
            run(&register(Register::single(24)), OperandKind::RegisterMul),
            Err(OperandError::RegisterOutOfRange { .. })
        ));
    }

    #[test]
    fn pairs_accept_even_single_registers() {
        assert_eq!(run(&register(Register::pair(30)), OperandKind::RegisterPair), Ok(Some(3)));
        assert_eq!(run(&register(Register::single(24)), OperandKind::RegisterPair), Ok(Some(0)));
        assert_eq!(run(&register(Register::pair(4)), OperandKind::RegisterPairAny), Ok(Some(2)));
        assert!(run(&register(Register::single(5)), OperandKind::RegisterPairAny).is_err());
    }

    #[test]
    fn value_in_register_slot_is_structural_error() {
        assert_eq!(run(&number(3), OperandKind::Register), Err(OperandError::NotSingleRegister));
        assert_eq!(
            run(&register(Register::single(3)), OperandKind::Unsigned8),
            Err(OperandError::NotAValue)
        );
    }

    #[test]
    fn pointer_identity_and_mode_are_checked() {
        let kind = OperandKind::Pointer(PointerRegister::Z, PointerMode::PostIncrement);
        let z_plus = Register::pointer_in_mode(PointerRegister::Z, PointerMode::PostIncrement);
        assert_eq!(run(&register(z_plus), kind), Ok(Some(0)));
        let x_plus = Register::pointer_in_mode(PointerRegister::X, PointerMode::PostIncrement);
        assert_eq!(
            run(&register(x_plus), kind),
            Err(OperandError::WrongPointer {
                expected: PointerRegister::Z
            })
        );
        let z = Register::pointer_in_mode(PointerRegister::Z, PointerMode::Plain);
        assert_eq!(
            run(&register(z), kind),
            Err(OperandError::WrongPointerMode {
                expected: "Z+".into()
            })
        );
    }

    #[test]
    fn displacement_defaults_to_zero() {
        let y = Register::pointer_in_mode(PointerRegister::Y, PointerMode::Plain);
        let kind = OperandKind::Displacement(PointerRegister::Y);
        assert_eq!(run(&register(y), kind), Ok(Some(0)));
        let with = OperandNode::Register(RegisterNode {
            register: y,
            displacement: Some(ValueNode::number(64, Span::default())),
            span: Span::default(),
        });
        assert!(matches!(
            run(&with, kind),
            Err(OperandError::ValueOutOfRange { value: 64, bits: 6 })
        ));
    }

    #[test]
    fn branch_at_zero_to_word_65_is_out_of_range() {
        let target = OperandNode::Value(ValueNode::address(Address::flash(130), Span::default()));
        let error = run(&target, OperandKind::BranchOffset7).unwrap_err();
        assert_eq!(error, OperandError::JumpOutOfRange { bits: 7, delta: 65 });
        assert!(error.to_string().starts_with("jump distance out of"));
    }

    #[test]
    fn relative_bounds_are_twos_complement() {
        assert_eq!(run(&number(63), OperandKind::BranchOffset7), Ok(Some(63)));
        assert_eq!(run(&number(-64), OperandKind::BranchOffset7), Ok(Some(0x40)));
        assert!(run(&number(-65), OperandKind::BranchOffset7).is_err());
        assert_eq!(run(&number(2047), OperandKind::JumpOffset12), Ok(Some(0x7FF)));
        assert_eq!(run(&number(-2048), OperandKind::JumpOffset12), Ok(Some(0x800)));
        assert!(run(&number(2048), OperandKind::JumpOffset12).is_err());
    }

    #[test]
    fn relative_target_needs_flash_position() {
        let target = OperandNode::Value(ValueNode::address(Address::flash(4), Span::default()));
        let result = resolve(
            &target,
            OperandKind::JumpOffset12,
            &Architecture::ATMega88.layout(),
            Address::sram(0x100),
            Phase::Compile,
        );
        assert_eq!(result, Err(OperandError::NotAssemblingIntoFlash));
    }

    #[test]
    fn flash_addresses_are_word_aligned() {
        assert_eq!(run(&number(0x100), OperandKind::FlashAddress22), Ok(Some(0x80)));
        assert_eq!(
            run(&number(0x101), OperandKind::FlashAddress22),
            Err(OperandError::MisalignedAddress { address: 0x101 })
        );
        assert!(matches!(
            run(&number(8192), OperandKind::FlashAddress22),
            Err(OperandError::FlashOutOfRange { size: 8192, .. })
        ));
    }

    #[test]
    fn io_window_addresses_are_rebased() {
        let port = OperandNode::Value(ValueNode::address(Address::sram(0x3F + 32), Span::default()));
        assert_eq!(run(&port, OperandKind::IoAddress6), Ok(Some(0x3F)));
        let outside = OperandNode::Value(ValueNode::address(Address::sram(0x60), Span::default()));
        assert!(matches!(
            run(&outside, OperandKind::IoAddress6),
            Err(OperandError::IoOutOfRange { start: 32, end: 96, .. })
        ));
        assert!(run(&number(32), OperandKind::IoAddress5).is_err());
    }

    #[test]
    fn numeric_ports_respect_a_smaller_io_window() {
        let layout = MemoryLayout {
            io_window: 32,
            ..Architecture::ATMega88.layout()
        };
        let resolve_port = |port: i64| {
            resolve(
                &number(port),
                OperandKind::IoAddress6,
                &layout,
                Address::flash(0),
                Phase::Compile,
            )
        };
        assert_eq!(resolve_port(0x1F), Ok(Some(0x1F)));
        let error = resolve_port(0x3F).unwrap_err();
        assert_eq!(error, OperandError::PortOutOfRange { port: 0x3F, window: 32 });
        assert_eq!(error.to_string(), "I/O port 63 is outside the I/O window 0..32");
        assert_eq!(run(&number(0x3F), OperandKind::IoAddress6), Ok(Some(0x3F)));
    }

    #[test]
    fn unresolved_values_depend_on_phase() {
        let pending = OperandNode::Value(ValueNode::unresolved(Span::default()));
        let layout = Architecture::ATMega88.layout();
        let validate = resolve(
            &pending,
            OperandKind::JumpOffset12,
            &layout,
            Address::flash(0),
            Phase::Validate,
        );
        assert_eq!(validate, Ok(None));
        assert_eq!(run(&pending, OperandKind::JumpOffset12), Err(OperandError::Unresolved));
    }

    #[test]
    fn invert_and_sign_extend() {
        assert_eq!(Transform::Invert8.apply(0x0F), 0xF0);
        assert_eq!(Transform::None.apply(0x0F), 0x0F);
        assert_eq!(sign_extend(0x40, 7), -64);
        assert_eq!(sign_extend(0x3F, 7), 63);
        assert_eq!(sign_extend(0xFFF, 12), -1);
    }
}
