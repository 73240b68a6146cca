//! Top-level two-pass assembler pipeline.
//!
//! 1. **Pass 1**: parse every line, define labels and constants, validate
//!    instructions with the symbols known so far and reserve each
//!    instruction's worst-case size.
//! 2. **Pass 2**: resolve every symbol and encode into the reserved space.
//!
//! Sizes reserved in pass 1 are never shrunk, so label addresses stay put.
//! All errors of a file are collected and returned together.

use std::fmt::Write as _;
use std::path::Path;

use avr_isa::{Architecture, InstructionNode, MemoryLayout, Value};
use tracing::{debug, trace};

use crate::context::BufferContext;
use crate::errors::{AssemblerError, AssemblerErrorKind, ErrorCollection, MultiResult};
use crate::parser::{parse_line, Expr, ParsedInstruction, Statement};
use crate::symbols::SymbolTable;

/// Assembler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssemblerSettings {
    /// Target architecture.
    pub architecture: Architecture,
}

impl AssemblerSettings {
    /// Settings for `architecture`.
    #[must_use]
    pub const fn for_architecture(architecture: Architecture) -> Self {
        Self { architecture }
    }

    /// Memory layout of the target.
    #[must_use]
    pub const fn layout(&self) -> MemoryLayout {
        self.architecture.layout()
    }
}

/// Assembled program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    /// Flash image starting at address 0.
    pub bytes: Vec<u8>,
    /// Address-to-source mapping of every line that produced bytes.
    pub listing: Vec<ListingEntry>,
}

impl Assembly {
    /// Renders the listing as `address: bytes  source` lines.
    #[must_use]
    pub fn format_listing(&self) -> String {
        let mut out = String::new();
        for entry in &self.listing {
            let bytes = entry
                .bytes
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "{:04x}: {bytes:<12} {}", entry.address, entry.source.trim());
        }
        out
    }
}

/// An entry in the address-to-source listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Flash byte address of the entry.
    pub address: u32,
    /// Bytes emitted for the line.
    pub bytes: Vec<u8>,
    /// Source line text.
    pub source: String,
    /// 1-indexed source line number.
    pub line: usize,
}

/// What a line contributes after pass 1.
#[derive(Debug)]
enum Content {
    Instruction(ParsedInstruction),
    Bytes(Vec<Expr>),
    Constant(Expr),
}

#[derive(Debug)]
struct Item<'a> {
    line: usize,
    source: &'a str,
    address: u32,
    size: usize,
    content: Content,
    valid: bool,
}

/// Assembles a source file.
///
/// # Errors
///
/// Returns every error found in the file, or a single I/O error when the
/// file cannot be read.
pub fn assemble(path: &Path, settings: &AssemblerSettings) -> MultiResult<Assembly> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        std::iter::once(AssemblerError::new(AssemblerErrorKind::Io(format!(
            "{}: {e}",
            path.display()
        ))))
        .collect::<ErrorCollection>()
    })?;
    assemble_source(&source, path, settings)
}

/// Assembles source text; `file` is only used in error locations.
///
/// # Errors
///
/// Returns every parse, symbol and encoding error found.
pub fn assemble_source(
    source: &str,
    file: &Path,
    settings: &AssemblerSettings,
) -> MultiResult<Assembly> {
    let mut errors = ErrorCollection::new();
    let mut symbols = SymbolTable::new();
    let items = first_pass(source, file, settings, &mut symbols, &mut errors);
    debug!(
        items = items.len(),
        symbols = symbols.len(),
        errors = errors.len(),
        "first pass complete"
    );

    let assembly = second_pass(&items, file, settings, &symbols, &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }

    let flash = settings.layout().flash_bytes as usize;
    if assembly.bytes.len() > flash {
        errors.push(AssemblerError::at(
            AssemblerErrorKind::ProgramTooLarge {
                size: assembly.bytes.len(),
                flash,
            },
            file,
            1,
            1,
        ));
        return Err(errors);
    }

    debug!(bytes = assembly.bytes.len(), "assembly complete");
    Ok(assembly)
}

#[allow(clippy::cast_possible_truncation)]
fn first_pass<'a>(
    source: &'a str,
    file: &Path,
    settings: &AssemblerSettings,
    symbols: &mut SymbolTable,
    errors: &mut ErrorCollection,
) -> Vec<Item<'a>> {
    let table = settings.architecture.table();
    let layout = settings.layout();
    let mut items = Vec::new();
    let mut address = 0u32;

    for (index, text) in source.lines().enumerate() {
        let line = index + 1;
        let parsed = match parse_line(text, line) {
            Ok(parsed) => parsed,
            Err(e) => {
                errors.push(located(AssemblerError::from(e), file));
                continue;
            }
        };

        if let Some(label) = &parsed.label {
            if let Err(e) = symbols.define_label(label, address, line) {
                errors.push(located(AssemblerError::from(e), file));
            }
        }

        let Some(statement) = parsed.statement else {
            continue;
        };
        let (content, size, valid) = match statement {
            Statement::Equ { name, value } => {
                if let Err(e) = symbols.define_constant(&name, value.clone(), line) {
                    errors.push(located(AssemblerError::from(e), file));
                }
                (Content::Constant(value), 0, true)
            }
            Statement::Bytes(values) => {
                let size = values.len().next_multiple_of(2);
                (Content::Bytes(values), size, true)
            }
            Statement::Instruction(instruction) => {
                let node = instruction.to_node(|name| lookup(symbols, name, line));
                let mut context = BufferContext::at(address);
                let valid = table.validate(&node, &layout, &mut context);
                for (message, span) in context.take_diagnostics() {
                    errors.push(AssemblerError::at(
                        AssemblerErrorKind::Operand(message),
                        file,
                        span.line as usize,
                        span.column as usize,
                    ));
                }
                let size = table.estimate_size(&node).unwrap_or(0);
                trace!(line, address, size, mnemonic = %node.mnemonic, "reserved");
                (Content::Instruction(instruction), size, valid)
            }
        };

        items.push(Item {
            line,
            source: text,
            address,
            size,
            content,
            valid,
        });
        address += size as u32;
    }
    items
}

fn second_pass(
    items: &[Item<'_>],
    file: &Path,
    settings: &AssemblerSettings,
    symbols: &SymbolTable,
    errors: &mut ErrorCollection,
) -> Assembly {
    let table = settings.architecture.table();
    let layout = settings.layout();
    let mut assembly = Assembly::default();

    for item in items {
        let mut output = BufferContext::at(item.address);
        match &item.content {
            Content::Constant(value) => {
                if let Err(e) = symbols.resolve_defined(value, item.line) {
                    errors.push(located(AssemblerError::from(e), file));
                }
                continue;
            }
            Content::Bytes(values) => {
                let mut bytes = Vec::with_capacity(item.size);
                for value in values {
                    match data_byte(symbols, value, item.line) {
                        Ok(byte) => bytes.push(byte),
                        Err(kind) => errors.push(AssemblerError::at(kind, file, item.line, 1)),
                    }
                }
                bytes.resize(item.size, 0);
                output.write_bytes(&bytes);
            }
            Content::Instruction(instruction) => {
                if !item.valid {
                    continue;
                }
                let Some(node) = resolved_node(instruction, symbols, file, errors) else {
                    continue;
                };
                match table.compile(&node, &layout, &mut output, Some(item.size)) {
                    Ok(written) if written != item.size => {
                        errors.push(AssemblerError::at(
                            AssemblerErrorKind::SizeMismatch {
                                expected: item.size,
                                found: written,
                            },
                            file,
                            item.line,
                            instruction.location.column,
                        ));
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        errors.push(located(AssemblerError::from(e), file));
                        continue;
                    }
                }
            }
        }

        if !output.bytes.is_empty() {
            assembly.listing.push(ListingEntry {
                address: item.address,
                bytes: output.bytes.clone(),
                source: item.source.to_string(),
                line: item.line,
            });
        }
        assembly.bytes.extend_from_slice(&output.bytes);
    }
    assembly
}

/// Builds the node with every symbol resolved; reports undefined ones.
fn resolved_node(
    instruction: &ParsedInstruction,
    symbols: &SymbolTable,
    file: &Path,
    errors: &mut ErrorCollection,
) -> Option<InstructionNode> {
    let line = instruction.location.line;
    let mut complete = true;
    for name in instruction.symbols() {
        if let Err(e) = symbols.resolve_defined(&Expr::Symbol(name.to_string()), line) {
            let column = instruction.symbol_column(name);
            errors.push(AssemblerError::at(
                AssemblerErrorKind::Symbol(e),
                file,
                line,
                column,
            ));
            complete = false;
        }
    }
    complete.then(|| instruction.to_node(|name| lookup(symbols, name, line)))
}

fn lookup(symbols: &SymbolTable, name: &str, line: usize) -> Option<Value> {
    symbols
        .resolve(&Expr::Symbol(name.to_string()), line)
        .ok()
        .flatten()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn data_byte(symbols: &SymbolTable, expr: &Expr, line: usize) -> Result<u8, AssemblerErrorKind> {
    match symbols
        .resolve_defined(expr, line)
        .map_err(AssemblerErrorKind::Symbol)?
    {
        Value::Number(n) if (-128..=255).contains(&n) => Ok(n as u8),
        Value::Number(n) => Err(AssemblerErrorKind::Operand(format!(
            "value {n} does not fit into a byte"
        ))),
        Value::Address(_) => Err(AssemblerErrorKind::Operand(
            "operand must evaluate to a constant".to_string(),
        )),
    }
}

/// Fills in the file name of an error's location.
fn located(mut error: AssemblerError, file: &Path) -> AssemblerError {
    if let Some(location) = &mut error.location {
        file.clone_into(&mut location.file);
    }
    error
}
