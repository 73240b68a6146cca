//! Structured error reporting for assembler phases.
//!
//! Errors carry a source location and are collected so that a single run
//! reports every problem in a file. They format to stderr in the usual
//! compiler style:
//! ```text
//! blink.asm:10:5: error: message
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use avr_isa::EncodeError;

use crate::parser::ParseError;
use crate::symbols::SymbolError;

/// A source location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    /// File path.
    pub file: PathBuf,
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number (1 if unknown).
    pub column: usize,
}

impl SourceLoc {
    /// Creates a new source location.
    #[must_use]
    pub const fn new(file: PathBuf, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }

    /// Formats the location as `file:line:column`.
    #[must_use]
    pub fn format_location(&self) -> String {
        format!("{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_location())
    }
}

/// A unified assembler error with source context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
    /// The kind of error.
    pub kind: AssemblerErrorKind,
    /// Source location if available.
    pub location: Option<SourceLoc>,
}

impl AssemblerError {
    /// Creates a new assembler error.
    #[must_use]
    pub const fn new(kind: AssemblerErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Adds a source location to the error.
    #[must_use]
    pub fn with_location(mut self, loc: SourceLoc) -> Self {
        self.location = Some(loc);
        self
    }

    /// Error located at `line:column` of `file`.
    #[must_use]
    pub fn at(kind: AssemblerErrorKind, file: &Path, line: usize, column: usize) -> Self {
        Self::new(kind).with_location(SourceLoc::new(file.to_path_buf(), line, column))
    }

    /// Formats the error for stderr output.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        self.location.as_ref().map_or_else(
            || format!("error: {}", self.kind),
            |loc| format!("{}: error: {}", loc.format_location(), self.kind),
        )
    }
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}", loc.format_location(), self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AssemblerError {}

impl From<ParseError> for AssemblerError {
    fn from(e: ParseError) -> Self {
        let location = SourceLoc::new(PathBuf::new(), e.location.line, e.location.column);
        Self::new(AssemblerErrorKind::Parse(e)).with_location(location)
    }
}

impl From<SymbolError> for AssemblerError {
    fn from(e: SymbolError) -> Self {
        let location = SourceLoc::new(PathBuf::new(), e.line, 1);
        Self::new(AssemblerErrorKind::Symbol(e)).with_location(location)
    }
}

impl From<EncodeError> for AssemblerError {
    fn from(e: EncodeError) -> Self {
        let location = SourceLoc::new(
            PathBuf::new(),
            e.span.line as usize,
            e.span.column as usize,
        );
        Self::new(AssemblerErrorKind::Encode(e)).with_location(location)
    }
}

/// Classification of assembler errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
    /// Parse error during source line parsing.
    Parse(ParseError),
    /// Symbol table error (duplicate, undefined or circular symbol).
    Symbol(SymbolError),
    /// Encoding error raised while compiling an instruction.
    Encode(EncodeError),
    /// Diagnostic reported while validating an instruction.
    Operand(String),
    /// Instruction came out at a different size than the first pass assigned.
    SizeMismatch {
        /// Bytes reserved in the first pass.
        expected: usize,
        /// Bytes written in the second pass.
        found: usize,
    },
    /// Output does not fit into the target's flash.
    ProgramTooLarge {
        /// Program size in bytes.
        size: usize,
        /// Flash size in bytes.
        flash: usize,
    },
    /// I/O error reading or writing a file.
    Io(String),
}

impl fmt::Display for AssemblerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Symbol(e) => write!(f, "{e}"),
            Self::Encode(e) => write!(f, "{e}"),
            Self::Operand(message) => write!(f, "{message}"),
            Self::SizeMismatch { expected, found } => write!(
                f,
                "instruction size changed between passes ({expected} bytes reserved, {found} written)"
            ),
            Self::ProgramTooLarge { size, flash } => write!(
                f,
                "program is {size} bytes, target architecture only has {flash} bytes of flash memory"
            ),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

/// Every error found while assembling one file.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollection {
    errors: Vec<AssemblerError>,
}

impl ErrorCollection {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Records another error.
    pub fn push(&mut self, error: AssemblerError) {
        self.errors.push(error);
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates the errors in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &AssemblerError> {
        self.errors.iter()
    }

    /// One `file:line:col: error: message` line per error.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        let lines: Vec<String> = self.iter().map(AssemblerError::format_for_stderr).collect();
        lines.join("\n")
    }
}

impl fmt::Display for ErrorCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.iter().map(ToString::to_string).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for ErrorCollection {}

impl FromIterator<AssemblerError> for ErrorCollection {
    fn from_iter<T: IntoIterator<Item = AssemblerError>>(iter: T) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

/// Result type for multi-error operations.
pub type MultiResult<T> = Result<T, ErrorCollection>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseErrorKind, SourceLocation};
    use avr_isa::{EncodeErrorKind, Span};

    fn parse_error(line: usize, column: usize) -> ParseError {
        ParseError {
            location: SourceLocation { line, column },
            kind: ParseErrorKind::MissingOperand,
        }
    }

    #[test]
    fn source_loc_format_simple() {
        let loc = SourceLoc::new(PathBuf::from("blink.asm"), 10, 5);
        assert_eq!(loc.format_location(), "blink.asm:10:5");
        assert_eq!(loc.to_string(), "blink.asm:10:5");
    }

    #[test]
    fn error_without_location() {
        let error = AssemblerError::new(AssemblerErrorKind::Io("file not found".into()));
        assert_eq!(error.format_for_stderr(), "error: I/O error: file not found");
    }

    #[test]
    fn error_with_location() {
        let error = AssemblerError::at(
            AssemblerErrorKind::Operand("operand needs to be Z".into()),
            Path::new("main.asm"),
            3,
            9,
        );
        assert_eq!(
            error.format_for_stderr(),
            "main.asm:3:9: error: operand needs to be Z"
        );
        assert_eq!(error.to_string(), "main.asm:3:9: operand needs to be Z");
    }

    #[test]
    fn parse_error_keeps_its_location() {
        let error = AssemblerError::from(parse_error(7, 12));
        let loc = error.location.expect("location");
        assert_eq!((loc.line, loc.column), (7, 12));
        assert!(matches!(error.kind, AssemblerErrorKind::Parse(_)));
    }

    #[test]
    fn encode_error_uses_its_span() {
        let error = AssemblerError::from(EncodeError::new(
            EncodeErrorKind::UnknownMnemonic("frob".into()),
            Span::new(4, 2),
        ));
        let loc = error.location.clone().expect("location");
        assert_eq!((loc.line, loc.column), (4, 2));
        assert_eq!(error.kind.to_string(), "unknown instruction: frob");
    }

    #[test]
    fn size_mismatch_message() {
        let kind = AssemblerErrorKind::SizeMismatch {
            expected: 4,
            found: 2,
        };
        assert_eq!(
            kind.to_string(),
            "instruction size changed between passes (4 bytes reserved, 2 written)"
        );
    }

    #[test]
    fn error_collection_keeps_insertion_order() {
        let mut errors = ErrorCollection::new();
        assert!(errors.is_empty());
        errors.push(AssemblerError::from(parse_error(2, 1)));
        errors.push(AssemblerError::from(parse_error(1, 1)));
        assert_eq!(errors.len(), 2);
        let lines: Vec<usize> = errors
            .iter()
            .filter_map(|e| e.location.as_ref().map(|l| l.line))
            .collect();
        assert_eq!(lines, [2, 1]);
    }

    #[test]
    fn error_collection_format() {
        let errors: ErrorCollection = [
            AssemblerError::at(AssemblerErrorKind::Io("a".into()), Path::new("x.asm"), 1, 1),
            AssemblerError::new(AssemblerErrorKind::Io("b".into())),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            errors.format_for_stderr(),
            "x.asm:1:1: error: I/O error: a\nerror: I/O error: b"
        );
        assert_eq!(errors.to_string(), "x.asm:1:1: I/O error: a\nI/O error: b");
    }
}
