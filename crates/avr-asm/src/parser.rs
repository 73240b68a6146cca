//! Assembly source line parser.
//!
//! Each line holds an optional `label:` followed by an optional instruction
//! or directive; everything after `;` is a comment. Operands are kept as
//! unresolved expressions so that labels defined further down can be filled
//! in by the second pass.

use avr_isa::{
    InstructionNode, OperandNode, PointerMode, PointerRegister, Register, RegisterNode, Span,
    Value, ValueNode,
};

/// An operand value as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Literal number. Relative `.+N` operands are stored as a word delta.
    Number(i64),
    /// Reference to a label or `.equ` constant.
    Symbol(String),
}

/// A parsed operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOperand {
    /// Register, register pair or pointer register.
    Register {
        /// Register reference.
        register: Register,
        /// `+q` displacement of `Y+q`/`Z+q`.
        displacement: Option<Expr>,
        /// 1-indexed column.
        column: usize,
    },
    /// Number, relative offset or symbol.
    Value {
        /// The expression.
        expr: Expr,
        /// 1-indexed column.
        column: usize,
    },
}

/// A parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    /// Mnemonic as written.
    pub mnemonic: String,
    /// Operands in source order.
    pub operands: Vec<ParsedOperand>,
    /// Location of the mnemonic.
    pub location: SourceLocation,
}

impl ParsedInstruction {
    /// Builds the encoder's node, looking up symbols with `lookup`.
    ///
    /// Symbols `lookup` cannot resolve yet become unresolved values.
    #[must_use]
    pub fn to_node(&self, mut lookup: impl FnMut(&str) -> Option<Value>) -> InstructionNode {
        let mut value = |expr: &Expr, span: Span| match expr {
            Expr::Number(n) => ValueNode::number(*n, span),
            Expr::Symbol(name) => ValueNode {
                value: lookup(name),
                span,
            },
        };
        let line = self.location.line;
        let operands = self
            .operands
            .iter()
            .map(|operand| match operand {
                ParsedOperand::Register {
                    register,
                    displacement,
                    column,
                } => {
                    let span = span_at(line, *column);
                    OperandNode::Register(RegisterNode {
                        register: *register,
                        displacement: displacement.as_ref().map(|expr| value(expr, span)),
                        span,
                    })
                }
                ParsedOperand::Value { expr, column } => {
                    OperandNode::Value(value(expr, span_at(line, *column)))
                }
            })
            .collect();
        InstructionNode::new(
            self.mnemonic.clone(),
            operands,
            span_at(line, self.location.column),
        )
    }

    /// Names of the symbols referenced by the operands.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.operands.iter().filter_map(|operand| {
            let expr = match operand {
                ParsedOperand::Register { displacement, .. } => displacement.as_ref()?,
                ParsedOperand::Value { expr, .. } => expr,
            };
            match expr {
                Expr::Symbol(name) => Some(name.as_str()),
                Expr::Number(_) => None,
            }
        })
    }

    /// Column of the first operand referring to `name`, or of the mnemonic.
    #[must_use]
    pub fn symbol_column(&self, name: &str) -> usize {
        self.operands
            .iter()
            .find_map(|operand| {
                let (expr, column) = match operand {
                    ParsedOperand::Register {
                        displacement,
                        column,
                        ..
                    } => (displacement.as_ref()?, *column),
                    ParsedOperand::Value { expr, column } => (expr, *column),
                };
                matches!(expr, Expr::Symbol(symbol) if symbol == name).then_some(column)
            })
            .unwrap_or(self.location.column)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn span_at(line: usize, column: usize) -> Span {
    Span::new(line as u32, column as u32)
}

/// Instruction or directive of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Machine instruction.
    Instruction(ParsedInstruction),
    /// `.equ NAME = value` constant definition.
    Equ {
        /// Constant name.
        name: String,
        /// Defining expression.
        value: Expr,
    },
    /// `.db`/`.byte` raw bytes.
    Bytes(Vec<Expr>),
}

/// A single parsed source line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedLine {
    /// Label defined on the line.
    pub label: Option<String>,
    /// Instruction or directive following the label.
    pub statement: Option<Statement>,
}

/// Source location for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number.
    pub column: usize,
}

/// Parse error with source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Location of the error.
    pub location: SourceLocation,
    /// Kind of parse error.
    pub kind: ParseErrorKind,
}

/// Classification of parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Malformed register name.
    InvalidRegister(String),
    /// Register pair whose halves are not adjacent.
    InvalidRegisterPair(String),
    /// Malformed number or symbol.
    InvalidImmediate(String),
    /// Relative offset that is not a whole number of words.
    InvalidRelative(String),
    /// Unknown directive name.
    InvalidDirective(String),
    /// Invalid arguments of a directive.
    InvalidDirectiveValue(String),
    /// General syntax error.
    InvalidSyntax(String),
    /// Empty operand between commas.
    MissingOperand,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRegister(r) => write!(f, "invalid register: {r}"),
            Self::InvalidRegisterPair(r) => {
                write!(f, "invalid register pair: {r} (expected rN+1:rN)")
            }
            Self::InvalidImmediate(v) => write!(f, "invalid immediate value: {v}"),
            Self::InvalidRelative(v) => {
                write!(f, "relative offset must be an even number of bytes: {v}")
            }
            Self::InvalidDirective(d) => write!(f, "unknown directive: {d}"),
            Self::InvalidDirectiveValue(v) => write!(f, "invalid directive value: {v}"),
            Self::InvalidSyntax(s) => write!(f, "invalid syntax: {s}"),
            Self::MissingOperand => write!(f, "missing operand"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Result of parsing a single line.
pub type ParseResult = Result<ParsedLine, ParseError>;

/// Parses a source line.
///
/// # Errors
///
/// Returns a `ParseError` for malformed operands or unknown directives.
/// Mnemonics are not checked here; that is the encoder's job.
#[allow(clippy::option_if_let_else)]
pub fn parse_line(line: &str, line_number: usize) -> ParseResult {
    let text = strip_comment(line);
    let (label, rest, offset) = match split_label(text) {
        Some((label, rest, offset)) => (Some(label), rest, offset),
        None => (None, text, 0),
    };

    let trimmed = rest.trim_start();
    let column = offset + (rest.len() - trimmed.len()) + 1;
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        return Ok(ParsedLine {
            label,
            statement: None,
        });
    }

    let statement = if trimmed.starts_with('.') {
        parse_directive(trimmed, line_number, column)?
    } else {
        Statement::Instruction(parse_instruction_at(trimmed, line_number, column)?)
    };
    Ok(ParsedLine {
        label,
        statement: Some(statement),
    })
}

/// Parses an instruction without label or comment.
///
/// # Errors
///
/// Returns a `ParseError` for malformed operands.
pub fn parse_instruction(text: &str, line_number: usize) -> Result<ParsedInstruction, ParseError> {
    let trimmed = text.trim_start();
    let column = text.len() - trimmed.len() + 1;
    parse_instruction_at(trimmed.trim_end(), line_number, column)
}

fn strip_comment(line: &str) -> &str {
    line.find(';').map_or(line, |pos| &line[..pos])
}

/// Splits `name:` off the front of a line; returns the label, the rest and
/// the byte offset of the rest.
fn split_label(text: &str) -> Option<(String, &str, usize)> {
    let colon_pos = text.find(':')?;
    let label = text[..colon_pos].trim();
    is_valid_label(label)
        .then(|| (label.to_string(), &text[colon_pos + 1..], colon_pos + 1))
}

fn is_valid_label(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const fn error(line: usize, column: usize, kind: ParseErrorKind) -> ParseError {
    ParseError {
        location: SourceLocation { line, column },
        kind,
    }
}

fn parse_directive(text: &str, line: usize, column: usize) -> Result<Statement, ParseError> {
    let without_dot = &text[1..];
    let name_len = without_dot
        .find(char::is_whitespace)
        .unwrap_or(without_dot.len());
    let name = &without_dot[..name_len];
    let args = &without_dot[name_len..];
    let args_column = column + 1 + name_len;

    match name.to_ascii_lowercase().as_str() {
        "equ" | "set" => {
            let separator = args.find(['=', ',']).ok_or_else(|| {
                error(line, column, ParseErrorKind::InvalidDirectiveValue(args.trim().to_string()))
            })?;
            let symbol = args[..separator].trim();
            if !is_valid_label(symbol) || is_reserved(symbol) {
                return Err(error(
                    line,
                    args_column,
                    ParseErrorKind::InvalidDirectiveValue(symbol.to_string()),
                ));
            }
            let value_text = &args[separator + 1..];
            let value = parse_expr(value_text.trim(), line, args_column + separator + 1)?;
            Ok(Statement::Equ {
                name: symbol.to_string(),
                value,
            })
        }
        "db" | "byte" => {
            let values = split_operands(args, args_column)
                .into_iter()
                .map(|(piece, col)| {
                    if piece.is_empty() {
                        Err(error(line, col, ParseErrorKind::MissingOperand))
                    } else {
                        parse_expr(piece, line, col)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            if values.is_empty() {
                return Err(error(line, column, ParseErrorKind::MissingOperand));
            }
            Ok(Statement::Bytes(values))
        }
        _ => Err(error(line, column, ParseErrorKind::InvalidDirective(name.to_string()))),
    }
}

fn parse_instruction_at(
    text: &str,
    line: usize,
    column: usize,
) -> Result<ParsedInstruction, ParseError> {
    let mnemonic_len = text.find(char::is_whitespace).unwrap_or(text.len());
    let mnemonic = &text[..mnemonic_len];
    if !mnemonic.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(error(line, column, ParseErrorKind::InvalidSyntax(mnemonic.to_string())));
    }

    let mut operands = Vec::new();
    let rest = &text[mnemonic_len..];
    if !rest.trim().is_empty() {
        for (piece, col) in split_operands(rest, column + mnemonic_len) {
            if piece.is_empty() {
                return Err(error(line, col, ParseErrorKind::MissingOperand));
            }
            operands.push(parse_operand(piece, line, col)?);
        }
    }

    Ok(ParsedInstruction {
        mnemonic: mnemonic.to_string(),
        operands,
        location: SourceLocation { line, column },
    })
}

/// Splits a comma-separated list into trimmed pieces with their columns.
fn split_operands(text: &str, column: usize) -> Vec<(&str, usize)> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for piece in text.split(',') {
        let trimmed = piece.trim_start();
        let lead = piece.len() - trimmed.len();
        pieces.push((trimmed.trim_end(), column + start + lead));
        start += piece.len() + 1;
    }
    pieces
}

fn is_reserved(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(lower.as_str(), "x" | "y" | "z") || register_number(&lower).is_some()
}

fn register_number(lower: &str) -> Option<&str> {
    let digits = lower.strip_prefix('r')?;
    (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

const fn pointer_register(c: char) -> Option<PointerRegister> {
    match c {
        'x' => Some(PointerRegister::X),
        'y' => Some(PointerRegister::Y),
        'z' => Some(PointerRegister::Z),
        _ => None,
    }
}

fn parse_operand(text: &str, line: usize, column: usize) -> Result<ParsedOperand, ParseError> {
    let lower = text.to_ascii_lowercase();
    let register = |register| ParsedOperand::Register {
        register,
        displacement: None,
        column,
    };

    // -X
    if let Some(pointer) = lower
        .strip_prefix('-')
        .and_then(single_char)
        .and_then(pointer_register)
    {
        return Ok(register(Register::pointer_in_mode(pointer, PointerMode::PreDecrement)));
    }

    let mut chars = lower.chars();
    if let Some(pointer) = chars.next().and_then(pointer_register) {
        let rest = chars.as_str().trim_start();
        if rest.is_empty() {
            return Ok(register(Register::pointer_in_mode(pointer, PointerMode::Plain)));
        }
        if let Some(after_plus) = rest.strip_prefix('+') {
            let displacement = after_plus.trim();
            if displacement.is_empty() {
                return Ok(register(Register::pointer_in_mode(
                    pointer,
                    PointerMode::PostIncrement,
                )));
            }
            // Y+q
            let offset = text.len() - displacement.len();
            return Ok(ParsedOperand::Register {
                register: Register::pointer_in_mode(pointer, PointerMode::Plain),
                displacement: Some(parse_expr(&text[offset..], line, column + offset)?),
                column,
            });
        }
    }

    if let Some((high, low)) = lower.split_once(':') {
        let (Some(high), Some(low)) = (register_number(high.trim()), register_number(low.trim()))
        else {
            return Err(error(line, column, ParseErrorKind::InvalidRegisterPair(text.to_string())));
        };
        let parse = |digits: &str| digits.parse::<u8>().ok();
        return match (parse(high), parse(low)) {
            (Some(high), Some(low)) if low.checked_add(1) == Some(high) => {
                Ok(register(Register::pair(low)))
            }
            _ => Err(error(line, column, ParseErrorKind::InvalidRegisterPair(text.to_string()))),
        };
    }

    if let Some(digits) = register_number(&lower) {
        let number = digits.parse::<u8>().map_err(|_| {
            error(line, column, ParseErrorKind::InvalidRegister(text.to_string()))
        })?;
        return Ok(register(Register::single(number)));
    }

    Ok(ParsedOperand::Value {
        expr: parse_expr(text, line, column)?,
        column,
    })
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.trim().chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn parse_expr(text: &str, line: usize, column: usize) -> Result<Expr, ParseError> {
    let text = text.trim();
    if let Some(relative) = text.strip_prefix('.') {
        let bytes = parse_numeric_value(relative.trim_start_matches('+'))
            .ok_or_else(|| error(line, column, ParseErrorKind::InvalidImmediate(text.to_string())))?;
        if bytes % 2 != 0 {
            return Err(error(line, column, ParseErrorKind::InvalidRelative(text.to_string())));
        }
        return Ok(Expr::Number(bytes / 2));
    }
    if is_valid_label(text) && !is_reserved(text) {
        return Ok(Expr::Symbol(text.to_string()));
    }
    parse_numeric_value(text)
        .map(Expr::Number)
        .ok_or_else(|| error(line, column, ParseErrorKind::InvalidImmediate(text.to_string())))
}

#[allow(clippy::option_if_let_else)]
fn parse_numeric_value(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => match digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
            Some(bin) => i64::from_str_radix(bin, 2).ok()?,
            None => digits.parse::<i64>().ok()?,
        },
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(line: &str) -> ParsedInstruction {
        match parse_line(line, 1) {
            Ok(ParsedLine {
                statement: Some(Statement::Instruction(instruction)),
                ..
            }) => instruction,
            other => panic!("expected an instruction, got {other:?}"),
        }
    }

    fn register_of(operand: &ParsedOperand) -> Register {
        match operand {
            ParsedOperand::Register { register, .. } => *register,
            ParsedOperand::Value { .. } => panic!("expected a register"),
        }
    }

    #[test]
    fn parse_blank_and_comment_lines() {
        assert_eq!(parse_line("", 1), Ok(ParsedLine::default()));
        assert_eq!(parse_line("  ; comment only  ", 1), Ok(ParsedLine::default()));
    }

    #[test]
    fn parse_label_with_instruction() {
        let parsed = parse_line("loop: rjmp loop ; spin", 3).expect("line should parse");
        assert_eq!(parsed.label.as_deref(), Some("loop"));
        let Some(Statement::Instruction(instruction)) = parsed.statement else {
            panic!("expected an instruction");
        };
        assert_eq!(instruction.mnemonic, "rjmp");
        assert_eq!(instruction.location, SourceLocation { line: 3, column: 7 });
        assert_eq!(
            instruction.operands,
            vec![ParsedOperand::Value {
                expr: Expr::Symbol("loop".into()),
                column: 12
            }]
        );
    }

    #[test]
    fn parse_register_forms() {
        let parsed = instruction("movw r25:r24, R23:R22");
        assert_eq!(register_of(&parsed.operands[0]), Register::pair(24));
        assert_eq!(register_of(&parsed.operands[1]), Register::pair(22));
        assert_eq!(parsed.operands.len(), 2);

        let parsed = instruction("ld r1, -X");
        assert_eq!(
            register_of(&parsed.operands[1]),
            Register::pointer_in_mode(PointerRegister::X, PointerMode::PreDecrement)
        );
        let parsed = instruction("st Z+, r0");
        assert_eq!(
            register_of(&parsed.operands[0]),
            Register::pointer_in_mode(PointerRegister::Z, PointerMode::PostIncrement)
        );
    }

    #[test]
    fn parse_displacement() {
        let parsed = instruction("ldd r4, z+50");
        assert_eq!(
            parsed.operands[1],
            ParsedOperand::Register {
                register: Register::pointer_in_mode(PointerRegister::Z, PointerMode::Plain),
                displacement: Some(Expr::Number(50)),
                column: 9,
            }
        );
    }

    #[test]
    fn parse_numbers_and_relative_offsets() {
        let parsed = instruction("ldi r16, 0xFF");
        assert!(matches!(parsed.operands[1], ParsedOperand::Value { expr: Expr::Number(255), .. }));
        let parsed = instruction("andi r16, 0b1010");
        assert!(matches!(parsed.operands[1], ParsedOperand::Value { expr: Expr::Number(10), .. }));
        let parsed = instruction("rjmp .-2");
        assert!(matches!(parsed.operands[0], ParsedOperand::Value { expr: Expr::Number(-1), .. }));
        let parsed = instruction("breq .+6");
        assert!(matches!(parsed.operands[0], ParsedOperand::Value { expr: Expr::Number(3), .. }));
    }

    #[test]
    fn parse_rejects_odd_relative_offsets() {
        let error = parse_line("rjmp .+3", 2).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::InvalidRelative(".+3".into()));
        assert_eq!(error.location, SourceLocation { line: 2, column: 6 });
    }

    #[test]
    fn parse_rejects_bad_pairs() {
        let error = parse_line("movw r25:r23, r1:r0", 1).unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::InvalidRegisterPair(_)));
    }

    #[test]
    fn parse_equ_and_bytes() {
        let parsed = parse_line(".equ PORTB = 0x05", 1).expect("equ should parse");
        assert_eq!(
            parsed.statement,
            Some(Statement::Equ {
                name: "PORTB".into(),
                value: Expr::Number(5)
            })
        );
        let parsed = parse_line(".db 0xff, 1", 1).expect("db should parse");
        assert_eq!(
            parsed.statement,
            Some(Statement::Bytes(vec![Expr::Number(255), Expr::Number(1)]))
        );
        assert!(parse_line(".equ r1 = 4", 1).is_err());
        assert!(matches!(
            parse_line(".org 0", 1).unwrap_err().kind,
            ParseErrorKind::InvalidDirective(_)
        ));
    }

    #[test]
    fn parse_missing_operand() {
        let error = parse_line("add r1,", 1).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::MissingOperand);
    }

    #[test]
    fn node_carries_spans_and_symbols() {
        let parsed = instruction("  rcall target");
        let node = parsed.to_node(|name| (name == "target").then_some(Value::Number(4)));
        assert_eq!(node.span, Span::new(1, 3));
        assert_eq!(node.operands[0].value(), Some(Value::Number(4)));
        let node = parsed.to_node(|_| None);
        assert_eq!(node.operands[0].value(), None);
    }
}
