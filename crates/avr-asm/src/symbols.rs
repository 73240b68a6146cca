//! Symbol table for labels and `.equ` constants.
//!
//! Labels hold flash byte addresses assigned in the first pass. Constants
//! keep their defining expression so they may refer to symbols defined
//! later in the file.

use std::collections::{HashMap, HashSet};

use avr_isa::{Address, Value};

use crate::parser::Expr;

/// What a symbol stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolValue {
    /// Flash byte address of a label.
    Label(u32),
    /// Expression of an `.equ` constant.
    Constant(Expr),
}

/// A symbol with its definition location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Label address or constant expression.
    pub value: SymbolValue,
    /// Source line number where the symbol was defined.
    pub defined_at: usize,
}

/// Error during symbol definition or lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolError {
    /// Kind of error.
    pub kind: SymbolErrorKind,
    /// Source line where the error occurred.
    pub line: usize,
}

/// Classification of symbol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolErrorKind {
    /// Label or constant defined twice.
    DuplicateSymbol {
        /// The symbol name.
        name: String,
        /// Line of the first definition.
        first_definition: usize,
    },
    /// Reference to a symbol that is never defined.
    UndefinedSymbol {
        /// The symbol name.
        name: String,
    },
    /// Constant whose definition refers back to itself.
    CircularDefinition {
        /// The symbol name.
        name: String,
    },
}

impl std::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::fmt::Display for SymbolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSymbol {
                name,
                first_definition,
            } => {
                write!(
                    f,
                    "duplicate symbol '{name}' (first defined at line {first_definition})"
                )
            }
            Self::UndefinedSymbol { name } => write!(f, "undefined symbol '{name}'"),
            Self::CircularDefinition { name } => {
                write!(f, "circular definition of '{name}'")
            }
        }
    }
}

impl std::error::Error for SymbolError {}

/// Labels and constants of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a label at a flash byte address.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateSymbol` if the name is taken.
    pub fn define_label(
        &mut self,
        name: &str,
        address: u32,
        line: usize,
    ) -> Result<(), SymbolError> {
        self.define(name, SymbolValue::Label(address), line)
    }

    /// Defines an `.equ` constant.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateSymbol` if the name is taken.
    pub fn define_constant(
        &mut self,
        name: &str,
        value: Expr,
        line: usize,
    ) -> Result<(), SymbolError> {
        self.define(name, SymbolValue::Constant(value), line)
    }

    fn define(&mut self, name: &str, value: SymbolValue, line: usize) -> Result<(), SymbolError> {
        if let Some(existing) = self.symbols.get(name) {
            return Err(SymbolError {
                kind: SymbolErrorKind::DuplicateSymbol {
                    name: name.to_string(),
                    first_definition: existing.defined_at,
                },
                line,
            });
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                value,
                defined_at: line,
            },
        );
        Ok(())
    }

    /// Looks up a symbol definition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Number of defined symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Evaluates an expression.
    ///
    /// Returns `Ok(None)` when a referenced symbol is not defined (yet).
    ///
    /// # Errors
    ///
    /// Returns `CircularDefinition` when constants refer to each other in a
    /// loop. `line` is used for the error location.
    pub fn resolve(&self, expr: &Expr, line: usize) -> Result<Option<Value>, SymbolError> {
        self.resolve_inner(expr, line, &mut HashSet::new())
    }

    /// Evaluates an expression that must be fully defined.
    ///
    /// # Errors
    ///
    /// Returns `UndefinedSymbol` for a missing symbol, in addition to the
    /// errors of [`SymbolTable::resolve`].
    pub fn resolve_defined(&self, expr: &Expr, line: usize) -> Result<Value, SymbolError> {
        self.resolve(expr, line)?.ok_or_else(|| SymbolError {
            kind: SymbolErrorKind::UndefinedSymbol {
                name: self.first_undefined(expr).unwrap_or_default(),
            },
            line,
        })
    }

    fn resolve_inner<'a>(
        &'a self,
        expr: &'a Expr,
        line: usize,
        visiting: &mut HashSet<&'a str>,
    ) -> Result<Option<Value>, SymbolError> {
        let name = match expr {
            Expr::Number(n) => return Ok(Some(Value::Number(*n))),
            Expr::Symbol(name) => name.as_str(),
        };
        let Some(symbol) = self.symbols.get(name) else {
            return Ok(None);
        };
        match &symbol.value {
            SymbolValue::Label(address) => Ok(Some(Value::Address(Address::flash(*address)))),
            SymbolValue::Constant(inner) => {
                if !visiting.insert(name) {
                    return Err(SymbolError {
                        kind: SymbolErrorKind::CircularDefinition {
                            name: name.to_string(),
                        },
                        line,
                    });
                }
                let value = self.resolve_inner(inner, line, visiting);
                visiting.remove(name);
                value
            }
        }
    }

    /// Name of the undefined symbol an expression bottoms out at.
    fn first_undefined(&self, expr: &Expr) -> Option<String> {
        let mut current = expr;
        // Constants may form a cycle.
        for _ in 0..=self.symbols.len() {
            let Expr::Symbol(name) = current else {
                return None;
            };
            match self.symbols.get(name).map(|symbol| &symbol.value) {
                None => return Some(name.clone()),
                Some(SymbolValue::Constant(inner)) => current = inner,
                Some(SymbolValue::Label(_)) => return None,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str) -> Expr {
        Expr::Symbol(name.to_string())
    }

    #[test]
    fn labels_resolve_to_flash_addresses() {
        let mut table = SymbolTable::new();
        table.define_label("start", 0x20, 1).unwrap();
        assert_eq!(
            table.resolve(&symbol("start"), 5),
            Ok(Some(Value::Address(Address::flash(0x20))))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_symbol_reports_first_definition() {
        let mut table = SymbolTable::new();
        table.define_label("loop", 0, 2).unwrap();
        let error = table.define_constant("loop", Expr::Number(1), 7).unwrap_err();
        assert_eq!(error.line, 7);
        assert_eq!(
            error.to_string(),
            "duplicate symbol 'loop' (first defined at line 2)"
        );
    }

    #[test]
    fn constants_may_refer_forward() {
        let mut table = SymbolTable::new();
        table.define_constant("alias", symbol("target"), 1).unwrap();
        assert_eq!(table.resolve(&symbol("alias"), 1), Ok(None));
        table.define_constant("target", Expr::Number(0x60), 2).unwrap();
        assert_eq!(
            table.resolve(&symbol("alias"), 1),
            Ok(Some(Value::Number(0x60)))
        );
    }

    #[test]
    fn undefined_symbol_names_the_missing_leaf() {
        let mut table = SymbolTable::new();
        table.define_constant("a", symbol("b"), 1).unwrap();
        let error = table.resolve_defined(&symbol("a"), 4).unwrap_err();
        assert_eq!(error.to_string(), "undefined symbol 'b'");
        assert_eq!(error.line, 4);
    }

    #[test]
    fn circular_constants_are_rejected() {
        let mut table = SymbolTable::new();
        table.define_constant("a", symbol("b"), 1).unwrap();
        table.define_constant("b", symbol("a"), 2).unwrap();
        let error = table.resolve(&symbol("a"), 3).unwrap_err();
        assert!(matches!(error.kind, SymbolErrorKind::CircularDefinition { .. }));
    }
}
