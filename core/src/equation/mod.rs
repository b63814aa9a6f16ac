//! Expression engine for construct scoring equations.
//!
//! The surface language supports decimal literals, `null`, `{qN}` item
//! references, arithmetic with standard precedence (`^` right-assoc),
//! comparisons, short-circuit `and`/`or` plus strict `xor`,
//! `if/elif/else` expressions, and variable assignments. A program is a
//! sequence of statements; its value is the last statement's value.
//!
//! Compilation (lex, parse, validate) happens once at construct
//! registration; evaluation is pure CPU with no allocation beyond the
//! variable environment.

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod validate;
pub mod value;

pub use builtins::BuiltinFn;
pub use value::{EvalError, Value};

use ast::Program;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Definition-time failure: the construct cannot be registered.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("{0}")]
    Lex(#[from] lexer::LexError),

    #[error("{0}")]
    Parse(#[from] parser::ParseError),

    #[error("{0}")]
    Validate(#[from] validate::ValidateError),
}

/// A compiled, validated scoring equation.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    source: String,
    program: Program,
}

impl Equation {
    /// Compile an equation against the item numbers of its owning
    /// construct. All definition-time errors surface here.
    pub fn compile(source: &str, allowed_items: &BTreeSet<u32>) -> Result<Self, CompileError> {
        let tokens = lexer::tokenize(source)?;
        let program = parser::parse_program(&tokens)?;
        validate::validate_program(&program, allowed_items)?;
        Ok(Self {
            source: source.to_string(),
            program,
        })
    }

    /// Evaluate against typed item inputs. Missing entries read as null.
    pub fn evaluate(&self, items: &HashMap<u32, Value>) -> Result<Value, EvalError> {
        eval::eval_program(&self.program, items)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Item numbers the equation actually references.
    pub fn referenced_items(&self) -> Vec<u32> {
        self.program.referenced_items()
    }
}
