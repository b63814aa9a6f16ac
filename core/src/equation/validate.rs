//! Compile-time validation of parsed equations.
//!
//! Runs at construct registration, before an equation is ever
//! evaluated: unknown functions, item references outside the owning
//! construct, reserved-word assignment targets, and use-before-assign
//! are all rejected here with source locations.

use super::ast::{Expr, Program, Span, Stmt};
use super::builtins::BuiltinFn;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Keywords of the surface language; none may be an assignment target.
const RESERVED_WORDS: &[&str] = &["null", "if", "then", "elif", "else", "and", "or", "xor"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidateError {
    #[error("unknown function `{name}` at {span}")]
    UnknownFunction { name: String, span: Span },

    #[error("`{name}` takes {expected} arguments, found {found} at {span}")]
    WrongArity {
        name: String,
        expected: &'static str,
        found: usize,
        span: Span,
    },

    #[error("item reference {{q{number}}} at {span} is not part of this construct")]
    UnknownItem { number: u32, span: Span },

    #[error("`{name}` is a reserved word and cannot be assigned at {span}")]
    ReservedWord { name: String, span: Span },

    #[error("variable `{name}` used before assignment at {span}")]
    UseBeforeAssign { name: String, span: Span },
}

/// Validate a parsed program against the item numbers of the owning
/// construct.
pub fn validate_program(
    program: &Program,
    allowed_items: &BTreeSet<u32>,
) -> Result<(), ValidateError> {
    let mut assigned: HashSet<&str> = HashSet::new();

    for stmt in &program.statements {
        match stmt {
            Stmt::Assign { name, span, expr } => {
                if RESERVED_WORDS.contains(&name.as_str()) || BuiltinFn::from_name(name).is_some() {
                    return Err(ValidateError::ReservedWord {
                        name: name.clone(),
                        span: *span,
                    });
                }
                // The right-hand side sees only earlier assignments.
                validate_expr(expr, allowed_items, &assigned)?;
                assigned.insert(name.as_str());
            }
            Stmt::Expr(expr) => validate_expr(expr, allowed_items, &assigned)?,
        }
    }

    Ok(())
}

fn validate_expr(
    expr: &Expr,
    allowed_items: &BTreeSet<u32>,
    assigned: &HashSet<&str>,
) -> Result<(), ValidateError> {
    match expr {
        Expr::Number(_) | Expr::Null => Ok(()),
        Expr::ItemRef { number, span } => {
            if allowed_items.contains(number) {
                Ok(())
            } else {
                Err(ValidateError::UnknownItem {
                    number: *number,
                    span: *span,
                })
            }
        }
        Expr::Var { name, span } => {
            if assigned.contains(name.as_str()) {
                Ok(())
            } else {
                Err(ValidateError::UseBeforeAssign {
                    name: name.clone(),
                    span: *span,
                })
            }
        }
        Expr::Neg(inner) => validate_expr(inner, allowed_items, assigned),
        Expr::Binary { left, right, .. }
        | Expr::Compare { left, right, .. }
        | Expr::Logic { left, right, .. } => {
            validate_expr(left, allowed_items, assigned)?;
            validate_expr(right, allowed_items, assigned)
        }
        Expr::Call { name, args, span } => {
            let Some(func) = BuiltinFn::from_name(name) else {
                return Err(ValidateError::UnknownFunction {
                    name: name.clone(),
                    span: *span,
                });
            };
            if !func.accepts_arity(args.len()) {
                return Err(ValidateError::WrongArity {
                    name: name.clone(),
                    expected: func.arity_label(),
                    found: args.len(),
                    span: *span,
                });
            }
            for arg in args {
                validate_expr(arg, allowed_items, assigned)?;
            }
            Ok(())
        }
        Expr::If { arms, else_expr } => {
            for (cond, body) in arms {
                validate_expr(cond, allowed_items, assigned)?;
                validate_expr(body, allowed_items, assigned)?;
            }
            validate_expr(else_expr, allowed_items, assigned)
        }
    }
}
