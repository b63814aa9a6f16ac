//! Runtime values for equation evaluation.
//!
//! Scoring equations traffic in a three-way tagged variant: numbers,
//! booleans (comparison and logic results), and null. Null propagation
//! is folded into the operators here so the evaluator never needs to
//! special-case missing inputs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Number(f64),
    Bool(bool),
    Null,
}

impl Value {
    /// Name of the runtime type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Condition semantics: null is false, numbers are truthy when
    /// non-zero.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Null => false,
        }
    }
}

/// Runtime evaluation errors.
///
/// These surface as null scores with an observability event; they are
/// never user-facing request failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("type error in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot take the square root of a negative number")]
    NegativeSqrt,

    #[error("arity mismatch: `{fn_name}` expects {expected} arguments, got {found}")]
    ArityMismatch {
        fn_name: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("equation produced a non-numeric result: {found}")]
    NonNumericResult { found: &'static str },
}

fn numeric_operand(value: Value, context: &'static str) -> Result<f64, EvalError> {
    value.as_number().ok_or(EvalError::TypeMismatch {
        context,
        expected: "number",
        found: value.type_name(),
    })
}

/// Arithmetic with null propagation: a null operand yields null, a
/// boolean operand is a type error.
pub fn arithmetic(
    op: crate::equation::ast::BinaryOp,
    left: Value,
    right: Value,
) -> Result<Value, EvalError> {
    use crate::equation::ast::BinaryOp;

    if left.is_null() || right.is_null() {
        // Bool-with-null is still a type error, not a silent null.
        for v in [left, right] {
            if matches!(v, Value::Bool(_)) {
                return Err(EvalError::TypeMismatch {
                    context: "arithmetic",
                    expected: "number",
                    found: "bool",
                });
            }
        }
        return Ok(Value::Null);
    }

    let a = numeric_operand(left, "arithmetic")?;
    let b = numeric_operand(right, "arithmetic")?;

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Pow => a.powf(b),
    };
    Ok(Value::Number(result))
}

/// Comparison with null propagation: a null operand yields null.
pub fn compare(
    op: crate::equation::ast::CompareOp,
    left: Value,
    right: Value,
) -> Result<Value, EvalError> {
    use crate::equation::ast::CompareOp;

    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let a = numeric_operand(left, "comparison")?;
    let b = numeric_operand(right, "comparison")?;

    let result = match op {
        CompareOp::Gt => a > b,
        CompareOp::Lt => a < b,
        CompareOp::Ge => a >= b,
        CompareOp::Le => a <= b,
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation::ast::{BinaryOp, CompareOp};

    #[test]
    fn test_arithmetic_propagates_null() {
        let result = arithmetic(BinaryOp::Add, Value::Number(4.0), Value::Null).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let result = arithmetic(BinaryOp::Div, Value::Number(1.0), Value::Number(0.0));
        assert_eq!(result.unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn test_pow() {
        let result = arithmetic(BinaryOp::Pow, Value::Number(2.0), Value::Number(10.0)).unwrap();
        assert_eq!(result, Value::Number(1024.0));
    }

    #[test]
    fn test_comparison_with_null_is_null() {
        let result = compare(CompareOp::Eq, Value::Null, Value::Null).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn test_bool_in_arithmetic_is_a_type_error() {
        let err = arithmetic(BinaryOp::Mul, Value::Bool(true), Value::Number(2.0)).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_null_is_falsey() {
        assert!(!Value::Null.is_truthy());
        assert!(Value::Number(3.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
    }
}
