//! Built-in functions for scoring equations.
//!
//! Aggregating builtins (`sum`, `mean`, `min`, `max`) drop null
//! arguments; `count_available` counts the non-null ones. Scalar
//! builtins propagate null.

use super::value::{EvalError, Value};

/// Enumeration of available built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFn {
    Abs,
    Min,
    Max,
    Sum,
    Mean,
    Round,
    Sqrt,
    CountAvailable,
}

impl BuiltinFn {
    /// Get the function name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFn::Abs => "abs",
            BuiltinFn::Min => "min",
            BuiltinFn::Max => "max",
            BuiltinFn::Sum => "sum",
            BuiltinFn::Mean => "mean",
            BuiltinFn::Round => "round",
            BuiltinFn::Sqrt => "sqrt",
            BuiltinFn::CountAvailable => "count_available",
        }
    }

    /// Parse a function name into a BuiltinFn.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(BuiltinFn::Abs),
            "min" => Some(BuiltinFn::Min),
            "max" => Some(BuiltinFn::Max),
            "sum" => Some(BuiltinFn::Sum),
            "mean" => Some(BuiltinFn::Mean),
            "round" => Some(BuiltinFn::Round),
            "sqrt" => Some(BuiltinFn::Sqrt),
            "count_available" => Some(BuiltinFn::CountAvailable),
            _ => None,
        }
    }

    /// Whether `found` arguments satisfy this function's arity.
    pub fn accepts_arity(&self, found: usize) -> bool {
        match self {
            BuiltinFn::Abs | BuiltinFn::Sqrt => found == 1,
            BuiltinFn::Round => found == 1 || found == 2,
            BuiltinFn::Min
            | BuiltinFn::Max
            | BuiltinFn::Sum
            | BuiltinFn::Mean
            | BuiltinFn::CountAvailable => found >= 1,
        }
    }

    /// Human-readable arity, for error messages.
    pub fn arity_label(&self) -> &'static str {
        match self {
            BuiltinFn::Abs | BuiltinFn::Sqrt => "1",
            BuiltinFn::Round => "1 or 2",
            BuiltinFn::Min
            | BuiltinFn::Max
            | BuiltinFn::Sum
            | BuiltinFn::Mean
            | BuiltinFn::CountAvailable => "1 or more",
        }
    }
}

/// Call a built-in function with the given arguments.
pub fn call_builtin(func: BuiltinFn, args: &[Value]) -> Result<Value, EvalError> {
    if !func.accepts_arity(args.len()) {
        return Err(EvalError::ArityMismatch {
            fn_name: func.name(),
            expected: func.arity_label(),
            found: args.len(),
        });
    }

    match func {
        BuiltinFn::Abs => scalar(args[0], |x| Ok(x.abs())),
        BuiltinFn::Sqrt => scalar(args[0], |x| {
            if x < 0.0 {
                Err(EvalError::NegativeSqrt)
            } else {
                Ok(x.sqrt())
            }
        }),
        BuiltinFn::Round => builtin_round(args),
        BuiltinFn::Sum => {
            let values = numeric_non_null(args)?;
            if values.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::Number(values.iter().sum()))
        }
        BuiltinFn::Mean => {
            let values = numeric_non_null(args)?;
            if values.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::Number(values.iter().sum::<f64>() / values.len() as f64))
        }
        BuiltinFn::Min => {
            let values = numeric_non_null(args)?;
            Ok(values
                .into_iter()
                .reduce(f64::min)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        BuiltinFn::Max => {
            let values = numeric_non_null(args)?;
            Ok(values
                .into_iter()
                .reduce(f64::max)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        BuiltinFn::CountAvailable => {
            let available = args.iter().filter(|v| !v.is_null()).count();
            Ok(Value::Number(available as f64))
        }
    }
}

/// Scalar builtin: null in, null out; bool is a type error.
fn scalar(arg: Value, f: impl FnOnce(f64) -> Result<f64, EvalError>) -> Result<Value, EvalError> {
    match arg {
        Value::Null => Ok(Value::Null),
        Value::Number(x) => Ok(Value::Number(f(x)?)),
        Value::Bool(_) => Err(EvalError::TypeMismatch {
            context: "function argument",
            expected: "number",
            found: "bool",
        }),
    }
}

/// Round half to even, with an optional digits argument.
fn builtin_round(args: &[Value]) -> Result<Value, EvalError> {
    let digits = match args.get(1) {
        None => 0i32,
        Some(Value::Null) => return Ok(Value::Null),
        Some(v) => {
            let d = v.as_number().ok_or(EvalError::TypeMismatch {
                context: "round digits",
                expected: "number",
                found: v.type_name(),
            })?;
            d as i32
        }
    };

    scalar(args[0], |x| {
        let factor = 10f64.powi(digits);
        Ok((x * factor).round_ties_even() / factor)
    })
}

/// Collect the numeric arguments, dropping nulls; bools are type errors.
fn numeric_non_null(args: &[Value]) -> Result<Vec<f64>, EvalError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Null => {}
            Value::Number(x) => values.push(*x),
            Value::Bool(_) => {
                return Err(EvalError::TypeMismatch {
                    context: "function argument",
                    expected: "number",
                    found: "bool",
                })
            }
        }
    }
    Ok(values)
}
