//! Evaluator for scoring equations.
//!
//! Evaluation is pure and deterministic: the same program and input map
//! always produce the same value. Inputs arrive as a map from item
//! number to typed value; unanswered items are simply absent and read
//! as null.

use super::ast::{Expr, LogicOp, Program, Stmt};
use super::builtins::{call_builtin, BuiltinFn};
use super::value::{arithmetic, compare, EvalError, Value};
use std::collections::HashMap;

/// Evaluate a validated program. The program's value is the value of
/// its last statement.
pub fn eval_program(
    program: &Program,
    items: &HashMap<u32, Value>,
) -> Result<Value, EvalError> {
    let mut env: HashMap<&str, Value> = HashMap::new();
    let mut last = Value::Null;

    for stmt in &program.statements {
        last = match stmt {
            Stmt::Assign { name, expr, .. } => {
                let value = eval_expr(expr, items, &env)?;
                env.insert(name.as_str(), value);
                value
            }
            Stmt::Expr(expr) => eval_expr(expr, items, &env)?,
        };
    }

    Ok(last)
}

fn eval_expr(
    expr: &Expr,
    items: &HashMap<u32, Value>,
    env: &HashMap<&str, Value>,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Null => Ok(Value::Null),
        Expr::ItemRef { number, .. } => Ok(items.get(number).copied().unwrap_or(Value::Null)),
        Expr::Var { name, .. } => env
            .get(name.as_str())
            .copied()
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => {
            let value = eval_expr(inner, items, env)?;
            match value {
                Value::Null => Ok(Value::Null),
                Value::Number(n) => Ok(Value::Number(-n)),
                Value::Bool(_) => Err(EvalError::TypeMismatch {
                    context: "negation",
                    expected: "number",
                    found: "bool",
                }),
            }
        }
        Expr::Binary { op, left, right } => {
            let l = eval_expr(left, items, env)?;
            let r = eval_expr(right, items, env)?;
            arithmetic(*op, l, r)
        }
        Expr::Compare { op, left, right } => {
            let l = eval_expr(left, items, env)?;
            let r = eval_expr(right, items, env)?;
            compare(*op, l, r)
        }
        Expr::Logic { op, left, right } => {
            let l = eval_expr(left, items, env)?;
            match op {
                // Short-circuit; a null operand reads as false.
                LogicOp::And => {
                    if !l.is_truthy() {
                        Ok(Value::Bool(false))
                    } else {
                        Ok(Value::Bool(eval_expr(right, items, env)?.is_truthy()))
                    }
                }
                LogicOp::Or => {
                    if l.is_truthy() {
                        Ok(Value::Bool(true))
                    } else {
                        Ok(Value::Bool(eval_expr(right, items, env)?.is_truthy()))
                    }
                }
                // Strict: both sides always evaluate.
                LogicOp::Xor => {
                    let r = eval_expr(right, items, env)?;
                    Ok(Value::Bool(l.is_truthy() != r.is_truthy()))
                }
            }
        }
        Expr::Call { name, args, .. } => {
            let func = BuiltinFn::from_name(name)
                .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, items, env)?);
            }
            call_builtin(func, &values)
        }
        Expr::If { arms, else_expr } => {
            for (cond, body) in arms {
                // Null condition is false.
                if eval_expr(cond, items, env)?.is_truthy() {
                    return eval_expr(body, items, env);
                }
            }
            eval_expr(else_expr, items, env)
        }
    }
}
