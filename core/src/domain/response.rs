//! Typed-response classification.
//!
//! Raw responses are stored as strings; everything downstream wants a
//! numeric-or-null [`Value`]. Classification happens once, here, at the
//! boundary; the evaluator never dispatches on response types.

use super::entities::{Item, LikertScale, ResponseType};
use crate::equation::Value;
use tracing::warn;

/// Classify a raw response into an evaluation input.
///
/// `raw` of `None` (or an empty string) means the item was unanswered:
/// the item's registered `missing_value` applies when declared,
/// otherwise the input is null. Text items are always null for scoring.
/// Malformed numerics and undeclared Likert choices classify as null
/// and emit an observability event.
pub fn classify_response(item: &Item, likert: Option<&LikertScale>, raw: Option<&str>) -> Value {
    let raw = match raw {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => {
            return item
                .missing_value
                .map(Value::Number)
                .unwrap_or(Value::Null);
        }
    };

    match item.response_type {
        ResponseType::Text => Value::Null,
        ResponseType::Number | ResponseType::Range => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => {
                warn!(item = %item.id, value = raw, "unparseable numeric response");
                Value::Null
            }
        },
        ResponseType::Likert => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => {
                let option_value = n as i64;
                let known = likert
                    .map(|scale| scale.has_option_value(option_value))
                    .unwrap_or(true);
                if known && (option_value as f64 - n).abs() < 1e-9 {
                    Value::Number(n)
                } else {
                    warn!(item = %item.id, value = raw, "likert response matches no option");
                    Value::Null
                }
            }
            _ => {
                warn!(item = %item.id, value = raw, "unparseable likert response");
                Value::Null
            }
        },
    }
}
