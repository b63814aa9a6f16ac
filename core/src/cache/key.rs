//! Cache key construction.
//!
//! Keys are namespaced by family and patient token and carry a version
//! segment, so invalidation is a counter bump rather than a wildcard
//! delete. Digests are computed over a canonicalized representation:
//! object keys sorted, numbers in fixed `%.6` formatting. Patient ids
//! in keys are opaque uuid tokens, never free-text identifiers.

use crate::cohort::{AggregateTarget, AggregationKind};
use crate::domain::{CompositeScaleId, ConstructScaleId, ItemId, PatientId};
use crate::intervals::FilterContext;
use crate::store::CohortPredicates;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Stable hex digest (truncated to 128 bits) of any serializable input.
pub fn canonical_digest<T: Serialize>(input: &T) -> String {
    let value = serde_json::to_value(input).unwrap_or(serde_json::Value::Null);
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        serde_json::Value::Number(n) => {
            // Fixed formatting so 1, 1.0 and 0.999999999... digests
            // agree across writers.
            if let Some(i) = n.as_i64() {
                let _ = write!(out, "{:.6}", i as f64);
            } else {
                let _ = write!(out, "{:.6}", n.as_f64().unwrap_or(0.0));
            }
        }
        serde_json::Value::String(s) => {
            let _ = write!(out, "{s:?}");
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{key:?}:");
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

/// Digest of a filter context, shared by every patient-scoped family.
pub fn filter_hash(ctx: &FilterContext) -> String {
    canonical_digest(ctx)
}

/// `agg:*`: population aggregate, keyed under the global version.
pub fn population_aggregate(
    version: u64,
    target: AggregateTarget,
    ctx: &FilterContext,
    predicates: &CohortPredicates,
    kind: AggregationKind,
    index_patient: PatientId,
) -> String {
    let digest = canonical_digest(&(target, ctx, predicates, kind, index_patient));
    format!("agg:v{version}:{digest}")
}

/// `pscores:*`: one patient's construct series.
pub fn patient_scores(
    version: u64,
    patient: PatientId,
    construct: ConstructScaleId,
    filter_hash: &str,
) -> String {
    format!("pscores:v{version}:{patient}:{construct}:{filter_hash}")
}

/// `pitem:*`: one patient's item series.
pub fn patient_item(
    version: u64,
    patient: PatientId,
    item: ItemId,
    filter_hash: &str,
) -> String {
    format!("pitem:v{version}:{patient}:{item}:{filter_hash}")
}

/// `pcomp:*`: one patient's composite series.
pub fn patient_composite(
    version: u64,
    patient: PatientId,
    composite: CompositeScaleId,
    filter_hash: &str,
) -> String {
    format!("pcomp:v{version}:{patient}:{composite}:{filter_hash}")
}
