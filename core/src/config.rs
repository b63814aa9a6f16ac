//! Tunables for the analytics core.

use crate::cohort::AggregationKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs with their shipped defaults. Constructed by the host process;
/// the core never reads the environment itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Statistic used when a caller does not specify one.
    pub aggregation_default: AggregationKind,
    /// TTL of patient-scoped cache entries.
    pub cache_ttl_patient: Duration,
    /// TTL of population-aggregate cache entries.
    pub cache_ttl_population: Duration,
    /// Below this bucket size, confidence intervals are not computed.
    pub cohort_min_samples: usize,
    /// Relative-change cut used when neither MID nor normative SD is
    /// calibrated.
    pub change_fallback_ratio: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            aggregation_default: AggregationKind::MedianIqr,
            cache_ttl_patient: Duration::from_secs(300),
            cache_ttl_population: Duration::from_secs(3600),
            cohort_min_samples: 8,
            change_fallback_ratio: 0.10,
        }
    }
}
