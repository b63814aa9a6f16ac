//! Memoization layer for computed results.
//!
//! Two key families with different TTLs and invalidation scopes:
//! population aggregates (`agg:*`, invalidated globally on any
//! submission write) and patient-scoped series (`pscores:*`, `pitem:*`,
//! `pcomp:*`, invalidated per patient). Instead of wildcard deletes,
//! every key embeds a version counter; invalidation bumps the counter
//! and the old generation ages out by TTL.
//!
//! The backend is a capability: tests substitute [`MemoryCache`] or
//! [`FailingCache`], production substitutes a shared key-value client.
//! Backend failures never fail a computation; reads pass through.

pub mod key;
pub mod memory;
pub mod single_flight;

pub use memory::{FailingCache, MemoryCache};
pub use single_flight::{JoinOutcome, SingleFlight};

use crate::domain::PatientId;
use crate::engine::Deadline;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cache backend failure: {detail}")]
pub struct CacheError {
    pub detail: String,
}

impl CacheError {
    pub fn backend(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Key-value cache capability.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// Versioned, single-flight read-through layer over a [`Cache`]
/// backend.
pub struct CacheLayer {
    backend: Arc<dyn Cache>,
    patient_versions: DashMap<PatientId, u64>,
    population_version: AtomicU64,
    flights: SingleFlight,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn Cache>) -> Self {
        Self {
            backend,
            patient_versions: DashMap::new(),
            population_version: AtomicU64::new(0),
            flights: SingleFlight::new(),
        }
    }

    /// Current version of a patient's namespace; part of every
    /// patient-scoped key.
    pub fn patient_version(&self, patient: PatientId) -> u64 {
        self.patient_versions
            .get(&patient)
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Flush a patient's namespace. Only that patient's keys move to a
    /// new generation.
    pub fn invalidate_patient(&self, patient: PatientId) {
        *self.patient_versions.entry(patient).or_insert(0) += 1;
    }

    pub fn population_version(&self) -> u64 {
        self.population_version.load(Ordering::Acquire)
    }

    /// Flush every `agg:*` entry.
    pub fn invalidate_population(&self) {
        self.population_version.fetch_add(1, Ordering::AcqRel);
    }

    /// Read-through with single-flight coalescing.
    ///
    /// Backend failures degrade to direct computation. A follower whose
    /// leader failed computes for itself; a follower whose deadline
    /// expires gets `deadline_error` and nothing is cached.
    pub fn get_or_compute<T, E, F>(
        &self,
        cache_key: &str,
        ttl: Duration,
        deadline: Deadline,
        mut compute: F,
        deadline_error: impl FnOnce() -> E,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Result<T, E>,
    {
        if let Some(cached) = self.backend_get(cache_key) {
            match serde_json::from_str(&cached) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(key = cache_key, error = %err, "discarding undecodable cache entry");
                }
            }
        }

        match self.flights.join(cache_key, deadline) {
            JoinOutcome::Leader(guard) => match compute() {
                Ok(value) => {
                    match serde_json::to_string(&value) {
                        Ok(json) => {
                            self.backend_put(cache_key, &json, ttl);
                            guard.complete(Some(json));
                        }
                        Err(err) => {
                            warn!(key = cache_key, error = %err, "result not cacheable");
                            guard.complete(None);
                        }
                    }
                    Ok(value)
                }
                Err(err) => {
                    guard.complete(None);
                    Err(err)
                }
            },
            JoinOutcome::Follower(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => Ok(value),
                Err(_) => compute(),
            },
            JoinOutcome::Follower(None) => compute(),
            JoinOutcome::TimedOut => Err(deadline_error()),
        }
    }

    fn backend_get(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "cache read failed; computing directly");
                None
            }
        }
    }

    fn backend_put(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(err) = self.backend.put(key, value, ttl) {
            warn!(key, error = %err, "cache write failed; result not memoized");
        }
    }
}
