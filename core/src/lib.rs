//! PRO analytics core.
//!
//! This crate implements the computation core of a patient-reported
//! outcomes platform: construct-scoring equations, composite scores,
//! time-bucketed cohort aggregation, clinical-significance
//! classification, and the caching layer that keeps repeat reads cheap.
//!
//! Transport, rendering, and authentication live elsewhere; the crate
//! consumes a read-only [`store::ResponseStore`] and exposes plain data.

pub mod cache;
pub mod cohort;
pub mod config;
pub mod domain;
pub mod engine;
pub mod equation;
pub mod interpret;
pub mod intervals;
pub mod scores;
pub mod scoring;
pub mod stats;
pub mod store;

pub use config::CoreConfig;
pub use engine::{AnalyticsEngine, CoreError, Deadline};
