//! # Observability
//!
//! Prometheus metrics collection. Tracing is configured in
//! [`crate::runtime::initialization`].

pub mod metrics;

pub use metrics::*;
