//! # Controller
//!
//! Reconcilers, retry backoff and the probe/metrics HTTP server.

pub mod backoff;
pub mod reconciler;
pub mod server;
