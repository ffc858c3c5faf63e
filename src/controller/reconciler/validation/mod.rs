//! # Validation
//!
//! Input validation shared by the reconcilers.

mod duration;

pub use duration::parse_kubernetes_duration;
