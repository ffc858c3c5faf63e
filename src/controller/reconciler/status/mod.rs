//! # Status
//!
//! Condition tracking and readiness aggregation.

pub mod aggregate;
pub mod conditions;

pub use aggregate::{aggregate, handle_result};
pub use conditions::{get_or_create, is_ready, touch, upsert_and_timestamp};
