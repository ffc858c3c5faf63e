//! # Configuration
//!
//! Operator settings loaded from environment variables.

mod operator;

pub use operator::OperatorConfig;
