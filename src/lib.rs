//! Microcks Operator Library
//!
//! Kubernetes operator that installs and converges Microcks instances and
//! drives their REST API from declarative `APISource`, `SecretSource` and
//! `Test` resources.
//!
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use microcks_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod client;
pub mod compose;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod modules;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
pub mod workflow;
