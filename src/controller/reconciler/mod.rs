//! # Reconciler
//!
//! Reconciliation logic for every kind the operator manages.
//!
//! - `microcks`: converges a `Microcks` instance module by module
//! - `api_source`, `secret_source`: push content into a running instance
//! - `test_run`: launches and follows a remote test
//!
//! Satellites share the instance binding and auth broker (`binding`,
//! `auth`), remote item synchronization (`items`) and the finalizer and
//! status helpers.

pub mod api_source;
pub mod auth;
pub mod binding;
pub mod finalizer;
pub mod items;
pub mod microcks;
pub mod reconcile;
pub mod secret_source;
pub mod status;
pub mod test_run;
pub mod types;
pub mod validation;
pub mod watches;

// Re-export public API
pub use binding::{bind, resolve_instance, BoundInstance, InstanceReference};
pub use microcks::{apply_microcks, cleanup_microcks};
pub use types::{resource_key, BackoffState, Reconciler, ReconcilerError};
pub use watches::{WatchKey, WatchRegistry};
