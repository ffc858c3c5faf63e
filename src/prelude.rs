//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use microcks_operator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (`Microcks`, `APISource`, `SecretSource`, `Test`, ...)
//! - The Microcks API seam (`RemoteInstanceApi`, `RemoteApiFactory`)
//! - Reconciler types (`Reconciler`, `ReconcilerError`, ...)
//! - The resource store and the defaulting composer

// CRD types - most commonly used
pub use crate::crd::*;

pub use crate::client::{
    MicrocksClient, MicrocksClientFactory, RemoteApiError, RemoteApiFactory, RemoteInstanceApi,
};

pub use crate::controller::reconciler::{
    BackoffState, Reconciler, ReconcilerError, WatchRegistry,
};

pub use crate::compose::{Composer, ComposeError, ResolvedSpec};
pub use crate::config::OperatorConfig;
pub use crate::store::{InMemoryStore, KubeStore, ResourceStore, StoreError};
pub use crate::workflow::{Module, ModuleResult, ModuleWorkflow};
