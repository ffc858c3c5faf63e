//! # Types
//!
//! Core types for the reconcilers.

use crate::client::{RemoteApiError, RemoteApiFactory};
use crate::compose::{ComposeError, Composer};
use crate::config::OperatorConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::watches::WatchRegistry;
use crate::store::{ResourceStore, StoreError};
use crate::workflow::ModuleWorkflow;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Reconciliation failures
///
/// Taxonomy variants are recorded in the resource status and mapped to a
/// requeue with [`ReconcilerError::requeue_action`]. `Store` and
/// `Serialization` are infrastructure failures handed to the error policy.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotReady(String),
    #[error("{0}")]
    UnsatisfiedRequirement(String),
    #[error("Microcks API error: {0}")]
    RemoteApi(String),
    #[error("{0}")]
    TransientIo(String),
    #[error("Resource store error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Compose(#[from] ComposeError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcilerError {
    /// Requeue decision for this failure
    #[must_use]
    pub fn requeue_action(&self, config: &OperatorConfig) -> Action {
        match self {
            ReconcilerError::Validation(_) | ReconcilerError::Compose(_) => Action::await_change(),
            ReconcilerError::NotFound(_)
            | ReconcilerError::RemoteApi(_)
            | ReconcilerError::TransientIo(_) => Action::requeue(config.transient_requeue()),
            ReconcilerError::NotReady(_) => Action::requeue(config.not_ready_requeue()),
            ReconcilerError::UnsatisfiedRequirement(_) => {
                Action::requeue(config.unsatisfied_requeue())
            }
            ReconcilerError::Store(_) | ReconcilerError::Serialization(_) => {
                Action::requeue(config.reconciliation_error_requeue())
            }
        }
    }

    /// Infrastructure failures go to the error policy instead of the status
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ReconcilerError::Store(_) | ReconcilerError::Serialization(_)
        )
    }

    /// Short label used for the requeue metric
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Validation(_) => "validation",
            ReconcilerError::NotFound(_) => "not-found",
            ReconcilerError::NotReady(_) => "not-ready",
            ReconcilerError::UnsatisfiedRequirement(_) => "unsatisfied-requirement",
            ReconcilerError::RemoteApi(_) => "remote-api",
            ReconcilerError::TransientIo(_) => "transient-io",
            ReconcilerError::Store(_) => "store",
            ReconcilerError::Compose(_) => "compose",
            ReconcilerError::Serialization(_) => "serialization",
        }
    }
}

impl From<RemoteApiError> for ReconcilerError {
    fn from(error: RemoteApiError) -> Self {
        match error {
            RemoteApiError::Transport(e) => ReconcilerError::TransientIo(e.to_string()),
            other => ReconcilerError::RemoteApi(other.to_string()),
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconciliation context of every controller
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ResourceStore>,
    pub remote: Arc<dyn RemoteApiFactory>,
    pub composer: Composer,
    pub workflows: Arc<Vec<ModuleWorkflow>>,
    pub watches: Arc<WatchRegistry>,
    pub config: Arc<OperatorConfig>,
    // Backoff state per resource (identified by kind/namespace/name)
    // Owned by the error policy; reset on successful reconciliations
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("composer", &self.composer)
            .field("workflows", &self.workflows.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ResourceStore>,
        remote: Arc<dyn RemoteApiFactory>,
        composer: Composer,
        watches: Arc<WatchRegistry>,
        config: Arc<OperatorConfig>,
    ) -> Self {
        Self {
            store,
            remote,
            composer,
            workflows: Arc::new(crate::modules::workflows()),
            watches,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Lock the backoff table, recovering from a poisoned lock
    pub fn backoff_states(&self) -> MutexGuard<'_, HashMap<String, BackoffState>> {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the backoff of a resource after a successful reconciliation
    ///
    /// Returns whether the resource was backing off.
    pub fn reset_backoff(&self, resource_key: &str) -> bool {
        match self.backoff_states().get_mut(resource_key) {
            Some(state) => {
                let had_errors = state.error_count > 0;
                state.reset();
                had_errors
            }
            None => false,
        }
    }
}

/// Key identifying a resource in the backoff table
#[must_use]
pub fn resource_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind}/{namespace}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_mapping() {
        let config = OperatorConfig::default();
        assert_eq!(
            ReconcilerError::Validation("bad".into()).requeue_action(&config),
            Action::await_change()
        );
        assert_eq!(
            ReconcilerError::NotReady("wait".into()).requeue_action(&config),
            Action::requeue(config.not_ready_requeue())
        );
        assert_eq!(
            ReconcilerError::UnsatisfiedRequirement("creds".into()).requeue_action(&config),
            Action::requeue(config.unsatisfied_requeue())
        );
        assert_eq!(
            ReconcilerError::RemoteApi("500".into()).requeue_action(&config),
            Action::requeue(config.transient_requeue())
        );
    }

    #[test]
    fn test_infrastructure_classification() {
        let err = ReconcilerError::Store(StoreError::Invalid("x".into()));
        assert!(err.is_infrastructure());
        assert!(!ReconcilerError::NotFound("x".into()).is_infrastructure());
    }

    #[test]
    fn test_remote_errors_are_retryable() {
        let err: ReconcilerError = RemoteApiError::Http {
            status: 500,
            message: "boom".into(),
        }
        .into();
        assert!(matches!(err, ReconcilerError::RemoteApi(_)));
    }
}
