//! # Reconcile Plumbing
//!
//! Span, metrics and status-writing helpers shared by the per-kind
//! reconcilers.

use crate::controller::reconciler::types::{resource_key, Reconciler, ReconcilerError};
use crate::crd::{ObservedItem, SourceStatus};
use crate::observability::metrics;
use crate::store::ResourceStore;
use kube::api::ApiResource;
use kube_runtime::controller::Action;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Run one reconcile under the `controller.reconcile` span with metrics
///
/// A successful pass clears the resource's error backoff.
pub async fn observe_reconcile<F>(
    ctx: &Reconciler,
    kind: &'static str,
    namespace: &str,
    name: &str,
    reconcile: F,
) -> Result<Action, ReconcilerError>
where
    F: Future<Output = Result<Action, ReconcilerError>>,
{
    let start = Instant::now();
    metrics::increment_reconciliations(kind);

    let span = info_span!(
        "controller.reconcile",
        resource.kind = kind,
        resource.name = name,
        resource.namespace = namespace
    );
    let result = reconcile.instrument(span).await;
    metrics::observe_reconciliation_duration(kind, start.elapsed().as_secs_f64());

    if result.is_ok() && ctx.reset_backoff(&resource_key(kind, namespace, name)) {
        info!(
            "🔄 Backoff reset for {} {}/{} after successful reconciliation",
            kind, namespace, name
        );
    }
    debug!(
        "Reconciled {} {}/{} in {:.2}s",
        kind,
        namespace,
        name,
        start.elapsed().as_secs_f64()
    );
    result
}

/// Record a taxonomy failure in the status and turn it into a requeue
///
/// Infrastructure failures are returned for the error policy instead.
pub fn requeue_for(ctx: &Reconciler, error: ReconcilerError) -> Result<Action, ReconcilerError> {
    if error.is_infrastructure() {
        return Err(error);
    }
    metrics::increment_requeues(error.reason());
    Ok(error.requeue_action(&ctx.config))
}

/// Patch the status subresource with the full status
///
/// # Errors
///
/// Returns an error if serialization or the patch fails.
pub async fn write_status<S: Serialize>(
    store: &dyn ResourceStore,
    kind: &ApiResource,
    name: &str,
    namespace: &str,
    status: &S,
) -> Result<(), ReconcilerError> {
    let value = serde_json::to_value(status)?;
    store.patch_status(kind, name, namespace, &value).await?;
    Ok(())
}

/// Status of a source kind as a merge patch
///
/// Keys dropped from `observedState` are sent as `null` so the merge patch
/// removes them.
///
/// # Errors
///
/// Returns an error if the status cannot be serialized.
pub fn source_status_patch(
    previous: &BTreeMap<String, ObservedItem>,
    status: &SourceStatus,
) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(status)?;
    if let Some(Value::Object(observed)) = value.get_mut("observedState") {
        for key in previous.keys() {
            if !status.observed_state.contains_key(key) {
                observed.insert(key.clone(), Value::Null);
            }
        }
    }
    Ok(value)
}

/// Write a source status, removing dropped `observedState` entries
///
/// # Errors
///
/// Returns an error if serialization or the patch fails.
pub async fn write_source_status(
    store: &dyn ResourceStore,
    kind: &ApiResource,
    name: &str,
    namespace: &str,
    previous: &BTreeMap<String, ObservedItem>,
    status: &SourceStatus,
) -> Result<(), ReconcilerError> {
    let value = source_status_patch(previous, status)?;
    store.patch_status(kind, name, namespace, &value).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_observed_items_become_null() {
        let item = ObservedItem {
            collection: "secrets".to_string(),
            remote_id: "1".to_string(),
        };
        let previous: BTreeMap<String, ObservedItem> = [
            ("kept".to_string(), item.clone()),
            ("dropped".to_string(), item.clone()),
        ]
        .into_iter()
        .collect();
        let mut status = SourceStatus::default();
        status.observed_state.insert("kept".to_string(), item);

        let patch = source_status_patch(&previous, &status).unwrap();
        assert_eq!(patch["observedState"]["dropped"], Value::Null);
        assert_eq!(patch["observedState"]["kept"]["remoteId"], "1");
    }
}
