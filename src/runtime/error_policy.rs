//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.
//! Handles infrastructure failures returned by a reconcile and errors on
//! the watch streams themselves.

use crate::controller::reconciler::{resource_key, BackoffState, Reconciler, ReconcilerError};
use crate::observability::metrics;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle a failed reconcile with a per-resource Fibonacci backoff
///
/// Backoff state is keyed by kind, namespace and name so one failing
/// resource never slows down the retries of another. A successful
/// reconcile resets it.
pub fn handle_reconciliation_error<K>(
    kind: &'static str,
    obj: &Arc<K>,
    error: &ReconcilerError,
    ctx: &Arc<Reconciler>,
) -> Action
where
    K: Resource,
{
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = kind,
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {} {}/{}: {:?}", kind, namespace, name, error);
    metrics::increment_reconciliation_errors(kind);

    let (backoff_seconds, error_count) = {
        let mut states = ctx.backoff_states();
        let state = states
            .entry(resource_key(kind, &namespace, &name))
            .or_insert_with(|| {
                BackoffState::new(
                    ctx.config.error_backoff_min_secs,
                    ctx.config.error_backoff_max_secs,
                )
            });
        state.increment_error();
        (state.backoff.next_backoff_seconds(), state.error_count)
    };

    let next_trigger_time =
        chrono::Utc::now() + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: error-backoff)",
        backoff_seconds, error_count
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s, trigger source: error-backoff)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    metrics::increment_requeues("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Watch failure classes that get a dedicated handling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    NotFound,
    Unauthorized,
    Expired,
    TooManyRequests,
    Other,
}

/// Classify a watch stream error from its debug rendering
///
/// Not-found is checked first: a plain-text 404 body surfaces as a decode
/// error that also mentions `WatchFailed`.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorClass::NotFound;
    }
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        return WatchErrorClass::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorClass::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorClass::TooManyRequests;
    }
    WatchErrorClass::Other
}

/// Handle watch stream errors with classification and backoff
///
/// Returns `None` to filter the error out of the stream (the watcher
/// recovers on its own) or `Some(())` to pass it through.
pub async fn handle_watch_stream_error(
    kind: &str,
    error_string: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        resource.kind = kind,
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorClass::Unauthorized => {
            error!(
                "❌ Watch on {} failed (401 Unauthorized) - RBAC may have been revoked or token expired",
                kind
            );
            error!("🔍 Diagnostics:");
            error!("   1. Verify the operator ClusterRole still grants list/watch on {}:", kind);
            error!("      kubectl get clusterrole microcks-operator -o yaml");
            error!("   2. Verify the ClusterRoleBinding still binds the ServiceAccount:");
            error!("      kubectl get clusterrolebinding microcks-operator -o yaml");
            error!("   3. If RBAC was recently changed, restart the operator pod");
            warn!(
                "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay_secs
            );
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
        WatchErrorClass::Expired => {
            warn!(
                "Watch resource version on {} expired (410), watch will restart",
                kind
            );
            warn!(error_type = "410", "watch.error.resource_version_expired");
            None
        }
        WatchErrorClass::TooManyRequests => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off {} watch for {}ms...",
                kind, current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            backoff.store(
                current_backoff.saturating_mul(2).min(max_backoff_ms),
                Ordering::Relaxed,
            );
            None
        }
        WatchErrorClass::NotFound => {
            let resource_info = if error_string.contains("integer `404`") {
                "CRD or resource may have been deleted (404 returned as plain text)"
            } else {
                "Resource"
            };
            warn!(
                "{} not found (404) while watching {} - normal if it was deleted or the CRD is missing. Error: {}",
                resource_info, kind, error_string
            );
            Some(())
        }
        WatchErrorClass::Other => {
            error!("Controller stream error on {}: {}", kind, error_string);
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            classify_watch_error("WatchFailed(Api(ErrorResponse { code: 404 }))"),
            WatchErrorClass::NotFound
        );
        assert_eq!(
            classify_watch_error("Api(ErrorResponse { reason: \"Unauthorized\", code: 401 })"),
            WatchErrorClass::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorClass::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorClass::TooManyRequests
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorClass::Other);
    }

    #[tokio::test]
    async fn test_too_many_requests_doubles_backoff_up_to_max() {
        let backoff = AtomicU64::new(1);
        assert!(handle_watch_stream_error("Microcks", "429", &backoff, 3, 0).await.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 2);
        handle_watch_stream_error("Microcks", "429", &backoff, 3, 0).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_not_found_passes_through() {
        let backoff = AtomicU64::new(1);
        assert!(handle_watch_stream_error("Test", "ObjectNotFound", &backoff, 3, 0)
            .await
            .is_some());
    }
}
