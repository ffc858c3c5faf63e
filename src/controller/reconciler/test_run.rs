//! # Test Reconciler
//!
//! Drives a `Test` through its remote run:
//!
//! - **Unstarted** (no `status.id`): launch the run and record its id
//! - **InProgress** (`Deploying`): poll until the run finishes
//! - **Completed** (`Ready`): apply the retention policy
//!
//! Every wait is a requeue. Recording the outcome and applying retention
//! happen in separate passes so the outcome is persisted before any delete.

use crate::client::{OperationState, RemoteApiError, TestRequest};
use crate::controller::reconciler::binding::{bind, BoundInstance};
use crate::controller::reconciler::finalizer::{ensure_finalizer, is_deleting, remove_finalizer};
use crate::controller::reconciler::reconcile::{observe_reconcile, requeue_for, write_status};
use crate::controller::reconciler::status::upsert_and_timestamp;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::parse_kubernetes_duration;
use crate::crd::{HasConditions, RetentionPolicy, Status, Test, TestResult, TestSpec, TestStatus};
use crate::observability::metrics;
use crate::store::kinds;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const KIND: &str = "Test";

/// Condition recording the outcome of the run
pub const COMPLETED_CONDITION: &str = "TestCompleted";

/// Position of a `Test` in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unstarted,
    InProgress,
    Completed,
}

#[must_use]
pub fn phase(status: Option<&TestStatus>) -> Phase {
    match status {
        Some(status) if status.id.is_some() => {
            if status.status == Status::Ready {
                Phase::Completed
            } else {
                Phase::InProgress
            }
        }
        _ => Phase::Unstarted,
    }
}

/// Whether a completed `Test` is deleted under its retention policy
#[must_use]
pub fn should_delete(policy: RetentionPolicy, result: TestResult) -> bool {
    match policy {
        RetentionPolicy::Retain => false,
        RetentionPolicy::Delete => true,
        RetentionPolicy::DeleteOnSuccess => result == TestResult::Success,
    }
}

#[must_use]
pub fn outcome(state: OperationState) -> TestResult {
    if state.success {
        TestResult::Success
    } else {
        TestResult::Failure
    }
}

/// Launch request for a `Test`
///
/// # Errors
///
/// `Validation` when the timeout is not a valid duration.
pub fn test_request(spec: &TestSpec) -> Result<TestRequest, ReconcilerError> {
    let timeout = parse_kubernetes_duration(&spec.timeout)
        .map_err(|e| ReconcilerError::Validation(format!("Invalid 'spec.timeout': {e}")))?;
    Ok(TestRequest {
        service_id: spec.service_id.clone(),
        test_endpoint: spec.test_endpoint.clone(),
        runner_type: spec.runner_type.as_str().to_string(),
        timeout: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        secret_name: spec.secret_name.clone(),
        filtered_operations: spec.filtered_operations.clone(),
    })
}

/// Result page of a run in the Microcks UI
#[must_use]
pub fn test_url(microcks_url: &str, id: &str) -> String {
    format!("{}/#/tests/{}", microcks_url.trim_end_matches('/'), id)
}

pub async fn reconcile(test: Arc<Test>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = test.name_any();
    let namespace = test.namespace().unwrap_or_default();
    observe_reconcile(&ctx, KIND, &namespace, &name, async {
        if is_deleting(&test.metadata) {
            cleanup(&test, &ctx).await
        } else {
            apply(&test, &ctx).await
        }
    })
    .await
}

async fn apply(test: &Test, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    match phase(test.status.as_ref()) {
        Phase::Completed => apply_retention(test, ctx).await,
        Phase::Unstarted => {
            ensure_finalizer(ctx.store.as_ref(), &kinds::test(), &test.metadata).await?;
            launch(test, ctx).await
        }
        Phase::InProgress => poll(test, ctx).await,
    }
}

async fn launch(test: &Test, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let mut status = test.status.clone().unwrap_or_default();
    status.observed_generation = test.metadata.generation;

    let launched = async {
        let request = test_request(&test.spec)?;
        let bound = bind(&test.metadata, ctx).await?;
        let id = bound.api.submit_operation(&bound.token, &request).await?;
        Ok::<(String, BoundInstance), ReconcilerError>((id, bound))
    }
    .await;

    match launched {
        Ok((id, bound)) => {
            info!(
                "🧪 Launched test {} of '{}' against {} (id: {})",
                test.name_any(),
                test.spec.service_id,
                test.spec.test_endpoint,
                id
            );
            status.url = bound.microcks_url().map(|url| test_url(url, &id));
            status.id = Some(id);
            status.result = TestResult::Unknown;
            status.set_status(Status::Deploying, Some("Test in progress".to_string()));
            write(ctx, test, &status).await?;
            Ok(Action::requeue(ctx.config.test_poll_interval()))
        }
        Err(e) if e.is_infrastructure() => Err(e),
        Err(e) => {
            warn!("Cannot launch test {}: {}", test.name_any(), e);
            status.set_status(Status::Error, Some(e.to_string()));
            write(ctx, test, &status).await?;
            requeue_for(ctx, e)
        }
    }
}

async fn poll(test: &Test, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let mut status = test.status.clone().unwrap_or_default();
    let Some(id) = status.id.clone() else {
        return launch(test, ctx).await;
    };

    let polled = async {
        let bound = bind(&test.metadata, ctx).await?;
        Ok::<_, ReconcilerError>(bound.api.poll_operation(&bound.token, &id).await)
    }
    .await;

    match polled {
        Ok(Ok(state)) if state.in_progress => {
            debug!("Test {} (id: {}) still running", test.name_any(), id);
            if status.status != Status::Deploying {
                status.set_status(Status::Deploying, Some("Test in progress".to_string()));
                write(ctx, test, &status).await?;
            }
            Ok(Action::requeue(ctx.config.test_poll_interval()))
        }
        Ok(Ok(state)) => {
            let result = outcome(state);
            let label = match result {
                TestResult::Success => "success",
                _ => "failure",
            };
            info!("🧪 Test {} (id: {}) completed: {}", test.name_any(), id, label);
            complete(test, ctx, status, result, format!("Test {id} completed with {label}")).await
        }
        Ok(Err(RemoteApiError::NotFound(_))) => {
            // Purged remotely or the instance lost its database; nothing left to wait for
            warn!("Remote test {} of {} no longer exists", id, test.name_any());
            complete(
                test,
                ctx,
                status,
                TestResult::Failure,
                format!("remote test {id} no longer exists"),
            )
            .await
        }
        Ok(Err(e)) => poll_failed(test, ctx, status, &id, e.into()).await,
        Err(e) if e.is_infrastructure() => Err(e),
        Err(e) => poll_failed(test, ctx, status, &id, e).await,
    }
}

/// Record the outcome and schedule the retention pass
async fn complete(
    test: &Test,
    ctx: &Reconciler,
    mut status: TestStatus,
    result: TestResult,
    message: String,
) -> Result<Action, ReconcilerError> {
    let label = if result == TestResult::Success { "success" } else { "failure" };
    metrics::increment_tests_completed(label);

    status.result = result;
    status.set_status(Status::Ready, Some(message.clone()));
    upsert_and_timestamp(
        &mut status,
        COMPLETED_CONDITION,
        Status::Ready,
        Some(if result == TestResult::Success { "Success" } else { "Failure" }),
        Some(message),
    );
    write(ctx, test, &status).await?;
    Ok(Action::requeue(ctx.config.retention_check_delay()))
}

/// Keep the phase; the run may still be progressing remotely
async fn poll_failed(
    test: &Test,
    ctx: &Reconciler,
    mut status: TestStatus,
    id: &str,
    e: ReconcilerError,
) -> Result<Action, ReconcilerError> {
    warn!("Cannot poll test {} (id: {}): {}", test.name_any(), id, e);
    status.message = Some(format!("Polling failed: {e}"));
    write(ctx, test, &status).await?;
    requeue_for(ctx, e)
}

async fn apply_retention(test: &Test, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let result = test.status.as_ref().map_or(TestResult::Unknown, |s| s.result);
    if !should_delete(test.spec.retention_policy, result) {
        return Ok(Action::await_change());
    }

    info!(
        "Deleting completed test {} ({:?} policy, result {:?})",
        test.name_any(),
        test.spec.retention_policy,
        result
    );
    ctx.store
        .delete(
            &kinds::test(),
            &test.name_any(),
            &test.namespace().unwrap_or_default(),
        )
        .await?;
    Ok(Action::await_change())
}

async fn write(ctx: &Reconciler, test: &Test, status: &TestStatus) -> Result<(), ReconcilerError> {
    write_status(
        ctx.store.as_ref(),
        &kinds::test(),
        &test.name_any(),
        &test.namespace().unwrap_or_default(),
        status,
    )
    .await
}

async fn cleanup(test: &Test, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if phase(test.status.as_ref()) == Phase::InProgress {
        if let Some(id) = test.status.as_ref().and_then(|s| s.id.as_deref()) {
            match bind(&test.metadata, ctx).await {
                Ok(bound) => {
                    if let Err(e) = bound.api.delete_operation(&bound.token, id).await {
                        warn!("Failed to cancel test {} (id: {}): {}", test.name_any(), id, e);
                    }
                }
                Err(e) => debug!("Skipping remote cancellation of test {}: {}", test.name_any(), e),
            }
        }
    }

    remove_finalizer(ctx.store.as_ref(), &kinds::test(), &test.metadata).await?;
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TestRunnerType;

    fn status(id: Option<&str>, value: Status) -> TestStatus {
        TestStatus {
            id: id.map(str::to_string),
            status: value,
            ..TestStatus::default()
        }
    }

    #[test]
    fn test_phase_derivation() {
        assert_eq!(phase(None), Phase::Unstarted);
        assert_eq!(phase(Some(&status(None, Status::Error))), Phase::Unstarted);
        assert_eq!(phase(Some(&status(Some("t1"), Status::Deploying))), Phase::InProgress);
        assert_eq!(phase(Some(&status(Some("t1"), Status::Ready))), Phase::Completed);
    }

    #[test]
    fn test_retention() {
        assert!(should_delete(RetentionPolicy::DeleteOnSuccess, TestResult::Success));
        assert!(!should_delete(RetentionPolicy::DeleteOnSuccess, TestResult::Failure));
        assert!(should_delete(RetentionPolicy::Delete, TestResult::Failure));
        assert!(!should_delete(RetentionPolicy::Retain, TestResult::Success));
    }

    #[test]
    fn test_request_converts_timeout() {
        let spec = TestSpec {
            service_id: "Pastry API:1.0.0".to_string(),
            test_endpoint: "http://pastry:8080".to_string(),
            runner_type: TestRunnerType::OpenApiSchema,
            timeout: "1m30s".to_string(),
            ..TestSpec::default()
        };
        let request = test_request(&spec).unwrap();
        assert_eq!(request.timeout, 90_000);
        assert_eq!(request.runner_type, "OPEN_API_SCHEMA");
    }

    #[test]
    fn test_invalid_timeout_is_validation_error() {
        let spec = TestSpec {
            timeout: "soon".to_string(),
            ..TestSpec::default()
        };
        assert!(matches!(test_request(&spec), Err(ReconcilerError::Validation(_))));
    }

    #[test]
    fn test_url_format() {
        assert_eq!(
            test_url("https://microcks.example.com/", "abc"),
            "https://microcks.example.com/#/tests/abc"
        );
    }
}
