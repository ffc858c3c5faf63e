//! # Microcks Reconciler
//!
//! Top-level orchestration of a `Microcks` instance.
//!
//! ## Reconciliation Flow
//!
//! 1. Resolve `spec` against the defaulting cascade
//! 2. Resolve the exposition and record the public URLs
//! 3. Run the module workflows in order (Keycloak, Mongo, Microcks, Postman,
//!    AsyncMinion) and record each outcome in conditions
//! 4. Converge the Strimzi broker when Kafka is installed, and watch it
//! 5. Aggregate the global status and patch it
//!
//! Module failures are isolated: a failing database producer does not stop
//! the core module from converging.

use crate::compose::ResolvedSpec;
use crate::controller::reconciler::finalizer::{ensure_finalizer, is_deleting, remove_finalizer};
use crate::controller::reconciler::reconcile::{observe_reconcile, requeue_for, write_status};
use crate::controller::reconciler::status::{aggregate, conditions::find, handle_result};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{HasConditions, Microcks, MicrocksStatus, Status};
use crate::modules::broker::{broker_objects, desired_broker};
use crate::modules::exposition::resolve_exposition;
use crate::observability::metrics;
use crate::store::{kinds, UpdatePolicy};
use crate::workflow::Module;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const KIND: &str = "Microcks";

pub async fn reconcile(primary: Arc<Microcks>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = primary.name_any();
    let namespace = primary.namespace().unwrap_or_default();
    observe_reconcile(&ctx, KIND, &namespace, &name, async {
        if is_deleting(&primary.metadata) {
            cleanup_microcks(&primary, &ctx).await
        } else {
            apply_microcks(&primary, &ctx).await
        }
    })
    .await
}

/// Converge an instance and report its status
///
/// # Errors
///
/// Only infrastructure failures (status patch, finalizer) are returned;
/// everything else is recorded in the status.
pub async fn apply_microcks(primary: &Microcks, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = primary.name_any();
    let namespace = primary.namespace().unwrap_or_default();
    ensure_finalizer(ctx.store.as_ref(), &kinds::microcks(), &primary.metadata).await?;

    let mut status = primary.status.clone().unwrap_or_default();
    status.observed_generation = primary.metadata.generation;

    let resolved = match ctx.composer.resolve(&primary.spec) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("Cannot resolve spec of {}/{}: {}", namespace, name, e);
            status.set_status(Status::Error, Some(e.to_string()));
            write(ctx, primary, &status).await?;
            return requeue_for(ctx, ReconcilerError::Compose(e));
        }
    };

    let exposition = match resolve_exposition(&resolved, &name, &namespace) {
        Ok(exposition) => exposition,
        Err(e) => {
            warn!("Invalid exposition of {}/{}: {}", namespace, name, e);
            status.set_status(Status::Error, Some(e.to_string()));
            write(ctx, primary, &status).await?;
            return requeue_for(ctx, ReconcilerError::Validation(e.to_string()));
        }
    };
    status.microcks_url = exposition.microcks_url.clone();
    status.keycloak_url = exposition.keycloak_url.clone();
    status.exposition = Some(exposition.mode.as_str().to_string());
    let resolved = resolved.with_exposition(exposition);

    let mut installed = Vec::new();
    for workflow in ctx.workflows.iter() {
        let result = workflow.reconcile(ctx.store.as_ref(), &resolved, primary).await;
        if result.installed {
            installed.push(result.module);
        }
        if result.has_errors() {
            warn!(
                "Module {} of {}/{} has failing resources: {}",
                result.module,
                namespace,
                name,
                result.error_summary()
            );
        }
        handle_result(&mut status, &result);
    }

    let broker_error = if resolved.kafka_installed() {
        converge_broker(ctx, &resolved, primary).await.err()
    } else {
        None
    };

    let global = aggregate(&status, &installed, broker_error.is_some());
    let message = summary(&status, &installed, global, broker_error.as_deref());
    status.set_status(global, Some(message));
    write(ctx, primary, &status).await?;

    let action = match global {
        Status::Ready => {
            debug!("Microcks {}/{} ready", namespace, name);
            Action::requeue(ctx.config.ready_resync())
        }
        Status::Error => {
            metrics::increment_requeues("module-error");
            Action::requeue(ctx.config.transient_requeue())
        }
        Status::Deploying | Status::Unknown => {
            metrics::increment_requeues("deploying");
            Action::requeue(ctx.config.deploying_requeue())
        }
    };
    info!(
        "Microcks {}/{} reconciled: {} ({} modules installed)",
        namespace,
        name,
        global.as_str(),
        installed.len()
    );
    Ok(action)
}

/// Converge the Strimzi objects and register their change-watches
async fn converge_broker(
    ctx: &Reconciler,
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> Result<(), String> {
    let namespace = primary.namespace().unwrap_or_default();
    let objects = desired_broker(resolved, primary).map_err(|e| format!("{e:#}"))?;
    let owner = ObjectRef::from_obj(primary);

    let mut failures = Vec::new();
    for (kind, desired) in objects {
        let name = desired.name_any();
        match ctx
            .store
            .create_or_update(&kind, &desired, UpdatePolicy::Converge)
            .await
        {
            Ok(applied) => {
                metrics::increment_resource_applies(&kind.kind, applied.change.as_str());
                ctx.watches.register(
                    Arc::clone(&ctx.store),
                    &kind,
                    &name,
                    &namespace,
                    owner.clone(),
                );
            }
            Err(e) => {
                warn!("Failed to converge {} {}/{}: {}", kind.kind, namespace, name, e);
                failures.push(format!("{} {}: {}", kind.kind, name, e));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!("Kafka broker failed: {}", failures.join("; ")))
    }
}

fn summary(
    status: &MicrocksStatus,
    installed: &[Module],
    global: Status,
    broker_error: Option<&str>,
) -> String {
    match global {
        Status::Ready => "All modules ready".to_string(),
        Status::Error => {
            let mut problems: Vec<String> = installed
                .iter()
                .filter_map(|module| {
                    find(status, &module.ready_condition())
                        .filter(|c| c.status == Status::Error)
                        .map(|c| c.message.clone().unwrap_or_else(|| format!("{module} failed")))
                })
                .collect();
            if let Some(broker_error) = broker_error {
                problems.push(broker_error.to_string());
            }
            problems.join("; ")
        }
        Status::Deploying | Status::Unknown => {
            let waiting: Vec<&str> = installed
                .iter()
                .filter(|module| {
                    find(status, &module.ready_condition()).map_or(true, |c| c.status != Status::Ready)
                })
                .map(Module::as_str)
                .collect();
            format!("Waiting for {}", waiting.join(", "))
        }
    }
}

async fn write(ctx: &Reconciler, primary: &Microcks, status: &MicrocksStatus) -> Result<(), ReconcilerError> {
    write_status(
        ctx.store.as_ref(),
        &kinds::microcks(),
        &primary.name_any(),
        &primary.namespace().unwrap_or_default(),
        status,
    )
    .await
}

/// Remove the broker objects and their watches, then release the instance
///
/// Owned workloads are garbage collected through their owner references.
/// Safe to run repeatedly.
///
/// # Errors
///
/// Returns an error if a delete or the finalizer patch fails.
pub async fn cleanup_microcks(primary: &Microcks, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = primary.name_any();
    let namespace = primary.namespace().unwrap_or_default();

    for (kind, object) in broker_objects(&name) {
        ctx.store.delete(&kind, &object, &namespace).await?;
        ctx.watches.unregister(&kind, &object, &namespace);
    }

    remove_finalizer(ctx.store.as_ref(), &kinds::microcks(), &primary.metadata).await?;
    info!("Cleaned up Microcks {}/{}", namespace, name);
    Ok(Action::await_change())
}
