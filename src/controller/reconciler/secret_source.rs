//! # SecretSource Reconciler
//!
//! Pushes the secrets listed by a `SecretSource` into its Microcks instance
//! and keeps them there.
//!
//! 1. Bind to the instance and authenticate
//! 2. Create or update each secret, recording its remote id
//! 3. Delete secrets no longer listed in `spec.secrets`
//! 4. Patch status
//!
//! On deletion every recorded secret is removed from Microcks before the
//! finalizer is released.

use crate::client::ItemCollection;
use crate::controller::reconciler::binding::bind;
use crate::controller::reconciler::finalizer::{ensure_finalizer, is_deleting, remove_finalizer};
use crate::controller::reconciler::items::{delete_all, prune_items, sync_items, DesiredItem, SyncReport};
use crate::controller::reconciler::reconcile::{observe_reconcile, requeue_for, write_source_status};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{HasConditions, SecretSource, SecretSpec, SourceStatus, Status};
use crate::store::kinds;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

pub const KIND: &str = "SecretSource";

/// Body of a Microcks secret
#[must_use]
pub fn secret_body(secret: &SecretSpec) -> Value {
    let mut body = Map::new();
    body.insert("name".to_string(), Value::String(secret.name.clone()));
    let optional = [
        ("description", &secret.description),
        ("username", &secret.username),
        ("password", &secret.password),
        ("token", &secret.token),
        ("tokenHeader", &secret.token_header),
        ("caCertPem", &secret.ca_cert_pem),
    ];
    for (field, value) in optional {
        if let Some(value) = value {
            body.insert(field.to_string(), Value::String(value.clone()));
        }
    }
    Value::Object(body)
}

pub async fn reconcile(
    source: Arc<SecretSource>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = source.name_any();
    let namespace = source.namespace().unwrap_or_default();
    observe_reconcile(&ctx, KIND, &namespace, &name, async {
        if is_deleting(&source.metadata) {
            cleanup(&source, &ctx).await
        } else {
            apply(&source, &ctx).await
        }
    })
    .await
}

async fn apply(source: &SecretSource, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = source.name_any();
    let namespace = source.namespace().unwrap_or_default();
    ensure_finalizer(ctx.store.as_ref(), &kinds::secret_source(), &source.metadata).await?;

    let previous = source.status.clone().unwrap_or_default();
    let mut status = previous.clone();
    status.observed_generation = source.metadata.generation;

    let bound = match bind(&source.metadata, ctx).await {
        Ok(bound) => bound,
        Err(e) if e.is_infrastructure() => return Err(e),
        Err(e) => {
            warn!("Cannot bind SecretSource {}/{}: {}", namespace, name, e);
            status.set_status(Status::Error, Some(e.to_string()));
            write(ctx, source, &previous, &status).await?;
            return requeue_for(ctx, e);
        }
    };

    let desired: Vec<DesiredItem> = source
        .spec
        .secrets
        .iter()
        .map(|secret| DesiredItem {
            key: secret.name.clone(),
            body: secret_body(secret),
        })
        .collect();
    let keep: BTreeSet<String> = desired.iter().map(|d| d.key.clone()).collect();

    let mut report = SyncReport::default();
    sync_items(
        bound.api.as_ref(),
        &bound.token,
        ItemCollection::Secrets,
        "Secret",
        &desired,
        &mut status,
        &mut report,
    )
    .await;
    prune_items(
        bound.api.as_ref(),
        &bound.token,
        ItemCollection::Secrets,
        &keep,
        &mut status,
        &mut report,
    )
    .await;

    let action = finish(ctx, &mut status, &report, "secrets");
    write(ctx, source, &previous, &status).await?;
    info!(
        "SecretSource {}/{} synchronized (created: {}, updated: {}, deleted: {}, failed: {})",
        namespace, name, report.created, report.updated, report.deleted, report.failed
    );
    Ok(action)
}

/// Global status and requeue of a source kind after a sync pass
pub(crate) fn finish(
    ctx: &Reconciler,
    status: &mut SourceStatus,
    report: &SyncReport,
    items: &str,
) -> Action {
    if report.has_failures() {
        status.set_status(
            Status::Error,
            Some(format!("{} of the {items} failed to synchronize", report.failed)),
        );
        crate::observability::metrics::increment_requeues("item-failure");
        Action::requeue(ctx.config.transient_requeue())
    } else {
        status.set_status(Status::Ready, Some(format!("All {items} synchronized")));
        Action::requeue(ctx.config.ready_resync())
    }
}

async fn write(
    ctx: &Reconciler,
    source: &SecretSource,
    previous: &SourceStatus,
    status: &SourceStatus,
) -> Result<(), ReconcilerError> {
    write_source_status(
        ctx.store.as_ref(),
        &kinds::secret_source(),
        &source.name_any(),
        &source.namespace().unwrap_or_default(),
        &previous.observed_state,
        status,
    )
    .await
}

async fn cleanup(source: &SecretSource, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = source.name_any();
    let namespace = source.namespace().unwrap_or_default();
    let mut status = source.status.clone().unwrap_or_default();

    if !status.observed_state.is_empty() {
        match bind(&source.metadata, ctx).await {
            Ok(bound) => {
                let report = delete_all(
                    bound.api.as_ref(),
                    &bound.token,
                    ItemCollection::Secrets,
                    &mut status,
                )
                .await;
                info!(
                    "Removed {} secrets of SecretSource {}/{} from Microcks",
                    report.deleted, namespace, name
                );
                if report.has_failures() {
                    warn!(
                        "{} secrets of SecretSource {}/{} could not be deleted",
                        report.failed, namespace, name
                    );
                }
            }
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => {
                warn!(
                    "Releasing SecretSource {}/{} without remote cleanup: {}",
                    namespace, name, e
                );
            }
        }
    }

    remove_finalizer(ctx.store.as_ref(), &kinds::secret_source(), &source.metadata).await?;
    Ok(Action::await_change())
}
