//! # APISource Reconciler
//!
//! Loads API artifacts into a Microcks instance and keeps its importer jobs
//! in line with an `APISource`.
//!
//! Artifacts are imported once; the imported service name is remembered in
//! `observedState` under the artifact URL. Importers are synchronized like
//! secrets against the `jobs` collection and pruned when removed.

use crate::client::{ItemCollection, RemoteInstanceApi};
use crate::controller::reconciler::binding::bind;
use crate::controller::reconciler::finalizer::{ensure_finalizer, is_deleting, remove_finalizer};
use crate::controller::reconciler::items::{delete_all, prune_items, sync_items, DesiredItem, SyncReport};
use crate::controller::reconciler::reconcile::{observe_reconcile, requeue_for, write_source_status};
use crate::controller::reconciler::secret_source::finish;
use crate::controller::reconciler::status::upsert_and_timestamp;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{APISource, ArtifactSpec, HasConditions, ImporterSpec, ObservedItem, SourceStatus, Status};
use crate::store::kinds;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const KIND: &str = "APISource";

/// `observedState` collection of imported artifacts
pub const ARTIFACTS_COLLECTION: &str = "artifacts";

/// Body of a Microcks importer job
#[must_use]
pub fn importer_body(importer: &ImporterSpec) -> Value {
    let mut body = json!({
        "name": importer.name,
        "repositoryUrl": importer.repository.url,
        "mainArtifact": importer.main_artifact,
        "repositoryDisableSSLValidation": importer.repository.disable_ssl_validation,
        "active": importer.active,
    });
    if !importer.labels.is_empty() {
        body["metadata"] = json!({ "labels": importer.labels });
    }
    if let Some(secret) = &importer.repository.secret_ref {
        body["secretRef"] = json!({ "name": secret });
    }
    body
}

pub async fn reconcile(source: Arc<APISource>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
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

async fn apply(source: &APISource, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = source.name_any();
    let namespace = source.namespace().unwrap_or_default();
    ensure_finalizer(ctx.store.as_ref(), &kinds::api_source(), &source.metadata).await?;

    let previous = source.status.clone().unwrap_or_default();
    let mut status = previous.clone();
    status.observed_generation = source.metadata.generation;

    let bound = match bind(&source.metadata, ctx).await {
        Ok(bound) => bound,
        Err(e) if e.is_infrastructure() => return Err(e),
        Err(e) => {
            warn!("Cannot bind APISource {}/{}: {}", namespace, name, e);
            status.set_status(Status::Error, Some(e.to_string()));
            write(ctx, source, &previous, &status).await?;
            return requeue_for(ctx, e);
        }
    };

    let mut report = SyncReport::default();
    import_artifacts(
        bound.api.as_ref(),
        &bound.token,
        &source.spec.artifacts,
        &mut status,
        &mut report,
    )
    .await;

    let desired: Vec<DesiredItem> = source
        .spec
        .importers
        .iter()
        .map(|importer| DesiredItem {
            key: importer.name.clone(),
            body: importer_body(importer),
        })
        .collect();
    let keep: BTreeSet<String> = desired.iter().map(|d| d.key.clone()).collect();
    sync_items(
        bound.api.as_ref(),
        &bound.token,
        ItemCollection::Jobs,
        "Importer",
        &desired,
        &mut status,
        &mut report,
    )
    .await;
    prune_items(
        bound.api.as_ref(),
        &bound.token,
        ItemCollection::Jobs,
        &keep,
        &mut status,
        &mut report,
    )
    .await;

    let action = finish(ctx, &mut status, &report, "artifacts and importers");
    write(ctx, source, &previous, &status).await?;
    info!(
        "APISource {}/{} synchronized (created: {}, updated: {}, deleted: {}, failed: {})",
        namespace, name, report.created, report.updated, report.deleted, report.failed
    );
    Ok(action)
}

/// Import artifacts not imported yet
///
/// Artifacts no longer listed are forgotten; the services they created
/// stay in Microcks.
pub async fn import_artifacts(
    api: &dyn RemoteInstanceApi,
    token: &str,
    artifacts: &[ArtifactSpec],
    status: &mut SourceStatus,
    report: &mut SyncReport,
) {
    let listed: BTreeSet<&str> = artifacts.iter().map(|a| a.url.as_str()).collect();
    status
        .observed_state
        .retain(|key, item| item.collection != ARTIFACTS_COLLECTION || listed.contains(key.as_str()));

    for artifact in artifacts {
        if status.observed_state.contains_key(&artifact.url) {
            debug!("Artifact {} already imported, skipping", artifact.url);
            continue;
        }

        match api
            .import_artifact(
                token,
                &artifact.url,
                artifact.main_artifact,
                artifact.secret_ref.as_deref(),
            )
            .await
        {
            Ok(service) => {
                info!("Imported artifact {} as service '{}'", artifact.url, service);
                report.created += 1;
                status.observed_state.insert(
                    artifact.url.clone(),
                    ObservedItem {
                        collection: ARTIFACTS_COLLECTION.to_string(),
                        remote_id: service.clone(),
                    },
                );
                upsert_and_timestamp(
                    status,
                    &artifact.url,
                    Status::Ready,
                    Some("Imported"),
                    Some(format!("Artifact imported (service: {service})")),
                );
            }
            Err(e) => {
                warn!("Failed to import artifact {}: {}", artifact.url, e);
                report.failed += 1;
                upsert_and_timestamp(
                    status,
                    &artifact.url,
                    Status::Error,
                    Some("ImportFailed"),
                    Some(format!("Artifact import failed: {e}")),
                );
            }
        }
    }
}

async fn write(
    ctx: &Reconciler,
    source: &APISource,
    previous: &SourceStatus,
    status: &SourceStatus,
) -> Result<(), ReconcilerError> {
    write_source_status(
        ctx.store.as_ref(),
        &kinds::api_source(),
        &source.name_any(),
        &source.namespace().unwrap_or_default(),
        &previous.observed_state,
        status,
    )
    .await
}

async fn cleanup(source: &APISource, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = source.name_any();
    let namespace = source.namespace().unwrap_or_default();
    let mut status = source.status.clone().unwrap_or_default();
    let has_importers = status
        .observed_state
        .values()
        .any(|item| item.collection == ItemCollection::Jobs.as_str());

    if source.spec.keep_importers_on_delete {
        info!("Keeping importers of APISource {}/{} in Microcks", namespace, name);
    } else if has_importers {
        match bind(&source.metadata, ctx).await {
            Ok(bound) => {
                let report =
                    delete_all(bound.api.as_ref(), &bound.token, ItemCollection::Jobs, &mut status)
                        .await;
                info!(
                    "Removed {} importers of APISource {}/{} from Microcks",
                    report.deleted, namespace, name
                );
            }
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => {
                warn!(
                    "Releasing APISource {}/{} without remote cleanup: {}",
                    namespace, name, e
                );
            }
        }
    }

    remove_finalizer(ctx.store.as_ref(), &kinds::api_source(), &source.metadata).await?;
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::RepositorySpec;
    use std::collections::BTreeMap;

    #[test]
    fn test_importer_body() {
        let body = importer_body(&ImporterSpec {
            name: "pastry".to_string(),
            main_artifact: true,
            repository: RepositorySpec {
                url: "https://example.com/pastry.yaml".to_string(),
                secret_ref: Some("github".to_string()),
                disable_ssl_validation: false,
            },
            labels: BTreeMap::from([("team".to_string(), "bakery".to_string())]),
            active: true,
        });
        assert_eq!(body["repositoryUrl"], "https://example.com/pastry.yaml");
        assert_eq!(body["secretRef"]["name"], "github");
        assert_eq!(body["metadata"]["labels"]["team"], "bakery");
    }
}
