//! # Remote Item Synchronization
//!
//! Keeps a collection of remote items (secrets, importer jobs) in line with
//! a satellite's spec. Remote ids are remembered in `status.observedState`
//! so later passes update instead of duplicating.

use crate::client::{ItemCollection, RemoteInstanceApi};
use crate::controller::reconciler::status::upsert_and_timestamp;
use crate::crd::{ObservedItem, SourceStatus, Status};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// One item a satellite wants present remotely
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredItem {
    /// Key in `observedState` and condition type
    pub key: String,
    pub body: Value,
}

/// Counts of one synchronization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl SyncReport {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

fn recorded_id<'a>(status: &'a SourceStatus, key: &str, collection: ItemCollection) -> Option<&'a str> {
    status
        .observed_state
        .get(key)
        .filter(|item| item.collection == collection.as_str())
        .map(|item| item.remote_id.as_str())
}

/// Create or update every desired item, recording conditions and remote ids
///
/// `label` names the item kind in condition messages (`Secret`, `Importer`).
pub async fn sync_items(
    api: &dyn RemoteInstanceApi,
    token: &str,
    collection: ItemCollection,
    label: &str,
    desired: &[DesiredItem],
    status: &mut SourceStatus,
    report: &mut SyncReport,
) {
    for item in desired {
        let known = match recorded_id(status, &item.key, collection).map(str::to_string) {
            Some(id) => match api.get_item(token, collection, &id).await {
                Ok(Some(_)) => Some(id),
                Ok(None) => {
                    debug!("{} '{}' (id: {}) vanished remotely, recreating", label, item.key, id);
                    None
                }
                Err(e) => {
                    record_failure(status, label, &item.key, &e.to_string());
                    report.failed += 1;
                    continue;
                }
            },
            None => None,
        };

        let outcome = match known {
            Some(id) => {
                let mut body = item.body.clone();
                if let Value::Object(fields) = &mut body {
                    fields.insert("id".to_string(), Value::String(id.clone()));
                }
                api.update_item(token, collection, &id, &body)
                    .await
                    .map(|()| {
                        report.updated += 1;
                        id
                    })
            }
            None => api
                .create_item(token, collection, &item.body)
                .await
                .map(|id| {
                    info!("Created {} '{}' in Microcks (id: {})", label, item.key, id);
                    report.created += 1;
                    id
                }),
        };

        match outcome {
            Ok(id) => {
                status.observed_state.insert(
                    item.key.clone(),
                    ObservedItem {
                        collection: collection.as_str().to_string(),
                        remote_id: id.clone(),
                    },
                );
                upsert_and_timestamp(
                    status,
                    &item.key,
                    Status::Ready,
                    Some("Synchronized"),
                    Some(format!("{label} synchronized (id: {id})")),
                );
            }
            Err(e) => {
                record_failure(status, label, &item.key, &e.to_string());
                report.failed += 1;
            }
        }
    }
}

fn record_failure(status: &mut SourceStatus, label: &str, key: &str, error: &str) {
    warn!("Failed to synchronize {} '{}': {}", label, key, error);
    upsert_and_timestamp(
        status,
        key,
        Status::Error,
        Some("SyncFailed"),
        Some(format!("{label} synchronization failed: {error}")),
    );
}

/// Delete remote items of a collection that are no longer wanted
///
/// Deleted items leave `observedState`; their conditions stay.
pub async fn prune_items(
    api: &dyn RemoteInstanceApi,
    token: &str,
    collection: ItemCollection,
    keep: &BTreeSet<String>,
    status: &mut SourceStatus,
    report: &mut SyncReport,
) {
    let stale: Vec<(String, String)> = status
        .observed_state
        .iter()
        .filter(|(key, item)| item.collection == collection.as_str() && !keep.contains(*key))
        .map(|(key, item)| (key.clone(), item.remote_id.clone()))
        .collect();

    for (key, id) in stale {
        match api.delete_item(token, collection, &id).await {
            Ok(()) => {
                info!("Deleted {} item '{}' (id: {}) no longer in spec", collection, key, id);
                status.observed_state.remove(&key);
                report.deleted += 1;
            }
            Err(e) => {
                warn!("Failed to delete {} item '{}' (id: {}): {}", collection, key, id, e);
                report.failed += 1;
            }
        }
    }
}

/// Delete every recorded remote item of a collection
pub async fn delete_all(
    api: &dyn RemoteInstanceApi,
    token: &str,
    collection: ItemCollection,
    status: &mut SourceStatus,
) -> SyncReport {
    let mut report = SyncReport::default();
    prune_items(api, token, collection, &BTreeSet::new(), status, &mut report).await;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_id_respects_collection() {
        let mut status = SourceStatus::default();
        status.observed_state.insert(
            "github".to_string(),
            ObservedItem {
                collection: "secrets".to_string(),
                remote_id: "42".to_string(),
            },
        );
        assert_eq!(recorded_id(&status, "github", ItemCollection::Secrets), Some("42"));
        assert_eq!(recorded_id(&status, "github", ItemCollection::Jobs), None);
    }
}
