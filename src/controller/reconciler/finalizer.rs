//! # Finalizer
//!
//! Guards cleanup of every operator-managed kind with
//! `microcks.io/finalizer`, added and removed through JSON merge patches.

use crate::constants::FINALIZER;
use crate::store::{ResourceStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ApiResource;
use serde_json::json;
use tracing::debug;

#[must_use]
pub fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == FINALIZER))
}

#[must_use]
pub fn is_deleting(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

/// Add the finalizer if missing; returns whether a patch was sent
///
/// # Errors
///
/// Returns an error if the patch is rejected.
pub async fn ensure_finalizer(
    store: &dyn ResourceStore,
    kind: &ApiResource,
    meta: &ObjectMeta,
) -> Result<bool, StoreError> {
    if has_finalizer(meta) {
        return Ok(false);
    }
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_string());
    patch_finalizers(store, kind, meta, finalizers).await?;
    debug!("Added finalizer to {} {}", kind.kind, meta.name.as_deref().unwrap_or("unknown"));
    Ok(true)
}

/// Remove the finalizer, letting Kubernetes complete the deletion
///
/// # Errors
///
/// Returns an error if the patch is rejected.
pub async fn remove_finalizer(
    store: &dyn ResourceStore,
    kind: &ApiResource,
    meta: &ObjectMeta,
) -> Result<(), StoreError> {
    if !has_finalizer(meta) {
        return Ok(());
    }
    let finalizers: Vec<String> = meta
        .finalizers
        .iter()
        .flatten()
        .filter(|name| name.as_str() != FINALIZER)
        .cloned()
        .collect();
    patch_finalizers(store, kind, meta, finalizers).await?;
    debug!("Removed finalizer from {} {}", kind.kind, meta.name.as_deref().unwrap_or("unknown"));
    Ok(())
}

async fn patch_finalizers(
    store: &dyn ResourceStore,
    kind: &ApiResource,
    meta: &ObjectMeta,
    finalizers: Vec<String>,
) -> Result<(), StoreError> {
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| StoreError::Invalid("object has no name".to_string()))?;
    let namespace = meta.namespace.as_deref().unwrap_or("default");
    store
        .patch_merge(
            kind,
            name,
            namespace,
            &json!({ "metadata": { "finalizers": finalizers } }),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_finalizer() {
        let mut meta = ObjectMeta::default();
        assert!(!has_finalizer(&meta));
        meta.finalizers = Some(vec!["other".to_string(), FINALIZER.to_string()]);
        assert!(has_finalizer(&meta));
    }
}
