//! # Resource Store
//!
//! Generic cluster-object access used by the workflow engine, the
//! orchestrator's broker step and the satellite reconcilers.
//!
//! Everything goes through [`DynamicObject`] and an [`ApiResource`] so that
//! typed workloads, Microcks custom resources and third-party kinds (Strimzi,
//! Gateway API, OpenShift routes) share one code path.

pub mod drift;
pub mod kinds;
mod cluster;
mod memory;
pub mod secrets;

pub use cluster::KubeStore;
pub use drift::{plan, Change, UpdatePolicy};
pub use memory::InMemoryStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::api::{ApiResource, DynamicObject};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid object: {0}")]
    Invalid(String),
    #[error("Rejected by store: {0}")]
    Rejected(String),
}

/// Result of a create-or-update call
#[derive(Debug, Clone)]
pub struct Applied {
    pub object: DynamicObject,
    pub change: Change,
}

/// Change notification for a watched object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub name: String,
    pub namespace: Option<String>,
    pub deleted: bool,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DynamicObject>, StoreError>;

    /// Create if absent, update if drifted, leave untouched otherwise
    async fn create_or_update(
        &self,
        kind: &ApiResource,
        desired: &DynamicObject,
        policy: UpdatePolicy,
    ) -> Result<Applied, StoreError>;

    /// Delete; an already absent object is not an error
    async fn delete(&self, kind: &ApiResource, name: &str, namespace: &str)
        -> Result<(), StoreError>;

    /// JSON merge patch on the main resource (finalizers, annotations)
    async fn patch_merge(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// JSON merge patch of the status subresource
    async fn patch_status(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError>;

    fn watch(
        &self,
        kind: &ApiResource,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> BoxStream<'static, Result<ChangeEvent, StoreError>>;
}

/// Fetch and deserialize a typed object through the dynamic store
pub async fn get_typed<K: DeserializeOwned>(
    store: &dyn ResourceStore,
    kind: &ApiResource,
    name: &str,
    namespace: &str,
) -> Result<Option<K>, StoreError> {
    match store.get(kind, name, namespace).await? {
        Some(object) => Ok(Some(from_dynamic(&object)?)),
        None => Ok(None),
    }
}

/// Convert a dynamic object into a typed one
pub fn from_dynamic<K: DeserializeOwned>(object: &DynamicObject) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Convert a typed object (k8s-openapi or CRD) into a dynamic one
pub fn to_dynamic<K: serde::Serialize>(object: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

pub(crate) fn namespace_of(object: &DynamicObject) -> Result<&str, StoreError> {
    object
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::Invalid("object has no namespace".to_string()))
}

pub(crate) fn name_of(object: &DynamicObject) -> Result<&str, StoreError> {
    object
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| StoreError::Invalid("object has no name".to_string()))
}
