//! # Microcks Client
//!
//! Access to the REST API of a running Microcks instance.
//!
//! Satellite reconcilers never talk HTTP directly. They ask a
//! [`RemoteApiFactory`] for a [`RemoteInstanceApi`] bound to one instance,
//! which keeps the reconcilers testable with a fake implementation.

mod rest;
mod types;

pub use rest::{MicrocksClient, MicrocksClientFactory};
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteApiError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
}

/// Operations the operator performs against one Microcks instance
///
/// Every call but [`get_auth_config`](RemoteInstanceApi::get_auth_config)
/// and the token exchange carries `Authorization: Bearer <token>`.
#[async_trait]
pub trait RemoteInstanceApi: Send + Sync {
    async fn get_auth_config(&self) -> Result<AuthConfig, RemoteApiError>;

    /// Exchange a service account credential for an access token
    /// (`client_credentials` grant against `endpoint`)
    async fn exchange_credential_for_token(
        &self,
        credential: &ServiceAccountCredential,
        endpoint: &str,
    ) -> Result<String, RemoteApiError>;

    /// Create an item and return its remote id
    async fn create_item(
        &self,
        token: &str,
        collection: ItemCollection,
        body: &Value,
    ) -> Result<String, RemoteApiError>;

    async fn update_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
        body: &Value,
    ) -> Result<(), RemoteApiError>;

    /// `None` when the item does not exist
    async fn get_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
    ) -> Result<Option<Value>, RemoteApiError>;

    /// Deleting a missing item succeeds
    async fn delete_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
    ) -> Result<(), RemoteApiError>;

    /// Import an artifact from a URL and return the imported service name
    async fn import_artifact(
        &self,
        token: &str,
        url: &str,
        main_artifact: bool,
        secret_name: Option<&str>,
    ) -> Result<String, RemoteApiError>;

    /// Launch a test and return its remote id
    async fn submit_operation(
        &self,
        token: &str,
        request: &TestRequest,
    ) -> Result<String, RemoteApiError>;

    async fn poll_operation(&self, token: &str, id: &str) -> Result<OperationState, RemoteApiError>;

    /// Deleting a missing test succeeds
    async fn delete_operation(&self, token: &str, id: &str) -> Result<(), RemoteApiError>;
}

/// Builds API clients bound to a Microcks instance
pub trait RemoteApiFactory: Send + Sync {
    fn for_instance(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Arc<dyn RemoteInstanceApi>, RemoteApiError>;
}

/// Default in-cluster base URL of an instance's API
#[must_use]
pub fn instance_api_url(name: &str, namespace: &str) -> String {
    format!(
        "{}/api",
        crate::modules::exposition::microcks_service_url(name, namespace)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_api_url() {
        assert_eq!(
            instance_api_url("mcks", "tools"),
            "http://mcks.tools.svc.cluster.local:8080/api"
        );
    }
}
