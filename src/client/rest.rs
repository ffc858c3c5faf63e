//! # Microcks REST Client
//!
//! reqwest-based implementation of [`RemoteInstanceApi`].
//!
//! ## Endpoints
//!
//! - `GET /api/keycloak/config` - authentication settings
//! - `POST|PUT|GET|DELETE /api/{secrets,jobs}[/{id}]` - managed items
//! - `POST /api/artifact/download` - one-shot artifact import
//! - `POST /api/tests`, `GET|DELETE /api/tests/{id}` - test runs

use super::{
    instance_api_url, AuthConfig, ItemCollection, OperationState, RemoteApiError, RemoteApiFactory,
    RemoteInstanceApi, ServiceAccountCredential, TestRequest, TokenResponse,
};
use crate::config::OperatorConfig;
use crate::observability::metrics;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument};

/// Error body returned by Microcks on failed calls
#[derive(Debug, Deserialize)]
struct MicrocksErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Body of created resources; only the id matters
#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

/// Client for one Microcks instance
#[derive(Clone)]
pub struct MicrocksClient {
    http_client: Client,
    base_url: String,
}

impl std::fmt::Debug for MicrocksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrocksClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MicrocksClient {
    /// Create a client for the API rooted at `base_url` (ending in `/api`)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, RemoteApiError> {
        let http_client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(http_client, base_url))
    }

    /// Create a client sharing an existing connection pool
    #[must_use]
    pub fn with_client(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        let auth_header = if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {token}")
        };
        request.header("Authorization", auth_header)
    }

    fn item_path(collection: ItemCollection, id: &str) -> String {
        format!("{}/{}", collection.as_str(), id)
    }
}

/// Run one API call under a span and record its metrics
async fn observed<T, F>(operation: &'static str, call: F) -> Result<T, RemoteApiError>
where
    F: Future<Output = Result<T, RemoteApiError>>,
{
    let start = Instant::now();
    let result = call
        .instrument(info_span!("microcks.api", operation = operation))
        .await;
    metrics::record_remote_operation(operation, start.elapsed().as_secs_f64(), result.is_ok());
    if let Err(e) = &result {
        debug!(operation = operation, error = %e, "Microcks API call failed");
    }
    result
}

/// Turn a non-success response into an error
async fn check(response: Response) -> Result<Response, RemoteApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    Err(error_from(status, &error_text))
}

fn error_from(status: StatusCode, error_text: &str) -> RemoteApiError {
    let message = serde_json::from_str::<MicrocksErrorResponse>(error_text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or_else(|| error_text.to_string());
    match status {
        StatusCode::NOT_FOUND => RemoteApiError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteApiError::Auth(format!(
            "HTTP {}: {}",
            status.as_u16(),
            message
        )),
        _ => RemoteApiError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

async fn created_id(response: Response) -> Result<String, RemoteApiError> {
    let text = response.text().await?;
    serde_json::from_str::<CreatedResource>(&text)
        .map(|created| created.id)
        .map_err(|e| RemoteApiError::Decode(format!("missing id in response: {e}")))
}

fn absent_is_ok(result: Result<(), RemoteApiError>) -> Result<(), RemoteApiError> {
    match result {
        Err(RemoteApiError::NotFound(_)) => Ok(()),
        other => other,
    }
}

#[async_trait]
impl RemoteInstanceApi for MicrocksClient {
    async fn get_auth_config(&self) -> Result<AuthConfig, RemoteApiError> {
        observed("get_auth_config", async {
            let response = check(self.http_client.get(self.url("keycloak/config")).send().await?).await?;
            response
                .json::<AuthConfig>()
                .await
                .map_err(|e| RemoteApiError::Decode(e.to_string()))
        })
        .await
    }

    async fn exchange_credential_for_token(
        &self,
        credential: &ServiceAccountCredential,
        endpoint: &str,
    ) -> Result<String, RemoteApiError> {
        observed("exchange_token", async {
            let response = self
                .http_client
                .post(endpoint)
                .basic_auth(&credential.principal, Some(&credential.secret))
                .form(&[("grant_type", "client_credentials")])
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(RemoteApiError::Auth(format!(
                    "token endpoint returned HTTP {}: {}",
                    status.as_u16(),
                    error_text
                )));
            }
            let token = response
                .json::<TokenResponse>()
                .await
                .map_err(|e| RemoteApiError::Decode(e.to_string()))?;
            Ok(token.access_token)
        })
        .await
    }

    async fn create_item(
        &self,
        token: &str,
        collection: ItemCollection,
        body: &Value,
    ) -> Result<String, RemoteApiError> {
        observed("create_item", async {
            let request = self.http_client.post(self.url(collection.as_str())).json(body);
            let response = check(self.authorized(request, token).send().await?).await?;
            created_id(response).await
        })
        .await
    }

    async fn update_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
        body: &Value,
    ) -> Result<(), RemoteApiError> {
        observed("update_item", async {
            let request = self
                .http_client
                .put(self.url(&Self::item_path(collection, id)))
                .json(body);
            check(self.authorized(request, token).send().await?).await?;
            Ok::<(), RemoteApiError>(())
        })
        .await
    }

    async fn get_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
    ) -> Result<Option<Value>, RemoteApiError> {
        observed("get_item", async {
            let request = self.http_client.get(self.url(&Self::item_path(collection, id)));
            match check(self.authorized(request, token).send().await?).await {
                Ok(response) => {
                    let text = response.text().await?;
                    // Microcks answers an unknown id with an empty 200 body
                    if text.trim().is_empty() || text.trim() == "null" {
                        return Ok(None);
                    }
                    serde_json::from_str(&text)
                        .map(Some)
                        .map_err(|e| RemoteApiError::Decode(e.to_string()))
                }
                Err(RemoteApiError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn delete_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
    ) -> Result<(), RemoteApiError> {
        observed("delete_item", async {
            let request = self
                .http_client
                .delete(self.url(&Self::item_path(collection, id)));
            absent_is_ok(
                check(self.authorized(request, token).send().await?)
                    .await
                    .map(drop),
            )
        })
        .await
    }

    async fn import_artifact(
        &self,
        token: &str,
        url: &str,
        main_artifact: bool,
        secret_name: Option<&str>,
    ) -> Result<String, RemoteApiError> {
        observed("import_artifact", async {
            let main_artifact = main_artifact.to_string();
            let mut form = vec![("url", url), ("mainArtifact", main_artifact.as_str())];
            if let Some(secret_name) = secret_name {
                form.push(("secretName", secret_name));
            }
            let request = self
                .http_client
                .post(self.url("artifact/download"))
                .form(&form);
            let response = check(self.authorized(request, token).send().await?).await?;
            let service = response.text().await?;
            Ok::<String, RemoteApiError>(service.trim().to_string())
        })
        .await
    }

    async fn submit_operation(
        &self,
        token: &str,
        request: &TestRequest,
    ) -> Result<String, RemoteApiError> {
        observed("submit_operation", async {
            let builder = self.http_client.post(self.url("tests")).json(request);
            let response = check(self.authorized(builder, token).send().await?).await?;
            created_id(response).await
        })
        .await
    }

    async fn poll_operation(&self, token: &str, id: &str) -> Result<OperationState, RemoteApiError> {
        observed("poll_operation", async {
            let request = self.http_client.get(self.url(&format!("tests/{id}")));
            let response = check(self.authorized(request, token).send().await?).await?;
            response
                .json::<OperationState>()
                .await
                .map_err(|e| RemoteApiError::Decode(e.to_string()))
        })
        .await
    }

    async fn delete_operation(&self, token: &str, id: &str) -> Result<(), RemoteApiError> {
        observed("delete_operation", async {
            let request = self.http_client.delete(self.url(&format!("tests/{id}")));
            absent_is_ok(
                check(self.authorized(request, token).send().await?)
                    .await
                    .map(drop),
            )
        })
        .await
    }
}

/// Factory building [`MicrocksClient`]s that share one connection pool
#[derive(Debug, Clone)]
pub struct MicrocksClientFactory {
    http_client: Client,
}

impl MicrocksClientFactory {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &OperatorConfig) -> Result<Self, RemoteApiError> {
        let http_client = Client::builder()
            .connect_timeout(config.remote_connect_timeout())
            .timeout(config.remote_request_timeout())
            .build()?;
        Ok(Self { http_client })
    }
}

impl RemoteApiFactory for MicrocksClientFactory {
    fn for_instance(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Arc<dyn RemoteInstanceApi>, RemoteApiError> {
        Ok(Arc::new(MicrocksClient::with_client(
            self.http_client.clone(),
            instance_api_url(name, namespace),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            error_from(StatusCode::NOT_FOUND, ""),
            RemoteApiError::NotFound(_)
        ));
        assert!(matches!(
            error_from(StatusCode::UNAUTHORIZED, "denied"),
            RemoteApiError::Auth(_)
        ));
        match error_from(StatusCode::BAD_REQUEST, r#"{"message":"name already used"}"#) {
            RemoteApiError::Http { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "name already used");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_urls() {
        let client = MicrocksClient::with_client(Client::new(), "http://mcks:8080/api/");
        assert_eq!(client.base_url(), "http://mcks:8080/api");
        assert_eq!(
            client.url(&MicrocksClient::item_path(ItemCollection::Jobs, "42")),
            "http://mcks:8080/api/jobs/42"
        );
    }

    #[test]
    fn test_absent_is_ok() {
        assert!(absent_is_ok(Err(RemoteApiError::NotFound(String::new()))).is_ok());
        assert!(absent_is_ok(Err(RemoteApiError::Decode(String::new()))).is_err());
    }
}
