//! # Microcks API Types
//!
//! Request and response bodies exchanged with the Microcks REST API and the
//! Keycloak token endpoint.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Authentication settings published by a Microcks instance
///
/// Returned by `GET /api/keycloak/config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    pub enabled: bool,
    #[serde(default)]
    pub realm: String,
    #[serde(rename = "auth-server-url", default)]
    pub auth_server_url: String,
}

/// OAuth2 token response from Keycloak
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Progress of a remote test run (`GET /api/tests/{id}`)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub success: bool,
}

/// Test launch request (`POST /api/tests`)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub service_id: String,
    pub test_endpoint: String,
    pub runner_type: String,
    /// Milliseconds
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_operations: Option<Vec<String>>,
}

/// Remote collections managed on behalf of satellites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemCollection {
    Secrets,
    /// Importer jobs
    Jobs,
}

impl ItemCollection {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCollection::Secrets => "secrets",
            ItemCollection::Jobs => "jobs",
        }
    }
}

impl std::fmt::Display for ItemCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keycloak service account credential, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ServiceAccountCredential {
    pub principal: String,
    pub secret: String,
}

impl ServiceAccountCredential {
    #[must_use]
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("principal", &self.principal)
            .field("secret", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_uses_keycloak_field_names() {
        let config: AuthConfig = serde_json::from_str(
            r#"{"enabled":true,"realm":"microcks","resource":"microcks-app-js","auth-server-url":"http://kc:8080"}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.auth_server_url, "http://kc:8080");
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let credential = ServiceAccountCredential::new("microcks-serviceaccount", "s3cr3t");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("microcks-serviceaccount"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_request_omits_unset_fields() {
        let request = TestRequest {
            service_id: "Pastry API:1.0.0".to_string(),
            test_endpoint: "http://pastry:8080".to_string(),
            runner_type: "OPEN_API_SCHEMA".to_string(),
            timeout: 10_000,
            secret_name: None,
            filtered_operations: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["serviceId"], "Pastry API:1.0.0");
        assert!(value.get("secretName").is_none());
    }
}
