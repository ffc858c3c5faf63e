//! # Auth Broker
//!
//! Obtains a bearer token for a Microcks instance on behalf of a satellite.
//!
//! The service account credential comes either from a Secret named by the
//! `microcks.io/service-account-secret` annotation, or from the realm
//! document the operator generated when it installed Keycloak.

use crate::client::{RemoteInstanceApi, ServiceAccountCredential};
use crate::compose::ResolvedSpec;
use crate::constants::{
    ANONYMOUS_TOKEN, DEFAULT_SERVICE_ACCOUNT, REALM_CONFIG_KEY, SERVICE_ACCOUNT_PRINCIPAL_KEY,
    SERVICE_ACCOUNT_SECRET_ANNOTATION, SERVICE_ACCOUNT_SECRET_KEY,
};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::Microcks;
use crate::modules::auth::realm_config_secret_name;
use crate::modules::exposition::keycloak_service_url;
use crate::store::secrets::read_secret_data;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Deserialize)]
struct RealmDocument {
    #[serde(default)]
    applications: Vec<RealmApplication>,
}

#[derive(Deserialize)]
struct RealmApplication {
    name: String,
    #[serde(default)]
    secret: Option<String>,
}

/// Obtain a bearer token for the instance's API
///
/// # Errors
///
/// `TransientIo` when the instance or Keycloak cannot be reached,
/// `UnsatisfiedRequirement` when no credential can be found.
pub async fn obtain_token(
    ctx: &Reconciler,
    satellite: &ObjectMeta,
    instance: &Microcks,
    resolved: &ResolvedSpec,
    api: &dyn RemoteInstanceApi,
) -> Result<String, ReconcilerError> {
    let auth = api.get_auth_config().await.map_err(|e| {
        ReconcilerError::TransientIo(format!(
            "Cannot read authentication settings of Microcks instance '{}': {}",
            instance.name_any(),
            e
        ))
    })?;

    if !auth.enabled {
        debug!("Authentication disabled on {}, using anonymous token", instance.name_any());
        return Ok(ANONYMOUS_TOKEN.to_string());
    }

    let credential = service_account_credential(ctx, satellite, instance, resolved).await?;

    let base = if resolved.keycloak_installed() {
        keycloak_service_url(&instance.name_any(), &instance.namespace().unwrap_or_default())
    } else {
        auth.auth_server_url.trim_end_matches('/').to_string()
    };
    let realm = if auth.realm.is_empty() {
        resolved
            .keycloak()
            .realm
            .unwrap_or_else(|| "microcks".to_string())
    } else {
        auth.realm
    };
    let endpoint = token_endpoint(&base, &realm);

    api.exchange_credential_for_token(&credential, &endpoint)
        .await
        .map_err(|e| {
            ReconcilerError::TransientIo(format!(
                "Token exchange with {endpoint} failed: {e}"
            ))
        })
}

#[must_use]
pub fn token_endpoint(base: &str, realm: &str) -> String {
    format!(
        "{}/realms/{}/protocol/openid-connect/token",
        base.trim_end_matches('/'),
        realm
    )
}

async fn service_account_credential(
    ctx: &Reconciler,
    satellite: &ObjectMeta,
    instance: &Microcks,
    resolved: &ResolvedSpec,
) -> Result<ServiceAccountCredential, ReconcilerError> {
    let explicit = satellite
        .annotations
        .as_ref()
        .and_then(|a| a.get(SERVICE_ACCOUNT_SECRET_ANNOTATION));

    if let Some(secret_name) = explicit {
        let namespace = satellite.namespace.as_deref().unwrap_or("default");
        return explicit_credential(ctx, secret_name, namespace).await;
    }

    if !resolved.keycloak_installed() {
        return Err(ReconcilerError::UnsatisfiedRequirement(format!(
            "Microcks instance '{}' uses an external Keycloak; annotate this resource with '{}' naming a Secret holding '{}' and '{}'",
            instance.name_any(),
            SERVICE_ACCOUNT_SECRET_ANNOTATION,
            SERVICE_ACCOUNT_PRINCIPAL_KEY,
            SERVICE_ACCOUNT_SECRET_KEY
        )));
    }

    let secret_name = realm_config_secret_name(&instance.name_any());
    let namespace = instance.namespace().unwrap_or_default();
    let data = read_secret_data(ctx.store.as_ref(), &secret_name, &namespace)
        .await?
        .ok_or_else(|| {
            ReconcilerError::UnsatisfiedRequirement(format!(
                "Realm configuration Secret '{secret_name}' not found"
            ))
        })?;
    let document = data.get(REALM_CONFIG_KEY).ok_or_else(|| {
        ReconcilerError::UnsatisfiedRequirement(format!(
            "Secret '{secret_name}' has no '{REALM_CONFIG_KEY}' key"
        ))
    })?;

    let service_account = resolved
        .keycloak()
        .service_account
        .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT.to_string());
    extract_service_account(document, &service_account)
}

async fn explicit_credential(
    ctx: &Reconciler,
    secret_name: &str,
    namespace: &str,
) -> Result<ServiceAccountCredential, ReconcilerError> {
    let data = read_secret_data(ctx.store.as_ref(), secret_name, namespace)
        .await?
        .ok_or_else(|| {
            ReconcilerError::UnsatisfiedRequirement(format!(
                "Service account Secret '{secret_name}' not found in namespace '{namespace}'"
            ))
        })?;

    let read = |key: &str| -> Result<Zeroizing<String>, ReconcilerError> {
        data.get(key)
            .map(|bytes| Zeroizing::new(String::from_utf8_lossy(bytes).into_owned()))
            .ok_or_else(|| {
                ReconcilerError::UnsatisfiedRequirement(format!(
                    "Service account Secret '{secret_name}' has no '{key}' key"
                ))
            })
    };

    let principal = read(SERVICE_ACCOUNT_PRINCIPAL_KEY)?;
    let secret = read(SERVICE_ACCOUNT_SECRET_KEY)?;
    Ok(ServiceAccountCredential::new(principal.as_str(), secret.as_str()))
}

/// Find a service account's secret in a realm document
///
/// # Errors
///
/// `UnsatisfiedRequirement` when the document is malformed or does not list
/// the service account with a secret.
pub fn extract_service_account(
    realm_document: &[u8],
    service_account: &str,
) -> Result<ServiceAccountCredential, ReconcilerError> {
    let document: RealmDocument = serde_json::from_slice(realm_document).map_err(|e| {
        ReconcilerError::UnsatisfiedRequirement(format!("Realm configuration is not valid JSON: {e}"))
    })?;

    document
        .applications
        .into_iter()
        .find(|app| app.name == service_account)
        .and_then(|app| app.secret)
        .map(|secret| ServiceAccountCredential::new(service_account, secret))
        .ok_or_else(|| {
            ReconcilerError::UnsatisfiedRequirement(format!(
                "Realm configuration has no secret for service account '{service_account}'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;
    use crate::crd::MicrocksSpec;
    use crate::modules::auth::realm_document;

    #[test]
    fn test_extracts_generated_service_account() {
        let resolved = Composer::default().resolve(&MicrocksSpec::default()).unwrap();
        let document = serde_json::to_vec(&realm_document(&resolved, "generated-secret")).unwrap();

        let credential = extract_service_account(&document, DEFAULT_SERVICE_ACCOUNT).unwrap();
        assert_eq!(credential.principal, DEFAULT_SERVICE_ACCOUNT);
        assert_eq!(credential.secret, "generated-secret");
    }

    #[test]
    fn test_unknown_service_account() {
        let document = br#"{"applications":[{"name":"microcks-app"}]}"#;
        let err = extract_service_account(document, DEFAULT_SERVICE_ACCOUNT).unwrap_err();
        assert!(matches!(err, ReconcilerError::UnsatisfiedRequirement(_)));
    }

    #[test]
    fn test_malformed_realm() {
        let err = extract_service_account(b"not json", DEFAULT_SERVICE_ACCOUNT).unwrap_err();
        assert!(matches!(err, ReconcilerError::UnsatisfiedRequirement(_)));
    }

    #[test]
    fn test_token_endpoint() {
        assert_eq!(
            token_endpoint("http://kc:8080/", "microcks"),
            "http://kc:8080/realms/microcks/protocol/openid-connect/token"
        );
    }
}
