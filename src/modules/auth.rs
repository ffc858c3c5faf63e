//! # Keycloak Module
//!
//! Authentication server of an instance. The realm document, including the
//! operator's service account credential, lives in
//! `<instance>-keycloak-config` and is imported by Keycloak at startup. The
//! document follows the exposition; the generated credential is read back
//! from the stored document so it survives every re-render.

use super::common::{
    container, data_volume, deployment, deployment_ready, dynamic, env, http_route, ingress,
    metadata, openshift_route, persistent_volume_claim, secret_env, secret_volume,
    selector_labels, service, with_mount,
};
use crate::compose::ResolvedSpec;
use crate::constants::{DEFAULT_SERVICE_ACCOUNT, KEYCLOAK_HTTP_PORT, REALM_CONFIG_KEY};
use crate::crd::{ExpositionType, Microcks};
use crate::store::{
    kinds,
    secrets::{decode_secret, secret_data},
};
use crate::workflow::{FnProducer, Module, ModuleWorkflow};
use anyhow::Context;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::json;

const COMPONENT: &str = "keycloak";
const REALM_VOLUME: &str = "realm-config";
const DATA_VOLUME: &str = "keycloak-data";

#[must_use]
pub fn keycloak_name(instance: &str) -> String {
    format!("{instance}-keycloak")
}

/// Secret holding the generated realm document
#[must_use]
pub fn realm_config_secret_name(instance: &str) -> String {
    format!("{instance}-keycloak-config")
}

#[must_use]
pub fn admin_secret_name(instance: &str) -> String {
    format!("{instance}-keycloak-admin")
}

fn data_claim_name(instance: &str) -> String {
    format!("{instance}-keycloak-data")
}

pub fn workflow() -> ModuleWorkflow {
    ModuleWorkflow::new(Module::Keycloak)
        .installed_when(ResolvedSpec::keycloak_installed)
        .producer(FnProducer::from_actual(
            "keycloak-realm-config",
            kinds::secret,
            realm_config_secret_name,
            realm_config_secret,
        ))
        .producer(
            FnProducer::new(
                "keycloak-admin-secret",
                kinds::secret,
                admin_secret_name,
                admin_secret,
            )
            .create_only(),
        )
        .producer(FnProducer::new(
            "keycloak-pvc",
            kinds::persistent_volume_claim,
            data_claim_name,
            data_claim,
        ))
        .producer(FnProducer::new(
            "keycloak-deployment",
            kinds::deployment,
            keycloak_name,
            keycloak_deployment,
        ))
        .producer(FnProducer::new(
            "keycloak-service",
            kinds::service,
            keycloak_name,
            keycloak_service,
        ))
        .producer(FnProducer::new(
            "keycloak-ingress",
            kinds::ingress,
            keycloak_name,
            keycloak_ingress,
        ))
        .producer(FnProducer::new(
            "keycloak-httproute",
            kinds::http_route,
            keycloak_name,
            keycloak_http_route,
        ))
        .producer(FnProducer::new(
            "keycloak-route",
            kinds::route,
            keycloak_name,
            keycloak_route,
        ))
        .ready_when("keycloak-deployment", deployment_ready)
}

/// Realm document imported by Keycloak
///
/// `applications` carries the operator's service account; the auth broker
/// reads its secret back from here.
#[must_use]
pub fn realm_document(resolved: &ResolvedSpec, service_account_secret: &str) -> serde_json::Value {
    let keycloak = resolved.keycloak();
    let realm = keycloak.realm.unwrap_or_else(|| "microcks".to_string());
    let service_account = keycloak
        .service_account
        .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT.to_string());
    let microcks_url = resolved
        .exposition()
        .microcks_url
        .clone()
        .unwrap_or_default();

    json!({
        "realm": realm,
        "enabled": true,
        "roles": {
            "client": {
                "microcks-app": [
                    {"name": "user"},
                    {"name": "manager"},
                    {"name": "admin"}
                ]
            }
        },
        "applications": [
            {
                "name": "microcks-app",
                "enabled": true,
                "bearerOnly": true
            },
            {
                "name": "microcks-app-js",
                "enabled": true,
                "publicClient": true,
                "redirectUris": [format!("{microcks_url}/*")],
                "webOrigins": ["+"]
            },
            {
                "name": service_account,
                "secret": service_account_secret,
                "enabled": true,
                "bearerOnly": false,
                "publicClient": false,
                "serviceAccountsEnabled": true,
                "standardFlowEnabled": false
            }
        ]
    })
}

/// Service account secret recorded in a stored realm-config Secret
fn stored_credential(actual: &DynamicObject, service_account: &str) -> anyhow::Result<Option<String>> {
    let data = decode_secret(actual)?;
    let Some(document) = data.get(REALM_CONFIG_KEY) else {
        return Ok(None);
    };
    let realm: serde_json::Value =
        serde_json::from_slice(document).context("Stored realm document is not valid JSON")?;
    Ok(realm["applications"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|app| app["name"] == service_account)
        .and_then(|app| app["secret"].as_str())
        .map(str::to_string))
}

fn realm_config_secret(
    resolved: &ResolvedSpec,
    primary: &Microcks,
    actual: Option<&DynamicObject>,
) -> anyhow::Result<Option<DynamicObject>> {
    let keycloak = resolved.keycloak();
    let service_account = keycloak
        .service_account
        .clone()
        .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT.to_string());
    let stored = match actual {
        Some(actual) => stored_credential(actual, &service_account)?,
        None => None,
    };
    let credential = keycloak
        .service_account_credentials
        .filter(|c| !c.is_empty())
        .or(stored)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let realm = serde_json::to_string_pretty(&realm_document(resolved, &credential))
        .context("Failed to render realm document")?;

    let name = realm_config_secret_name(&primary.name_any());
    dynamic(&json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": metadata(resolved, primary, &name, COMPONENT),
        "type": "Opaque",
        "data": secret_data([(REALM_CONFIG_KEY, realm)])
    }))
}

fn admin_secret(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let name = admin_secret_name(&primary.name_any());
    dynamic(&json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": metadata(resolved, primary, &name, COMPONENT),
        "type": "kubernetes.io/basic-auth",
        "data": secret_data([
            ("username", "admin".to_string()),
            ("password", uuid::Uuid::new_v4().simple().to_string()),
        ])
    }))
}

fn data_claim(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let keycloak = resolved.keycloak();
    if !keycloak.persistent.unwrap_or(false) {
        return Ok(None);
    }
    let name = data_claim_name(&primary.name_any());
    dynamic(&persistent_volume_claim(
        metadata(resolved, primary, &name, COMPONENT),
        keycloak.volume_size.as_deref().unwrap_or("1Gi"),
        keycloak.storage_class_name,
    ))
}

fn keycloak_deployment(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let keycloak = resolved.keycloak();
    let persistent = keycloak.persistent.unwrap_or(false);
    let admin = admin_secret_name(&instance);

    let mut env_vars = vec![
        secret_env("KC_BOOTSTRAP_ADMIN_USERNAME", &admin, "username"),
        secret_env("KC_BOOTSTRAP_ADMIN_PASSWORD", &admin, "password"),
        env("KC_HTTP_ENABLED", "true"),
        env("KC_HEALTH_ENABLED", "true"),
        env("KC_PROXY_HEADERS", "xforwarded"),
        env("KC_DB", "dev-file"),
    ];
    match resolved.exposition().keycloak_url.as_deref() {
        Some(url) if resolved.exposition().mode != ExpositionType::None => {
            env_vars.push(env("KC_HOSTNAME", url));
        }
        _ => env_vars.push(env("KC_HOSTNAME_STRICT", "false")),
    }

    let mut keycloak_container = container(
        "keycloak",
        keycloak.image.clone().unwrap_or_default().reference(),
        &[("http", KEYCLOAK_HTTP_PORT)],
        env_vars,
        keycloak.resources.clone(),
    );
    keycloak_container.args = Some(vec!["start-dev".to_string(), "--import-realm".to_string()]);
    let keycloak_container = with_mount(
        with_mount(keycloak_container, DATA_VOLUME, "/opt/keycloak/data"),
        REALM_VOLUME,
        "/opt/keycloak/data/import",
    );

    let name = keycloak_name(&instance);
    dynamic(&deployment(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        1,
        keycloak_container,
        vec![
            data_volume(DATA_VOLUME, persistent.then(|| data_claim_name(&instance))),
            secret_volume(REALM_VOLUME, &realm_config_secret_name(&instance)),
        ],
        persistent,
    ))
}

fn keycloak_service(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let name = keycloak_name(&instance);
    dynamic(&service(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        &[("http", KEYCLOAK_HTTP_PORT)],
    ))
}

fn exposed_host(resolved: &ResolvedSpec, mode: ExpositionType) -> Option<String> {
    let exposition = resolved.exposition();
    let expose = resolved
        .keycloak()
        .ingress
        .and_then(|i| i.expose)
        .unwrap_or(true);
    if exposition.mode != mode || !expose {
        return None;
    }
    exposition.keycloak_host().map(str::to_string)
}

fn keycloak_ingress(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let Some(host) = exposed_host(resolved, ExpositionType::Ingress) else {
        return Ok(None);
    };
    let name = keycloak_name(&primary.name_any());
    dynamic(&ingress(
        metadata(resolved, primary, &name, COMPONENT),
        &host,
        &name,
        KEYCLOAK_HTTP_PORT,
        &resolved.keycloak().ingress.unwrap_or_default(),
    ))
}

fn keycloak_http_route(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let Some(host) = exposed_host(resolved, ExpositionType::GatewayRoute) else {
        return Ok(None);
    };
    let name = keycloak_name(&primary.name_any());
    http_route(
        resolved,
        metadata(resolved, primary, &name, COMPONENT),
        &host,
        &name,
        KEYCLOAK_HTTP_PORT,
    )
}

fn keycloak_route(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let Some(host) = exposed_host(resolved, ExpositionType::Route) else {
        return Ok(None);
    };
    let name = keycloak_name(&primary.name_any());
    openshift_route(metadata(resolved, primary, &name, COMPONENT), &host, &name, "http")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;
    use crate::crd::{KeycloakSpec, MicrocksSpec};

    #[test]
    fn test_realm_document_lists_service_account() {
        let resolved = Composer::default().resolve(&MicrocksSpec::default()).unwrap();
        let realm = realm_document(&resolved, "s3cr3t");
        let account = realm["applications"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["name"] == "microcks-serviceaccount")
            .unwrap();
        assert_eq!(account["secret"], "s3cr3t");
        assert_eq!(realm["realm"], "microcks");
    }

    #[test]
    fn test_fixed_credentials_are_used_verbatim() {
        let spec = MicrocksSpec {
            keycloak: Some(KeycloakSpec {
                service_account_credentials: Some("fixed".to_string()),
                ..KeycloakSpec::default()
            }),
            ..MicrocksSpec::default()
        };
        let resolved = Composer::default().resolve(&spec).unwrap();
        let primary = Microcks::new("mcks", spec);
        let secret = realm_config_secret(&resolved, &primary, None).unwrap().unwrap();
        let encoded = secret.data["data"][REALM_CONFIG_KEY].as_str().unwrap();
        let decoded = String::from_utf8(
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).unwrap(),
        )
        .unwrap();
        assert!(decoded.contains("\"fixed\""));
    }

    #[test]
    fn test_stored_credential_is_carried_over() {
        let resolved = Composer::default().resolve(&MicrocksSpec::default()).unwrap();
        let primary = Microcks::new("mcks", MicrocksSpec::default());
        let first = realm_config_secret(&resolved, &primary, None).unwrap().unwrap();
        let generated = stored_credential(&first, DEFAULT_SERVICE_ACCOUNT).unwrap().unwrap();

        let second = realm_config_secret(&resolved, &primary, Some(&first)).unwrap().unwrap();
        assert_eq!(
            stored_credential(&second, DEFAULT_SERVICE_ACCOUNT).unwrap(),
            Some(generated)
        );
        assert_eq!(second.data["data"], first.data["data"]);
    }

    #[test]
    fn test_no_ingress_without_ingress_exposition() {
        let resolved = Composer::default().resolve(&MicrocksSpec::default()).unwrap();
        let primary = Microcks::new("mcks", MicrocksSpec::default());
        assert!(keycloak_ingress(&resolved, &primary).unwrap().is_none());
        assert!(keycloak_route(&resolved, &primary).unwrap().is_none());
    }
}
