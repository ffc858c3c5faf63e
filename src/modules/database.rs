//! # Mongo Module
//!
//! MongoDB backing the core service. Credentials are generated once unless
//! the user references a Secret of their own.

use super::common::{
    container, data_volume, deployment, deployment_ready, dynamic, env, metadata,
    persistent_volume_claim, secret_env, selector_labels, service, with_mount,
};
use crate::compose::ResolvedSpec;
use crate::constants::MONGODB_PORT;
use crate::crd::Microcks;
use crate::store::{kinds, secrets::secret_data};
use crate::workflow::{FnProducer, Module, ModuleWorkflow};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::json;

const COMPONENT: &str = "mongodb";
const DATA_VOLUME: &str = "mongodb-data";

#[must_use]
pub fn mongodb_name(instance: &str) -> String {
    format!("{instance}-mongodb")
}

#[must_use]
pub fn connection_secret_name(instance: &str) -> String {
    format!("{instance}-mongodb-connection")
}

fn data_claim_name(instance: &str) -> String {
    format!("{instance}-mongodb-data")
}

/// Secret name and keys holding the database credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoCredentials {
    pub secret: String,
    pub username_key: String,
    pub password_key: String,
}

#[must_use]
pub fn credentials(resolved: &ResolvedSpec, instance: &str) -> MongoCredentials {
    match resolved.mongodb().secret_ref {
        Some(reference) => MongoCredentials {
            secret: reference.secret,
            username_key: reference
                .username_key
                .unwrap_or_else(|| "username".to_string()),
            password_key: reference
                .password_key
                .unwrap_or_else(|| "password".to_string()),
        },
        None => MongoCredentials {
            secret: connection_secret_name(instance),
            username_key: "username".to_string(),
            password_key: "password".to_string(),
        },
    }
}

/// Host and port the core service connects to
#[must_use]
pub fn connection_host(resolved: &ResolvedSpec, instance: &str) -> String {
    if resolved.mongodb_installed() {
        format!("{}:{MONGODB_PORT}", mongodb_name(instance))
    } else {
        resolved
            .mongodb()
            .uri
            .unwrap_or_else(|| format!("{}:{MONGODB_PORT}", mongodb_name(instance)))
    }
}

#[must_use]
pub fn database_name(resolved: &ResolvedSpec, instance: &str) -> String {
    resolved
        .mongodb()
        .database
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| instance.to_string())
}

pub fn workflow() -> ModuleWorkflow {
    ModuleWorkflow::new(Module::Mongo)
        .installed_when(ResolvedSpec::mongodb_installed)
        .producer(
            FnProducer::new(
                "mongodb-connection-secret",
                kinds::secret,
                connection_secret_name,
                connection_secret,
            )
            .create_only(),
        )
        .producer(FnProducer::new(
            "mongodb-pvc",
            kinds::persistent_volume_claim,
            data_claim_name,
            data_claim,
        ))
        .producer(FnProducer::new(
            "mongodb-deployment",
            kinds::deployment,
            mongodb_name,
            mongodb_deployment,
        ))
        .producer(FnProducer::new(
            "mongodb-service",
            kinds::service,
            mongodb_name,
            mongodb_service,
        ))
        .ready_when("mongodb-deployment", deployment_ready)
}

fn connection_secret(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    if resolved.mongodb().secret_ref.is_some() {
        return Ok(None);
    }
    let instance = primary.name_any();
    let name = connection_secret_name(&instance);
    dynamic(&json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": metadata(resolved, primary, &name, COMPONENT),
        "type": "kubernetes.io/basic-auth",
        "data": secret_data([
            ("username", format!("user{}", &uuid::Uuid::new_v4().simple().to_string()[..8])),
            ("password", uuid::Uuid::new_v4().simple().to_string()),
            ("adminPassword", uuid::Uuid::new_v4().simple().to_string()),
        ])
    }))
}

fn data_claim(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let mongodb = resolved.mongodb();
    if !mongodb.persistent.unwrap_or(false) {
        return Ok(None);
    }
    let name = data_claim_name(&primary.name_any());
    dynamic(&persistent_volume_claim(
        metadata(resolved, primary, &name, COMPONENT),
        mongodb.volume_size.as_deref().unwrap_or("2Gi"),
        mongodb.storage_class_name,
    ))
}

fn mongodb_deployment(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let mongodb = resolved.mongodb();
    let persistent = mongodb.persistent.unwrap_or(false);
    let creds = credentials(resolved, &instance);

    let mongo_container = with_mount(
        container(
            "mongodb",
            mongodb.image.clone().unwrap_or_default().reference(),
            &[("mongodb", MONGODB_PORT)],
            vec![
                secret_env("MONGO_INITDB_ROOT_USERNAME", &creds.secret, &creds.username_key),
                secret_env("MONGO_INITDB_ROOT_PASSWORD", &creds.secret, &creds.password_key),
                env("MONGO_INITDB_DATABASE", database_name(resolved, &instance)),
            ],
            mongodb.resources.clone(),
        ),
        DATA_VOLUME,
        "/data/db",
    );

    let name = mongodb_name(&instance);
    dynamic(&deployment(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        1,
        mongo_container,
        vec![data_volume(
            DATA_VOLUME,
            persistent.then(|| data_claim_name(&instance)),
        )],
        true,
    ))
}

fn mongodb_service(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let name = mongodb_name(&instance);
    dynamic(&service(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        &[("mongodb", MONGODB_PORT)],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;
    use crate::crd::{MicrocksSpec, MongoDbSpec, SecretReferenceSpec};

    #[test]
    fn test_user_secret_replaces_generated_credentials() {
        let spec = MicrocksSpec {
            mongodb: Some(MongoDbSpec {
                secret_ref: Some(SecretReferenceSpec {
                    secret: "my-mongo".to_string(),
                    username_key: Some("user".to_string()),
                    password_key: None,
                }),
                ..MongoDbSpec::default()
            }),
            ..MicrocksSpec::default()
        };
        let resolved = Composer::default().resolve(&spec).unwrap();
        let primary = Microcks::new("mcks", spec);

        let creds = credentials(&resolved, "mcks");
        assert_eq!(creds.secret, "my-mongo");
        assert_eq!(creds.username_key, "user");
        assert_eq!(creds.password_key, "password");
        assert!(connection_secret(&resolved, &primary).unwrap().is_none());
    }

    #[test]
    fn test_external_database_host() {
        let spec = MicrocksSpec {
            mongodb: Some(MongoDbSpec {
                install: Some(false),
                uri: Some("mongo.shared:27017".to_string()),
                ..MongoDbSpec::default()
            }),
            ..MicrocksSpec::default()
        };
        let resolved = Composer::default().resolve(&spec).unwrap();
        assert_eq!(connection_host(&resolved, "mcks"), "mongo.shared:27017");
        assert_eq!(database_name(&resolved, "mcks"), "mcks");
    }
}
