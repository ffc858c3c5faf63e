//! # AsyncMinion Module
//!
//! Publishes async API mocks to the message broker. Installed only when the
//! async feature is enabled.

use super::common::{
    config_map_volume, container, deployment, deployment_ready, dynamic, env, metadata,
    selector_labels, service, with_mount,
};
use super::{broker, microcks};
use crate::compose::ResolvedSpec;
use crate::constants::{ASYNC_MINION_HTTP_PORT, MICROCKS_HTTP_PORT};
use crate::crd::Microcks;
use crate::store::kinds;
use crate::workflow::{FnProducer, Module, ModuleWorkflow};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::json;

const COMPONENT: &str = "async-minion";
const CONFIG_VOLUME: &str = "async-minion-config";

#[must_use]
pub fn minion_name(instance: &str) -> String {
    format!("{instance}-async-minion")
}

fn config_map_name(instance: &str) -> String {
    format!("{instance}-async-minion-config")
}

pub fn workflow() -> ModuleWorkflow {
    ModuleWorkflow::new(Module::AsyncMinion)
        .installed_when(ResolvedSpec::async_enabled)
        .producer(FnProducer::new(
            "async-minion-config",
            kinds::config_map,
            config_map_name,
            minion_config,
        ))
        .producer(FnProducer::new(
            "async-minion-deployment",
            kinds::deployment,
            minion_name,
            minion_deployment,
        ))
        .producer(FnProducer::new(
            "async-minion-service",
            kinds::service,
            minion_name,
            minion_service,
        ))
        .ready_when("async-minion-deployment", deployment_ready)
}

/// `application.properties` of the minion
#[must_use]
pub fn minion_properties(resolved: &ResolvedSpec, instance: &str) -> String {
    let feature = resolved.async_feature();
    let mut lines = vec![
        format!("quarkus.http.port={ASYNC_MINION_HTTP_PORT}"),
        format!(
            "io.github.microcks.minion.async.client.MicrocksAPIConnector/mp-rest/url=http://{}:{MICROCKS_HTTP_PORT}",
            microcks::microcks_name(instance)
        ),
        format!(
            "minion.supported-bindings={}",
            feature.default_binding.as_deref().unwrap_or("KAFKA")
        ),
        "minion.default-avro-encoding=RAW".to_string(),
        format!(
            "minion.restricted-frequencies=3,{}",
            feature.default_frequency.unwrap_or(10)
        ),
    ];
    if let Some(bootstrap) = broker::bootstrap_servers(resolved, instance) {
        lines.push(format!("kafka.bootstrap.servers={bootstrap}"));
    }
    let realm = resolved.keycloak().realm.unwrap_or_else(|| "microcks".to_string());
    lines.push(format!("keycloak.auth.realm={realm}"));

    let mut properties = lines.join("\n");
    properties.push('\n');
    properties
}

fn minion_config(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let name = config_map_name(&instance);
    dynamic(&json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": metadata(resolved, primary, &name, COMPONENT),
        "data": {"application.properties": minion_properties(resolved, &instance)}
    }))
}

fn minion_deployment(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let feature = resolved.async_feature();
    let minion = with_mount(
        container(
            "async-minion",
            feature.image.clone().unwrap_or_default().reference(),
            &[("http", ASYNC_MINION_HTTP_PORT)],
            vec![env("QUARKUS_PROFILE", "kube")],
            feature.resources.clone(),
        ),
        CONFIG_VOLUME,
        "/deployments/config",
    );

    let name = minion_name(&instance);
    dynamic(&deployment(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        1,
        minion,
        vec![config_map_volume(CONFIG_VOLUME, &config_map_name(&instance))],
        false,
    ))
}

fn minion_service(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let name = minion_name(&instance);
    dynamic(&service(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        &[("http", ASYNC_MINION_HTTP_PORT)],
    ))
}
