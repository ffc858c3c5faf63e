//! # Microcks Module
//!
//! The core service: generated configuration, workload, services and the
//! exposition object matching the instance's exposition mode.

use super::common::{
    config_map_volume, container, deployment, deployment_ready, dynamic, env, http_route,
    ingress, metadata, openshift_route, secret_env, selector_labels, service, with_mount,
};
use super::{async_minion, broker, database, runner};
use crate::compose::ResolvedSpec;
use crate::constants::{
    ASYNC_MINION_HTTP_PORT, MICROCKS_GRPC_PORT, MICROCKS_HTTP_PORT, POSTMAN_HTTP_PORT,
};
use crate::crd::{ExpositionType, Microcks};
use crate::store::kinds;
use crate::workflow::{FnProducer, Module, ModuleWorkflow};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::json;

const COMPONENT: &str = "microcks";
const CONFIG_VOLUME: &str = "microcks-config";

#[must_use]
pub fn microcks_name(instance: &str) -> String {
    instance.to_string()
}

#[must_use]
pub fn config_map_name(instance: &str) -> String {
    format!("{instance}-config")
}

fn grpc_service_name(instance: &str) -> String {
    format!("{instance}-grpc")
}

pub fn workflow() -> ModuleWorkflow {
    ModuleWorkflow::new(Module::Microcks)
        .producer(FnProducer::new(
            "microcks-config",
            kinds::config_map,
            config_map_name,
            microcks_config,
        ))
        .producer(FnProducer::new(
            "microcks-deployment",
            kinds::deployment,
            microcks_name,
            microcks_deployment,
        ))
        .producer(FnProducer::new(
            "microcks-service",
            kinds::service,
            microcks_name,
            microcks_service,
        ))
        .producer(FnProducer::new(
            "microcks-grpc-service",
            kinds::service,
            grpc_service_name,
            grpc_service,
        ))
        .producer(FnProducer::new(
            "microcks-ingress",
            kinds::ingress,
            microcks_name,
            microcks_ingress,
        ))
        .producer(FnProducer::new(
            "microcks-httproute",
            kinds::http_route,
            microcks_name,
            microcks_http_route,
        ))
        .producer(FnProducer::new(
            "microcks-route",
            kinds::route,
            microcks_name,
            microcks_route,
        ))
        .ready_when("microcks-deployment", deployment_ready)
}

/// `application.properties` of the core service
#[must_use]
pub fn application_properties(resolved: &ResolvedSpec, instance: &str, namespace: &str) -> String {
    let keycloak = resolved.keycloak();
    let exposition = resolved.exposition();
    let auth_enabled = resolved.keycloak_installed() || keycloak.url.is_some();
    let keycloak_url = exposition.keycloak_url.clone().unwrap_or_default();
    let keycloak_private_url = keycloak
        .private_url
        .clone()
        .unwrap_or_else(|| super::exposition::keycloak_service_url(instance, namespace));

    let mut lines = vec![
        format!("server.port={MICROCKS_HTTP_PORT}"),
        format!("grpc.server.port={MICROCKS_GRPC_PORT}"),
        format!(
            "spring.data.mongodb.uri=mongodb://${{SPRING_DATA_MONGODB_USER}}:${{SPRING_DATA_MONGODB_PASSWORD}}@{}/{}",
            database::connection_host(resolved, instance),
            database::database_name(resolved, instance)
        ),
        format!("spring.data.mongodb.database={}", database::database_name(resolved, instance)),
        format!(
            "postman-runner.url=http://{}:{POSTMAN_HTTP_PORT}",
            runner::postman_name(instance)
        ),
        format!("test-callback.url=http://{instance}:{MICROCKS_HTTP_PORT}"),
        "services.update.interval=${SERVICES_UPDATE_INTERVAL:0 0 0/2 * * *}".to_string(),
        format!(
            "mocks.enable-invocation-stats={}",
            resolved.microcks().mock_invocation_stats.unwrap_or(true)
        ),
        format!("keycloak.enabled={auth_enabled}"),
    ];
    if auth_enabled {
        lines.push(format!(
            "keycloak.realm={}",
            keycloak.realm.as_deref().unwrap_or("microcks")
        ));
        lines.push(format!("keycloak.auth-server-url={keycloak_url}"));
        lines.push("keycloak.resource=microcks-app".to_string());
        lines.push(format!("sso.public-url={keycloak_url}"));
        lines.push(format!(
            "spring.security.oauth2.resourceserver.jwt.issuer-uri={keycloak_url}/realms/{}",
            keycloak.realm.as_deref().unwrap_or("microcks")
        ));
        lines.push(format!(
            "spring.security.oauth2.resourceserver.jwt.jwk-set-uri={keycloak_private_url}/realms/{}/protocol/openid-connect/certs",
            keycloak.realm.as_deref().unwrap_or("microcks")
        ));
    }

    let hub = resolved
        .features
        .as_ref()
        .and_then(|f| f.microcks_hub.clone())
        .unwrap_or_default();
    lines.push(format!("microcks-hub.enabled={}", hub.enabled.unwrap_or(false)));
    if let Some(roles) = hub.allowed_roles.filter(|r| !r.is_empty()) {
        lines.push(format!("microcks-hub.allowed-roles={}", roles.join(",")));
    }

    let async_enabled = resolved.async_enabled();
    lines.push(format!("async-api.enabled={async_enabled}"));
    if async_enabled {
        let feature = resolved.async_feature();
        lines.push(format!(
            "async-api.default-binding={}",
            feature.default_binding.as_deref().unwrap_or("KAFKA")
        ));
        lines.push(format!(
            "async-api.default-frequency={}",
            feature.default_frequency.unwrap_or(10)
        ));
        lines.push(format!(
            "async-minion.url=http://{}:{ASYNC_MINION_HTTP_PORT}",
            async_minion::minion_name(instance)
        ));
        if let Some(bootstrap) = broker::bootstrap_servers(resolved, instance) {
            lines.push(format!("kafka.bootstrap-servers={bootstrap}"));
        }
    }

    let mut properties = lines.join("\n");
    properties.push('\n');
    properties
}

fn microcks_config(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let namespace = primary.namespace().unwrap_or_default();
    let name = config_map_name(&instance);
    dynamic(&json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": metadata(resolved, primary, &name, COMPONENT),
        "data": {
            "application.properties": application_properties(resolved, &instance, &namespace),
            "logback.xml": logback(resolved.microcks().log_level.as_deref().unwrap_or("INFO"))
        }
    }))
}

fn logback(level: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<configuration>
  <appender name="STDOUT" class="ch.qos.logback.core.ConsoleAppender">
    <encoder>
      <pattern>%d{{HH:mm:ss.SSS}} [%thread] %-5level %logger{{36}} - %msg%n</pattern>
    </encoder>
  </appender>
  <logger name="io.github.microcks" level="{level}"/>
  <root level="INFO">
    <appender-ref ref="STDOUT"/>
  </root>
</configuration>
"#
    )
}

fn microcks_deployment(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let microcks = resolved.microcks();
    let creds = database::credentials(resolved, &instance);

    let core_container = with_mount(
        container(
            "microcks",
            microcks.image.clone().unwrap_or_default().reference(),
            &[("http", MICROCKS_HTTP_PORT), ("grpc", MICROCKS_GRPC_PORT)],
            vec![
                env("JAVA_OPTIONS", "-XX:+TieredCompilation -XX:TieredStopAtLevel=2"),
                env("SPRING_PROFILES_ACTIVE", "prod"),
                env("SPRING_CONFIG_ADDITIONAL_LOCATION", "/deployments/config/"),
                secret_env("SPRING_DATA_MONGODB_USER", &creds.secret, &creds.username_key),
                secret_env("SPRING_DATA_MONGODB_PASSWORD", &creds.secret, &creds.password_key),
            ],
            microcks.resources.clone(),
        ),
        CONFIG_VOLUME,
        "/deployments/config",
    );

    let name = microcks_name(&instance);
    dynamic(&deployment(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        microcks.replicas.unwrap_or(1),
        core_container,
        vec![config_map_volume(CONFIG_VOLUME, &config_map_name(&instance))],
        false,
    ))
}

fn microcks_service(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let name = microcks_name(&instance);
    dynamic(&service(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        &[("http", MICROCKS_HTTP_PORT)],
    ))
}

fn grpc_service(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let name = grpc_service_name(&instance);
    dynamic(&service(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        &[("grpc", MICROCKS_GRPC_PORT)],
    ))
}

fn exposed_host(resolved: &ResolvedSpec, mode: ExpositionType) -> Option<String> {
    let exposition = resolved.exposition();
    let expose = resolved
        .microcks()
        .ingress
        .and_then(|i| i.expose)
        .unwrap_or(true);
    if exposition.mode != mode || !expose {
        return None;
    }
    exposition.microcks_host().map(str::to_string)
}

fn microcks_ingress(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let Some(host) = exposed_host(resolved, ExpositionType::Ingress) else {
        return Ok(None);
    };
    let name = microcks_name(&primary.name_any());
    dynamic(&ingress(
        metadata(resolved, primary, &name, COMPONENT),
        &host,
        &name,
        MICROCKS_HTTP_PORT,
        &resolved.microcks().ingress.unwrap_or_default(),
    ))
}

fn microcks_http_route(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let Some(host) = exposed_host(resolved, ExpositionType::GatewayRoute) else {
        return Ok(None);
    };
    let name = microcks_name(&primary.name_any());
    http_route(
        resolved,
        metadata(resolved, primary, &name, COMPONENT),
        &host,
        &name,
        MICROCKS_HTTP_PORT,
    )
}

fn microcks_route(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let Some(host) = exposed_host(resolved, ExpositionType::Route) else {
        return Ok(None);
    };
    let name = microcks_name(&primary.name_any());
    openshift_route(metadata(resolved, primary, &name, COMPONENT), &host, &name, "http")
}
