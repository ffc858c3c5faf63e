//! Module workflows and `Microcks` reconciliation against the in-memory store.

mod common;

use common::{instance, reconciler, refresh, seed, FakeMicrocks, INSTANCE, NAMESPACE};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube_runtime::controller::Action;
use microcks_operator::compose::{Composer, ResolvedSpec};
use microcks_operator::config::OperatorConfig;
use microcks_operator::constants::REALM_CONFIG_KEY;
use microcks_operator::controller::reconciler::microcks;
use microcks_operator::crd::{Microcks, MicrocksSpec, Status};
use microcks_operator::modules::auth::{keycloak_name, realm_config_secret_name};
use microcks_operator::modules::common::deployment_ready;
use microcks_operator::modules::database::mongodb_name;
use microcks_operator::modules::exposition::microcks_service_url;
use microcks_operator::modules::runner::postman_name;
use microcks_operator::store::secrets::read_secret_key;
use microcks_operator::store::{kinds, Change, InMemoryStore};
use microcks_operator::workflow::{FnProducer, Module, ModuleWorkflow};
use serde_json::json;
use std::sync::Arc;

fn config_map(resolved: &ResolvedSpec, primary: &Microcks) -> anyhow::Result<Option<DynamicObject>> {
    Ok(Some(serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": format!("{}-settings", primary.metadata.name.as_deref().unwrap_or_default()), "namespace": NAMESPACE},
        "data": {"version": resolved.version(), "generated": uuid::Uuid::new_v4().to_string()}
    }))?))
}

fn worker(_: &ResolvedSpec, primary: &Microcks) -> anyhow::Result<Option<DynamicObject>> {
    Ok(Some(serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": format!("{}-worker", primary.metadata.name.as_deref().unwrap_or_default()), "namespace": NAMESPACE},
        "spec": {"replicas": 2}
    }))?))
}

fn broken(_: &ResolvedSpec, _: &Microcks) -> anyhow::Result<Option<DynamicObject>> {
    anyhow::bail!("cannot render settings")
}

fn skipped(_: &ResolvedSpec, _: &Microcks) -> anyhow::Result<Option<DynamicObject>> {
    Ok(None)
}

fn test_workflow() -> ModuleWorkflow {
    ModuleWorkflow::new(Module::Postman)
        .producer(
            FnProducer::new(
                "settings",
                kinds::config_map,
                |instance| format!("{instance}-settings"),
                config_map,
            )
            .create_only(),
        )
        .producer(FnProducer::new(
            "worker",
            kinds::deployment,
            |instance| format!("{instance}-worker"),
            worker,
        ))
        .producer(FnProducer::new("optional", kinds::service, |i| i.to_string(), skipped))
        .ready_when("worker", deployment_ready)
}

#[tokio::test]
async fn test_engine_tracks_readiness_and_keeps_create_only_objects() {
    let store = InMemoryStore::new();
    let resolved = Composer::default().resolve(&MicrocksSpec::default()).unwrap();
    let primary = instance(MicrocksSpec::default(), None);
    let workflow = test_workflow();

    let result = workflow.reconcile(&store, &resolved, &primary).await;
    assert!(result.installed);
    assert!(!result.ready);
    assert!(result.produced_ok.contains("settings"));
    assert!(result.not_ready.contains("worker"));
    assert!(!store.contains(&kinds::service(), INSTANCE, NAMESPACE));

    store.mark_ready(&kinds::deployment(), &format!("{INSTANCE}-worker"), NAMESPACE);
    let result = workflow.reconcile(&store, &resolved, &primary).await;
    assert!(result.ready);

    // The generated ConfigMap is created once and never rewritten
    let settings_changes: Vec<Change> = store
        .changes()
        .into_iter()
        .filter(|(kind, _, _)| kind == "ConfigMap")
        .map(|(_, _, change)| change)
        .collect();
    assert_eq!(settings_changes, vec![Change::Created]);
}

#[tokio::test]
async fn test_engine_collects_failures_and_continues() {
    let store = InMemoryStore::new();
    let resolved = Composer::default().resolve(&MicrocksSpec::default()).unwrap();
    let primary = instance(MicrocksSpec::default(), None);
    let workflow = ModuleWorkflow::new(Module::Postman)
        .producer(FnProducer::new(
            "settings",
            kinds::config_map,
            |instance| format!("{instance}-settings"),
            broken,
        ))
        .producer(FnProducer::new(
            "worker",
            kinds::deployment,
            |instance| format!("{instance}-worker"),
            worker,
        ));

    let result = workflow.reconcile(&store, &resolved, &primary).await;

    assert!(!result.ready);
    assert!(result.errored["settings"].contains("cannot render settings"));
    assert!(result.produced_ok.contains("worker"));
    assert!(store.contains(&kinds::deployment(), &format!("{INSTANCE}-worker"), NAMESPACE));
}

#[tokio::test]
async fn test_install_precondition_skips_module() {
    let store = InMemoryStore::new();
    let resolved = Composer::default().resolve(&MicrocksSpec::default()).unwrap();
    let primary = instance(MicrocksSpec::default(), None);
    let workflow = test_workflow().installed_when(ResolvedSpec::async_enabled);

    let result = workflow.reconcile(&store, &resolved, &primary).await;

    assert!(!result.installed);
    assert!(store.changes().is_empty());
}

async fn step(store: &Arc<InMemoryStore>, primary: Microcks) -> (Action, Microcks) {
    seed(store, &kinds::microcks(), &primary);
    let action = microcks::reconcile(Arc::new(primary), reconciler(store, &FakeMicrocks::anonymous()))
        .await
        .unwrap();
    (action, refresh(store, &kinds::microcks(), INSTANCE).await)
}

fn condition(primary: &Microcks, r#type: &str) -> Status {
    primary
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == r#type))
        .map(|c| c.status)
        .unwrap_or_default()
}

#[tokio::test]
async fn test_fresh_instance_converges_to_ready() {
    let store = Arc::new(InMemoryStore::new());
    let config = OperatorConfig::default();

    let (action, primary) = step(&store, instance(MicrocksSpec::default(), None)).await;
    assert_eq!(action, Action::requeue(config.deploying_requeue()));
    let status = primary.status.clone().unwrap();
    assert_eq!(status.status, Status::Deploying);
    assert_eq!(
        status.microcks_url.as_deref(),
        Some(microcks_service_url(INSTANCE, NAMESPACE).as_str())
    );
    assert_eq!(status.exposition.as_deref(), Some("None"));

    let deployments = store.names(&kinds::deployment());
    for expected in [
        INSTANCE.to_string(),
        keycloak_name(INSTANCE),
        mongodb_name(INSTANCE),
        postman_name(INSTANCE),
    ] {
        assert!(deployments.contains(&expected), "missing deployment {expected}");
    }

    store.mark_all_ready(&kinds::deployment());
    let (action, primary) = step(&store, primary).await;
    assert_eq!(action, Action::requeue(config.ready_resync()));
    assert_eq!(primary.status.as_ref().unwrap().status, Status::Ready);
    for module in [Module::Keycloak, Module::Mongo, Module::Microcks, Module::Postman] {
        assert_eq!(condition(&primary, &module.ready_condition()), Status::Ready);
    }
    // Async minion is disabled by default
    assert_eq!(
        condition(&primary, &Module::AsyncMinion.ready_condition()),
        Status::Unknown
    );
}

#[tokio::test]
async fn test_readiness_flips_back_to_deploying() {
    let store = Arc::new(InMemoryStore::new());
    let config = OperatorConfig::default();

    let (_, primary) = step(&store, instance(MicrocksSpec::default(), None)).await;
    store.mark_all_ready(&kinds::deployment());
    let (_, primary) = step(&store, primary).await;
    assert_eq!(primary.status.as_ref().unwrap().status, Status::Ready);

    store.mark_not_ready(&kinds::deployment(), &postman_name(INSTANCE), NAMESPACE);
    let (action, primary) = step(&store, primary).await;
    assert_eq!(action, Action::requeue(config.deploying_requeue()));
    let status = primary.status.clone().unwrap();
    assert_eq!(status.status, Status::Deploying);
    assert_eq!(status.message.as_deref(), Some("Waiting for Postman"));
    assert_eq!(condition(&primary, &Module::Postman.ready_condition()), Status::Deploying);
    assert_eq!(condition(&primary, &Module::Microcks.ready_condition()), Status::Ready);

    store.mark_all_ready(&kinds::deployment());
    let (_, primary) = step(&store, primary).await;
    assert_eq!(primary.status.unwrap().status, Status::Ready);
}

/// Stored realm document and the service account secret it carries
async fn realm(store: &InMemoryStore) -> (serde_json::Value, String) {
    let raw = read_secret_key(store, &realm_config_secret_name(INSTANCE), NAMESPACE, REALM_CONFIG_KEY)
        .await
        .unwrap()
        .unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let secret = document["applications"]
        .as_array()
        .unwrap()
        .iter()
        .find(|app| app["name"] == "microcks-serviceaccount")
        .and_then(|app| app["secret"].as_str())
        .unwrap()
        .to_string();
    (document, secret)
}

fn redirect_uris(document: &serde_json::Value) -> serde_json::Value {
    document["applications"]
        .as_array()
        .unwrap()
        .iter()
        .find(|app| app["name"] == "microcks-app-js")
        .map(|app| app["redirectUris"].clone())
        .unwrap()
}

#[tokio::test]
async fn test_realm_follows_exposition_and_keeps_credential() {
    let store = Arc::new(InMemoryStore::new());

    let (_, primary) = step(&store, instance(MicrocksSpec::default(), None)).await;
    let (document, credential) = realm(&store).await;
    assert_eq!(
        redirect_uris(&document),
        json!([format!("{}/*", microcks_service_url(INSTANCE, NAMESPACE))])
    );

    // Same spec again: nothing to rewrite
    step(&store, primary.clone()).await;
    assert_eq!(realm(&store).await.1, credential);

    let mut exposed = primary;
    exposed.spec = serde_json::from_value(json!({
        "commonExpositions": {"type": "Ingress"},
        "microcks": {"url": "microcks.example.com"},
        "keycloak": {"url": "keycloak.example.com"}
    }))
    .unwrap();
    step(&store, exposed).await;

    let (document, rotated) = realm(&store).await;
    assert_eq!(redirect_uris(&document), json!(["https://microcks.example.com/*"]));
    assert_eq!(rotated, credential);
    let secret_changes: Vec<Change> = store
        .changes()
        .into_iter()
        .filter(|(kind, name, _)| kind == "Secret" && *name == realm_config_secret_name(INSTANCE))
        .map(|(_, _, change)| change)
        .collect();
    assert_eq!(secret_changes, vec![Change::Created, Change::Updated]);
}

#[tokio::test]
async fn test_failing_module_does_not_block_the_others() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_on(&kinds::deployment(), &mongodb_name(INSTANCE));

    let (_, primary) = step(&store, instance(MicrocksSpec::default(), None)).await;
    store.mark_all_ready(&kinds::deployment());
    let (action, primary) = step(&store, primary).await;

    assert_eq!(action, Action::requeue(OperatorConfig::default().transient_requeue()));
    let status = primary.status.clone().unwrap();
    assert_eq!(status.status, Status::Error);
    assert!(status.message.unwrap().contains("Mongo"));
    assert_eq!(condition(&primary, &Module::Mongo.ready_condition()), Status::Error);
    assert_eq!(condition(&primary, &Module::Microcks.ready_condition()), Status::Ready);
    assert!(store.contains(&kinds::deployment(), INSTANCE, NAMESPACE));
}

#[tokio::test]
async fn test_external_mongodb_is_not_installed() {
    let store = Arc::new(InMemoryStore::new());
    let spec: MicrocksSpec = serde_json::from_value(json!({
        "mongodb": {"install": false, "uri": "mongodb.shared:27017"}
    }))
    .unwrap();

    step(&store, instance(spec, None)).await;

    assert!(!store.contains(&kinds::deployment(), &mongodb_name(INSTANCE), NAMESPACE));
    assert!(store.contains(&kinds::deployment(), INSTANCE, NAMESPACE));
}

#[tokio::test]
async fn test_ingress_without_hostname_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let spec: MicrocksSpec = serde_json::from_value(json!({
        "commonExpositions": {"type": "Ingress"}
    }))
    .unwrap();

    let (action, primary) = step(&store, instance(spec, None)).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(primary.status.unwrap().status, Status::Error);
    assert!(store.names(&kinds::deployment()).is_empty());
}

#[tokio::test]
async fn test_deletion_releases_the_instance() {
    let store = Arc::new(InMemoryStore::new());
    let (_, mut primary) = step(&store, instance(MicrocksSpec::default(), None)).await;
    assert!(primary.metadata.finalizers.is_some());

    let now: Time = serde_json::from_value(json!("2026-01-01T00:00:00Z")).unwrap();
    primary.metadata.deletion_timestamp = Some(now);
    let (action, primary) = step(&store, primary).await;

    assert_eq!(action, Action::await_change());
    assert!(primary.metadata.finalizers.unwrap_or_default().is_empty());
}
