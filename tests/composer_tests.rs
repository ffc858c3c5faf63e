//! Defaulting cascade: built-in, minor-version, exact-version and user layers.

use microcks_operator::compose::{Composer, DirectoryDefaults, Merge, ResolvedSpec};
use microcks_operator::crd::MicrocksSpec;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn resolve(spec: serde_json::Value) -> ResolvedSpec {
    let spec: MicrocksSpec = serde_json::from_value(spec).unwrap();
    Composer::default().resolve(&spec).unwrap()
}

fn tag(image: Option<microcks_operator::crd::ImageSpec>) -> Option<String> {
    image.and_then(|i| i.tag)
}

/// Fresh directory under the system temp dir
fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("microcks-defaults-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(dir.join("modules")).unwrap();
    dir
}

#[test]
fn test_known_version_uses_minor_defaults() {
    let resolved = resolve(json!({"version": "1.10.1"}));

    assert_eq!(resolved.version(), "1.10.1");
    assert_eq!(tag(resolved.microcks().image).as_deref(), Some("1.10.1"));
    assert_eq!(tag(resolved.postman().image).as_deref(), Some("0.6.0"));
    assert_eq!(tag(resolved.keycloak().image).as_deref(), Some("26.0.0"));
    assert_eq!(
        resolved.microcks().image.and_then(|i| i.repository).as_deref(),
        Some("microcks/microcks")
    );
}

#[test]
fn test_unknown_version_falls_back_to_builtin() {
    let resolved = resolve(json!({"version": "9.9.9"}));

    assert_eq!(tag(resolved.microcks().image).as_deref(), Some("9.9.9"));
    assert_eq!(tag(resolved.postman().image).as_deref(), Some("latest"));
    assert!(resolved.keycloak_installed());
    assert!(resolved.mongodb_installed());
    assert!(!resolved.async_enabled());
}

#[test]
fn test_user_spec_wins_over_every_layer() {
    let resolved = resolve(json!({
        "version": "1.11.0",
        "keycloak": {"image": {"tag": "custom"}},
        "microcks": {"replicas": 3},
        "commonLabels": {"team": "qa", "app": "mocks"}
    }));

    assert_eq!(tag(resolved.keycloak().image).as_deref(), Some("custom"));
    // Sibling fields of an overridden node keep their defaults
    assert_eq!(
        resolved.keycloak().image.and_then(|i| i.registry).as_deref(),
        Some("quay.io")
    );
    assert_eq!(resolved.microcks().replicas, Some(3));

    let labels = resolved.common_labels();
    assert_eq!(labels["team"], "qa");
    assert_eq!(labels["app"], "mocks");
    assert_eq!(labels["app.kubernetes.io/managed-by"], "microcks-operator");
}

#[test]
fn test_directory_overrides_documents_file_by_file() {
    let dir = scratch_dir();
    std::fs::write(
        dir.join("modules").join("postman.yaml"),
        "postman:\n  replicas: 2\n  image:\n    registry: registry.local\n    repository: mirror/postman\n    tag: \"0.1.0\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("microcks-1.10.2.yaml"),
        "microcks:\n  image:\n    tag: \"{{version}}-patched\"\n",
    )
    .unwrap();

    let composer = Composer::new(Arc::new(DirectoryDefaults::load(&dir).unwrap()));
    let spec = MicrocksSpec {
        version: Some("1.10.2".to_string()),
        ..MicrocksSpec::default()
    };
    let resolved = composer.resolve(&spec).unwrap();

    assert_eq!(
        tag(resolved.microcks().image).as_deref(),
        Some("1.10.2-patched")
    );
    // The embedded 1.10 document still applies on top of the overridden module file
    assert_eq!(tag(resolved.postman().image).as_deref(), Some("0.6.0"));
    assert_eq!(
        resolved.postman().image.and_then(|i| i.registry).as_deref(),
        Some("registry.local")
    );
    assert_eq!(resolved.postman().replicas, Some(2));
    // Untouched modules keep the embedded documents
    assert_eq!(tag(resolved.keycloak().image).as_deref(), Some("26.0.0"));

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_malformed_directory_document_is_reported() {
    let dir = scratch_dir();
    std::fs::write(dir.join("microcks-default.yaml"), "commonLabels: [not, a, map]\n").unwrap();

    let composer = Composer::new(Arc::new(DirectoryDefaults::load(&dir).unwrap()));
    let err = composer.resolve(&MicrocksSpec::default()).unwrap_err();
    assert!(err.to_string().contains("microcks-default"));

    std::fs::remove_dir_all(dir).unwrap();
}

/// Sparse user document touching every merge kind
fn user_overrides() -> MicrocksSpec {
    serde_json::from_value(json!({
        "version": "1.11.0",
        "microcks": {
            "replicas": 2,
            "image": {"tag": "nightly"},
            "resources": {"limits": {"memory": "1Gi"}}
        },
        "mongodb": {
            "secretRef": {"secret": "mongo-credentials", "usernameKey": "user"}
        },
        "commonLabels": {"team": "qa"},
        "commonAnnotations": {"owner": "platform"}
    }))
    .unwrap()
}

#[test]
fn test_merge_is_idempotent_over_defaults() {
    let defaults = resolve(json!({})).spec().clone();
    let user = user_overrides();

    let once = MicrocksSpec::merge(&defaults, &user);
    let twice = MicrocksSpec::merge(&once, &user);

    assert_eq!(twice, once);
    assert_eq!(
        once.microcks.as_ref().and_then(|m| m.resources.clone()),
        user.microcks.as_ref().and_then(|m| m.resources.clone())
    );
    assert_eq!(
        once.mongodb.as_ref().and_then(|m| m.secret_ref.clone()),
        user.mongodb.as_ref().and_then(|m| m.secret_ref.clone())
    );
}

#[test]
fn test_merge_with_empty_overlay_is_identity() {
    let defaults = resolve(json!({})).spec().clone();

    assert_eq!(MicrocksSpec::merge(&defaults, &MicrocksSpec::default()), defaults);
}

#[test]
fn test_merge_over_empty_base_keeps_overlay() {
    let user = user_overrides();

    assert_eq!(MicrocksSpec::merge(&MicrocksSpec::default(), &user), user);
}
