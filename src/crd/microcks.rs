//! # Microcks CRD
//!
//! The primary resource. Every spec field is optional so a user document
//! only states what differs from the layered defaults.

use crate::crd::status::MicrocksStatus;
use crate::impl_merge;
use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Microcks instance specification
///
/// # Example
///
/// ```yaml
/// apiVersion: microcks.io/v1alpha1
/// kind: Microcks
/// metadata:
///   name: microcks
///   namespace: microcks
/// spec:
///   version: 1.10.1
///   microcks:
///     url: microcks.example.com
///   keycloak:
///     url: keycloak.example.com
///   commonExpositions:
///     type: Ingress
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Microcks",
    group = "microcks.io",
    version = "v1alpha1",
    namespaced,
    status = "MicrocksStatus",
    shortname = "mcks",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.microcksUrl"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MicrocksSpec {
    /// Microcks version to deploy; selects version-specific defaults
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub microcks: Option<MicrocksServiceSpec>,
    #[serde(default)]
    pub postman: Option<PostmanSpec>,
    #[serde(default)]
    pub keycloak: Option<KeycloakSpec>,
    #[serde(default)]
    pub mongodb: Option<MongoDbSpec>,
    #[serde(default)]
    pub features: Option<FeaturesSpec>,
    #[serde(default)]
    pub common_expositions: Option<CommonExpositionsSpec>,
    /// Labels added to every managed resource
    #[serde(default)]
    pub common_labels: Option<BTreeMap<String, String>>,
    /// Annotations added to every managed resource
    #[serde(default)]
    pub common_annotations: Option<BTreeMap<String, String>>,
}

impl_merge!(MicrocksSpec {
    version => primitive,
    microcks => composite,
    postman => composite,
    keycloak => composite,
    mongodb => composite,
    features => composite,
    common_expositions => composite,
    common_labels => map,
    common_annotations => map,
});

/// Container image coordinates
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    /// Takes precedence over `tag` when set
    #[serde(default)]
    pub digest: Option<String>,
}

impl_merge!(ImageSpec {
    registry => primitive,
    repository => primitive,
    tag => primitive,
    digest => primitive,
});

impl ImageSpec {
    /// Full image reference, e.g. `quay.io/microcks/microcks:1.10.1`
    #[must_use]
    pub fn reference(&self) -> String {
        let repository = self.repository.as_deref().unwrap_or_default();
        let name = match self.registry.as_deref() {
            Some(registry) if !registry.is_empty() => format!("{registry}/{repository}"),
            _ => repository.to_string(),
        };
        match (self.digest.as_deref(), self.tag.as_deref()) {
            (Some(digest), _) if !digest.is_empty() => format!("{name}@{digest}"),
            (_, Some(tag)) if !tag.is_empty() => format!("{name}:{tag}"),
            _ => name,
        }
    }
}

/// Per-service ingress settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Create the exposition object for this service
    #[serde(default)]
    pub expose: Option<bool>,
    #[serde(default)]
    pub class_name: Option<String>,
    /// Existing TLS secret; when absent a certificate is expected from annotations
    #[serde(default)]
    pub secret_ref: Option<String>,
    #[serde(default)]
    pub generate_cert: Option<bool>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl_merge!(IngressSpec {
    expose => primitive,
    class_name => primitive,
    secret_ref => primitive,
    generate_cert => primitive,
    annotations => map,
});

/// Core Microcks service
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MicrocksServiceSpec {
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
    /// External hostname, required for every exposition type but `None`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub mock_invocation_stats: Option<bool>,
}

impl_merge!(MicrocksServiceSpec {
    replicas => primitive,
    image => composite,
    url => primitive,
    ingress => composite,
    resources => opaque,
    log_level => primitive,
    mock_invocation_stats => primitive,
});

/// Postman runtime used for `POSTMAN` tests
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostmanSpec {
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

impl_merge!(PostmanSpec {
    replicas => primitive,
    image => composite,
    resources => opaque,
});

/// Keycloak authentication server
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakSpec {
    /// Install a dedicated Keycloak; when false an external one is referenced by `url`
    #[serde(default)]
    pub install: Option<bool>,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// In-cluster URL used by the operator when Keycloak is external
    #[serde(default)]
    pub private_url: Option<String>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub volume_size: Option<String>,
    #[serde(default)]
    pub storage_class_name: Option<String>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    /// Client id of the service account used by the operator
    #[serde(default)]
    pub service_account: Option<String>,
    /// Fixed client secret; generated once when absent
    #[serde(default)]
    pub service_account_credentials: Option<String>,
}

impl_merge!(KeycloakSpec {
    install => primitive,
    realm => primitive,
    url => primitive,
    private_url => primitive,
    image => composite,
    persistent => primitive,
    volume_size => primitive,
    storage_class_name => primitive,
    ingress => composite,
    resources => opaque,
    service_account => primitive,
    service_account_credentials => primitive,
});

/// Reference to a user-managed secret holding credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReferenceSpec {
    pub secret: String,
    #[serde(default)]
    pub username_key: Option<String>,
    #[serde(default)]
    pub password_key: Option<String>,
}

/// MongoDB database
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongoDbSpec {
    #[serde(default)]
    pub install: Option<bool>,
    /// Connection host when not installed
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub secret_ref: Option<SecretReferenceSpec>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub volume_size: Option<String>,
    #[serde(default)]
    pub storage_class_name: Option<String>,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

impl_merge!(MongoDbSpec {
    install => primitive,
    uri => primitive,
    database => primitive,
    secret_ref => opaque,
    image => composite,
    persistent => primitive,
    volume_size => primitive,
    storage_class_name => primitive,
    resources => opaque,
});

/// Optional features
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesSpec {
    #[serde(default, rename = "async")]
    pub async_api: Option<AsyncFeatureSpec>,
    #[serde(default)]
    pub microcks_hub: Option<MicrocksHubSpec>,
}

impl_merge!(FeaturesSpec {
    async_api => composite,
    microcks_hub => composite,
});

/// Async API minion and its message broker
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AsyncFeatureSpec {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
    #[serde(default)]
    pub default_binding: Option<String>,
    /// Publication frequency of async mocks, in seconds
    #[serde(default)]
    pub default_frequency: Option<i32>,
    #[serde(default)]
    pub kafka: Option<KafkaSpec>,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

impl_merge!(AsyncFeatureSpec {
    enabled => primitive,
    image => composite,
    default_binding => primitive,
    default_frequency => primitive,
    kafka => composite,
    resources => opaque,
});

/// Kafka broker, installed through Strimzi resources
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaSpec {
    #[serde(default)]
    pub install: Option<bool>,
    /// Bootstrap servers of an external broker
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub volume_size: Option<String>,
}

impl_merge!(KafkaSpec {
    install => primitive,
    url => primitive,
    replicas => primitive,
    persistent => primitive,
    volume_size => primitive,
});

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MicrocksHubSpec {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub allowed_roles: Option<Vec<String>>,
}

impl_merge!(MicrocksHubSpec {
    enabled => primitive,
    allowed_roles => primitive,
});

/// How services are exposed outside the cluster
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub enum ExpositionType {
    #[default]
    None,
    Ingress,
    GatewayRoute,
    Route,
}

impl ExpositionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpositionType::None => "None",
            ExpositionType::Ingress => "Ingress",
            ExpositionType::GatewayRoute => "GatewayRoute",
            ExpositionType::Route => "Route",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonExpositionsSpec {
    #[serde(default, rename = "type")]
    pub r#type: Option<ExpositionType>,
    #[serde(default)]
    pub gateway_ref: Option<GatewayRefSpec>,
}

impl_merge!(CommonExpositionsSpec {
    r#type => primitive,
    gateway_ref => composite,
});

/// Parent gateway for `GatewayRoute` exposition
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRefSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub section_name: Option<String>,
}

impl_merge!(GatewayRefSpec {
    name => primitive,
    namespace => primitive,
    section_name => primitive,
});
