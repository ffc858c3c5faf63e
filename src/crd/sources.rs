//! # Source CRDs
//!
//! `APISource` and `SecretSource` push content into a running Microcks
//! instance. The target instance is named by the `microcks.io/instance`
//! annotation rather than a `spec` field.

use crate::crd::status::SourceStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API artifacts and importers to load into a Microcks instance
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "APISource",
    group = "microcks.io",
    version = "v1alpha1",
    namespaced,
    status = "SourceStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct APISourceSpec {
    /// One-shot artifact imports
    #[serde(default)]
    pub artifacts: Vec<ArtifactSpec>,
    /// Scheduled importer jobs
    #[serde(default)]
    pub importers: Vec<ImporterSpec>,
    /// Leave importer jobs in Microcks when this resource is deleted
    #[serde(default)]
    pub keep_importers_on_delete: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSpec {
    pub url: String,
    #[serde(default = "default_true")]
    pub main_artifact: bool,
    /// Name of a Microcks secret used to fetch the artifact
    #[serde(default)]
    pub secret_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImporterSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub main_artifact: bool,
    pub repository: RepositorySpec,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    pub url: String,
    #[serde(default)]
    pub secret_ref: Option<String>,
    #[serde(default, rename = "disableSSLValidation")]
    pub disable_ssl_validation: bool,
}

/// Secrets Microcks uses to reach protected repositories and endpoints
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "SecretSource",
    group = "microcks.io",
    version = "v1alpha1",
    namespaced,
    status = "SourceStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SecretSourceSpec {
    #[serde(default)]
    pub secrets: Vec<SecretSpec>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_header: Option<String>,
    #[serde(default)]
    pub ca_cert_pem: Option<String>,
}

fn default_true() -> bool {
    true
}
