//! # Resolved Spec
//!
//! Output of the defaulting cascade, scoped to a single reconcile.

use crate::crd::{
    AsyncFeatureSpec, ExpositionType, KafkaSpec, KeycloakSpec, MicrocksServiceSpec, MicrocksSpec,
    MongoDbSpec, PostmanSpec,
};
use crate::modules::exposition::Exposition;
use std::collections::BTreeMap;
use std::ops::Deref;

/// A spec with defaults applied, plus the resolved exposition
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpec {
    version: String,
    spec: MicrocksSpec,
    exposition: Exposition,
}

impl ResolvedSpec {
    #[must_use]
    pub fn new(version: String, spec: MicrocksSpec) -> Self {
        Self {
            version,
            spec,
            exposition: Exposition::default(),
        }
    }

    #[must_use]
    pub fn with_exposition(mut self, exposition: Exposition) -> Self {
        self.exposition = exposition;
        self
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn spec(&self) -> &MicrocksSpec {
        &self.spec
    }

    #[must_use]
    pub fn exposition(&self) -> &Exposition {
        &self.exposition
    }

    #[must_use]
    pub fn microcks(&self) -> MicrocksServiceSpec {
        self.spec.microcks.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn postman(&self) -> PostmanSpec {
        self.spec.postman.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn keycloak(&self) -> KeycloakSpec {
        self.spec.keycloak.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn mongodb(&self) -> MongoDbSpec {
        self.spec.mongodb.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn async_feature(&self) -> AsyncFeatureSpec {
        self.spec
            .features
            .as_ref()
            .and_then(|f| f.async_api.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn kafka(&self) -> KafkaSpec {
        self.async_feature().kafka.unwrap_or_default()
    }

    #[must_use]
    pub fn keycloak_installed(&self) -> bool {
        self.keycloak().install.unwrap_or(false)
    }

    #[must_use]
    pub fn mongodb_installed(&self) -> bool {
        self.mongodb().install.unwrap_or(false)
    }

    #[must_use]
    pub fn async_enabled(&self) -> bool {
        self.async_feature().enabled.unwrap_or(false)
    }

    /// Broker resources are only installed alongside the async minion
    #[must_use]
    pub fn kafka_installed(&self) -> bool {
        self.async_enabled() && self.kafka().install.unwrap_or(false)
    }

    #[must_use]
    pub fn exposition_type(&self) -> ExpositionType {
        self.spec
            .common_expositions
            .as_ref()
            .and_then(|e| e.r#type)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn common_labels(&self) -> BTreeMap<String, String> {
        self.spec.common_labels.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn common_annotations(&self) -> BTreeMap<String, String> {
        self.spec.common_annotations.clone().unwrap_or_default()
    }
}

impl Deref for ResolvedSpec {
    type Target = MicrocksSpec;

    fn deref(&self) -> &Self::Target {
        &self.spec
    }
}
