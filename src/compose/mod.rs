//! # Configuration Composer
//!
//! Produces a [`ResolvedSpec`] from layered defaults and the user's sparse spec.
//!
//! Layers, each merged over the previous one:
//!
//! 1. Built-in defaults (global document, then one per module)
//! 2. Minor-version defaults (`microcks-1.10.yaml`), when present
//! 3. Exact-version defaults (`microcks-1.10.1.yaml`), when present
//! 4. The user spec

pub mod defaults;
pub mod merge;
mod resolved;

pub use defaults::{DefaultsDocument, DefaultsSource, DirectoryDefaults, EmbeddedDefaults};
pub use merge::Merge;
pub use resolved::ResolvedSpec;

use crate::constants::DEFAULT_MICROCKS_VERSION;
use crate::crd::MicrocksSpec;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Defaults document '{document}' is malformed: {source}")]
    Malformed {
        document: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Composer {
    source: Arc<dyn DefaultsSource>,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(Arc::new(EmbeddedDefaults))
    }
}

impl Composer {
    #[must_use]
    pub fn new(source: Arc<dyn DefaultsSource>) -> Self {
        Self { source }
    }

    /// Resolve a user spec against the defaulting cascade
    ///
    /// A missing version-specific document is not an error; the cascade
    /// simply continues with the layers that exist.
    pub fn resolve(&self, user: &MicrocksSpec) -> Result<ResolvedSpec, ComposeError> {
        let version = user
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_MICROCKS_VERSION)
            .to_string();

        let mut spec = MicrocksSpec::default();
        for document in self.source.builtin() {
            spec = MicrocksSpec::merge(&spec, &parse(&document, &version)?);
        }

        let minor = defaults::minor_version(&version);
        if let Some(minor) = &minor {
            match self.source.version_specific(minor) {
                Some(document) => {
                    debug!("Applying minor version defaults '{}'", document.name);
                    spec = MicrocksSpec::merge(&spec, &parse(&document, &version)?);
                }
                None => debug!("No defaults for minor version {}", minor),
            }
        }

        if minor.as_deref() != Some(version.as_str()) {
            match self.source.version_specific(&version) {
                Some(document) => {
                    debug!("Applying exact version defaults '{}'", document.name);
                    spec = MicrocksSpec::merge(&spec, &parse(&document, &version)?);
                }
                None => debug!("No defaults for version {}", version),
            }
        }

        let mut resolved = MicrocksSpec::merge(&spec, user);
        resolved.version = Some(version.clone());
        Ok(ResolvedSpec::new(version, resolved))
    }
}

fn parse(document: &DefaultsDocument, version: &str) -> Result<MicrocksSpec, ComposeError> {
    let rendered = defaults::render(&document.content, version);
    if rendered.trim().is_empty() {
        return Ok(MicrocksSpec::default());
    }
    serde_yaml::from_str(&rendered).map_err(|source| ComposeError::Malformed {
        document: document.name.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[derive(Debug)]
    struct BrokenDefaults;

    impl DefaultsSource for BrokenDefaults {
        fn builtin(&self) -> Vec<DefaultsDocument> {
            vec![DefaultsDocument {
                name: "broken".to_string(),
                content: Cow::Borrowed("microcks: [not, a, map]"),
            }]
        }

        fn version_specific(&self, _key: &str) -> Option<DefaultsDocument> {
            None
        }
    }

    #[test]
    fn test_default_version_applies_when_unset() {
        let resolved = Composer::default()
            .resolve(&MicrocksSpec::default())
            .unwrap();
        assert_eq!(resolved.version(), DEFAULT_MICROCKS_VERSION);
        assert_eq!(
            resolved.microcks().image.and_then(|i| i.tag).as_deref(),
            Some(DEFAULT_MICROCKS_VERSION)
        );
    }

    #[test]
    fn test_minor_version_layer_overrides_builtin() {
        let user = MicrocksSpec {
            version: Some("1.9.1".to_string()),
            ..MicrocksSpec::default()
        };
        let resolved = Composer::default().resolve(&user).unwrap();
        assert_eq!(
            resolved.keycloak().image.and_then(|i| i.tag).as_deref(),
            Some("24.0.4")
        );
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let composer = Composer::new(Arc::new(BrokenDefaults));
        let err = composer.resolve(&MicrocksSpec::default()).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
