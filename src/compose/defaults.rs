//! # Defaults Sources
//!
//! Raw YAML documents feeding the defaulting cascade.
//!
//! Built-in documents are embedded in the binary: one global document plus
//! one document per module. Version-specific documents are looked up by key,
//! either a minor version (`1.10`) or an exact version (`1.10.1`).
//! A directory can override any of them file by file.

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Placeholder substituted with the requested version in every document
pub const VERSION_PLACEHOLDER: &str = "{{version}}";

const GLOBAL_DEFAULTS: (&str, &str) = (
    "microcks-default",
    include_str!("../../defaults/microcks-default.yaml"),
);

const MODULE_DEFAULTS: [(&str, &str); 5] = [
    (
        "modules/keycloak",
        include_str!("../../defaults/modules/keycloak.yaml"),
    ),
    (
        "modules/mongodb",
        include_str!("../../defaults/modules/mongodb.yaml"),
    ),
    (
        "modules/microcks",
        include_str!("../../defaults/modules/microcks.yaml"),
    ),
    (
        "modules/postman",
        include_str!("../../defaults/modules/postman.yaml"),
    ),
    (
        "modules/async",
        include_str!("../../defaults/modules/async.yaml"),
    ),
];

/// A named defaults document
#[derive(Debug, Clone)]
pub struct DefaultsDocument {
    pub name: String,
    pub content: Cow<'static, str>,
}

/// Supplies defaults documents to the composer
pub trait DefaultsSource: Send + Sync + std::fmt::Debug {
    /// Global document first, then per-module documents
    fn builtin(&self) -> Vec<DefaultsDocument>;

    /// Document for a minor (`1.10`) or exact (`1.10.1`) version, if any
    fn version_specific(&self, key: &str) -> Option<DefaultsDocument>;
}

/// Documents compiled into the operator binary
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedDefaults;

impl DefaultsSource for EmbeddedDefaults {
    fn builtin(&self) -> Vec<DefaultsDocument> {
        std::iter::once(GLOBAL_DEFAULTS)
            .chain(MODULE_DEFAULTS)
            .map(|(name, content)| DefaultsDocument {
                name: name.to_string(),
                content: Cow::Borrowed(content),
            })
            .collect()
    }

    fn version_specific(&self, key: &str) -> Option<DefaultsDocument> {
        let content = match key {
            "1.9" => include_str!("../../defaults/microcks-1.9.yaml"),
            "1.10" => include_str!("../../defaults/microcks-1.10.yaml"),
            "1.11" => include_str!("../../defaults/microcks-1.11.yaml"),
            _ => return None,
        };
        Some(DefaultsDocument {
            name: format!("microcks-{key}"),
            content: Cow::Borrowed(content),
        })
    }
}

/// Documents read once from a directory, falling back to the embedded set
///
/// Layout mirrors the embedded one: `microcks-default.yaml`,
/// `modules/<module>.yaml` and `microcks-<version>.yaml`.
#[derive(Debug, Clone, Default)]
pub struct DirectoryDefaults {
    documents: BTreeMap<String, String>,
}

impl DirectoryDefaults {
    /// Load every `.yaml` document under `dir` (one level of `modules/`)
    pub fn load(dir: &Path) -> Result<Self> {
        let mut documents = BTreeMap::new();
        for (prefix, path) in [("", dir.to_path_buf()), ("modules/", dir.join("modules"))] {
            if !path.is_dir() {
                continue;
            }
            let entries = std::fs::read_dir(&path)
                .with_context(|| format!("Failed to read defaults directory {}", path.display()))?;
            for entry in entries {
                let entry = entry.context("Failed to read defaults directory entry")?;
                let file_path = entry.path();
                if file_path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let Some(stem) = file_path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let content = std::fs::read_to_string(&file_path).with_context(|| {
                    format!("Failed to read defaults document {}", file_path.display())
                })?;
                debug!("Loaded defaults document {}{}", prefix, stem);
                documents.insert(format!("{prefix}{stem}"), content);
            }
        }
        info!(
            "Loaded {} defaults documents from {}",
            documents.len(),
            dir.display()
        );
        Ok(Self { documents })
    }

    fn lookup(&self, name: &str) -> Option<DefaultsDocument> {
        self.documents.get(name).map(|content| DefaultsDocument {
            name: name.to_string(),
            content: Cow::Owned(content.clone()),
        })
    }
}

impl DefaultsSource for DirectoryDefaults {
    fn builtin(&self) -> Vec<DefaultsDocument> {
        EmbeddedDefaults
            .builtin()
            .into_iter()
            .map(|embedded| self.lookup(&embedded.name).unwrap_or(embedded))
            .collect()
    }

    fn version_specific(&self, key: &str) -> Option<DefaultsDocument> {
        self.lookup(&format!("microcks-{key}"))
            .or_else(|| EmbeddedDefaults.version_specific(key))
    }
}

/// Minor version key, e.g. `1.10` for `1.10.1`
#[must_use]
pub fn minor_version(version: &str) -> Option<String> {
    let mut parts = version.split('.');
    let major = parts.next().filter(|p| !p.is_empty())?;
    let minor = parts.next().filter(|p| !p.is_empty())?;
    Some(format!("{major}.{minor}"))
}

/// Replace the version placeholder in a document
#[must_use]
pub fn render(document: &str, version: &str) -> String {
    document.replace(VERSION_PLACEHOLDER, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_version() {
        assert_eq!(minor_version("1.10.1").as_deref(), Some("1.10"));
        assert_eq!(minor_version("1.10").as_deref(), Some("1.10"));
        assert_eq!(minor_version("nightly"), None);
        assert_eq!(minor_version(""), None);
    }

    #[test]
    fn test_render_substitutes_every_occurrence() {
        let doc = "a: \"{{version}}\"\nb: \"{{version}}\"";
        assert_eq!(render(doc, "9.9.9"), "a: \"9.9.9\"\nb: \"9.9.9\"");
    }

    #[test]
    fn test_embedded_builtin_order() {
        let names: Vec<String> = EmbeddedDefaults
            .builtin()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names[0], "microcks-default");
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_embedded_unknown_version_is_absent() {
        assert!(EmbeddedDefaults.version_specific("9.9").is_none());
        assert!(EmbeddedDefaults.version_specific("1.10").is_some());
    }

    #[test]
    fn test_directory_falls_back_to_embedded() {
        let defaults = DirectoryDefaults::default();
        assert_eq!(defaults.builtin().len(), 6);
        assert!(defaults.version_specific("1.10").is_some());
    }
}
