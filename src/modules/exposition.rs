//! # Exposition
//!
//! Resolves how the instance is reached from outside the cluster and the
//! URLs reported in status.

use crate::compose::ResolvedSpec;
use crate::constants::{KEYCLOAK_HTTP_PORT, MICROCKS_HTTP_PORT};
use crate::crd::ExpositionType;
use thiserror::Error;

/// Resolved exposition of one instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exposition {
    pub mode: ExpositionType,
    /// Base URL of the Microcks UI and API, with scheme
    pub microcks_url: Option<String>,
    /// Base URL of Keycloak as seen by browsers, with scheme
    pub keycloak_url: Option<String>,
}

impl Exposition {
    /// External hostname of Microcks, without scheme
    #[must_use]
    pub fn microcks_host(&self) -> Option<&str> {
        self.microcks_url.as_deref().map(strip_scheme)
    }

    #[must_use]
    pub fn keycloak_host(&self) -> Option<&str> {
        self.keycloak_url.as_deref().map(strip_scheme)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpositionError {
    #[error(
        "Exposition type '{0}' requires 'spec.microcks.url' to be set to the external hostname of Microcks"
    )]
    MissingMicrocksUrl(&'static str),
    #[error(
        "Exposition type '{0}' with an installed Keycloak requires 'spec.keycloak.url' to be set to the external hostname of Keycloak"
    )]
    MissingKeycloakUrl(&'static str),
}

/// Resolve the exposition of an instance
///
/// Every mode but `None` publishes hostnames, so the hostnames must be given.
/// With `None`, status reports the in-cluster service URLs instead.
pub fn resolve_exposition(
    resolved: &ResolvedSpec,
    name: &str,
    namespace: &str,
) -> Result<Exposition, ExpositionError> {
    let mode = resolved.exposition_type();
    let microcks_url = non_empty(resolved.microcks().url);
    let keycloak = resolved.keycloak();
    let keycloak_url = non_empty(keycloak.url);
    let keycloak_installed = resolved.keycloak_installed();

    if mode == ExpositionType::None {
        return Ok(Exposition {
            mode,
            microcks_url: Some(
                microcks_url
                    .map(|u| with_scheme(&u))
                    .unwrap_or_else(|| microcks_service_url(name, namespace)),
            ),
            keycloak_url: match keycloak_url {
                Some(url) => Some(with_scheme(&url)),
                None if keycloak_installed => Some(keycloak_service_url(name, namespace)),
                None => None,
            },
        });
    }

    let microcks_url = microcks_url.ok_or(ExpositionError::MissingMicrocksUrl(mode.as_str()))?;
    let keycloak_url = match keycloak_url {
        Some(url) => Some(with_scheme(&url)),
        None if keycloak_installed => {
            return Err(ExpositionError::MissingKeycloakUrl(mode.as_str()));
        }
        None => None,
    };

    Ok(Exposition {
        mode,
        microcks_url: Some(with_scheme(&microcks_url)),
        keycloak_url,
    })
}

/// In-cluster URL of the Microcks service
#[must_use]
pub fn microcks_service_url(name: &str, namespace: &str) -> String {
    format!("http://{name}.{namespace}.svc.cluster.local:{MICROCKS_HTTP_PORT}")
}

/// In-cluster URL of an installed Keycloak
#[must_use]
pub fn keycloak_service_url(name: &str, namespace: &str) -> String {
    format!("http://{name}-keycloak.{namespace}.svc.cluster.local:{KEYCLOAK_HTTP_PORT}")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", url.trim_end_matches('/'))
    }
}

fn strip_scheme(url: &str) -> &str {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;
    use crate::crd::{CommonExpositionsSpec, MicrocksServiceSpec, MicrocksSpec};

    fn resolve(spec: MicrocksSpec) -> ResolvedSpec {
        Composer::default().resolve(&spec).unwrap()
    }

    fn exposed(mode: ExpositionType) -> MicrocksSpec {
        MicrocksSpec {
            common_expositions: Some(CommonExpositionsSpec {
                r#type: Some(mode),
                ..CommonExpositionsSpec::default()
            }),
            ..MicrocksSpec::default()
        }
    }

    #[test]
    fn test_none_mode_reports_service_urls() {
        let exposition = resolve_exposition(&resolve(MicrocksSpec::default()), "mcks", "ns").unwrap();
        assert_eq!(
            exposition.microcks_url.as_deref(),
            Some("http://mcks.ns.svc.cluster.local:8080")
        );
        assert_eq!(
            exposition.keycloak_url.as_deref(),
            Some("http://mcks-keycloak.ns.svc.cluster.local:8080")
        );
    }

    #[test]
    fn test_ingress_without_microcks_url_names_the_field() {
        let err = resolve_exposition(&resolve(exposed(ExpositionType::Ingress)), "mcks", "ns")
            .unwrap_err();
        assert_eq!(err, ExpositionError::MissingMicrocksUrl("Ingress"));
        assert!(err.to_string().contains("spec.microcks.url"));
    }

    #[test]
    fn test_route_with_installed_keycloak_needs_keycloak_url() {
        let mut spec = exposed(ExpositionType::Route);
        spec.microcks = Some(MicrocksServiceSpec {
            url: Some("microcks.example.com".to_string()),
            ..MicrocksServiceSpec::default()
        });
        let err = resolve_exposition(&resolve(spec), "mcks", "ns").unwrap_err();
        assert!(err.to_string().contains("spec.keycloak.url"));
    }

    #[test]
    fn test_hostnames_get_https_scheme() {
        let mut spec = exposed(ExpositionType::GatewayRoute);
        spec.microcks = Some(MicrocksServiceSpec {
            url: Some("microcks.example.com".to_string()),
            ..MicrocksServiceSpec::default()
        });
        spec.keycloak = Some(crate::crd::KeycloakSpec {
            url: Some("keycloak.example.com".to_string()),
            ..crate::crd::KeycloakSpec::default()
        });
        let exposition = resolve_exposition(&resolve(spec), "mcks", "ns").unwrap();
        assert_eq!(exposition.microcks_url.as_deref(), Some("https://microcks.example.com"));
        assert_eq!(exposition.keycloak_host(), Some("keycloak.example.com"));
    }
}
