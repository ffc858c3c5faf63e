//! # Instance Binding
//!
//! Resolves the `Microcks` instance a satellite resource targets and prepares
//! an authenticated API client for it.

use crate::client::RemoteInstanceApi;
use crate::compose::ResolvedSpec;
use crate::constants::{INSTANCE_ANNOTATION, INSTANCE_NAMESPACE_ANNOTATION};
use crate::controller::reconciler::auth::obtain_token;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Microcks, Status};
use crate::store::{get_typed, kinds};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

/// Instance named by a satellite's annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceReference {
    pub name: String,
    pub namespace: String,
}

/// A ready instance together with an authenticated client
pub struct BoundInstance {
    pub instance: Microcks,
    pub resolved: ResolvedSpec,
    pub api: Arc<dyn RemoteInstanceApi>,
    pub token: String,
}

impl std::fmt::Debug for BoundInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundInstance")
            .field("instance", &self.instance.name_any())
            .field("token", &"***")
            .finish_non_exhaustive()
    }
}

impl BoundInstance {
    /// Public URL of the instance, as recorded in its status
    #[must_use]
    pub fn microcks_url(&self) -> Option<&str> {
        self.instance
            .status
            .as_ref()
            .and_then(|s| s.microcks_url.as_deref())
    }
}

/// Read the instance reference from a satellite's annotations
///
/// # Errors
///
/// `Validation` when the `microcks.io/instance` annotation is missing.
pub fn instance_reference(satellite: &ObjectMeta) -> Result<InstanceReference, ReconcilerError> {
    let annotations = satellite.annotations.as_ref();
    let name = annotations
        .and_then(|a| a.get(INSTANCE_ANNOTATION))
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ReconcilerError::Validation(format!(
                "Missing annotation '{INSTANCE_ANNOTATION}' naming the target Microcks instance"
            ))
        })?;
    let namespace = annotations
        .and_then(|a| a.get(INSTANCE_NAMESPACE_ANNOTATION))
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .or(satellite.namespace.as_deref())
        .unwrap_or("default");
    Ok(InstanceReference {
        name: name.to_string(),
        namespace: namespace.to_string(),
    })
}

/// Resolve the instance a satellite targets; it must exist and be ready
///
/// # Errors
///
/// `Validation` for a missing reference, `NotFound` for an unknown instance
/// and `NotReady` while the instance is still converging.
pub async fn resolve_instance(
    satellite: &ObjectMeta,
    ctx: &Reconciler,
) -> Result<Microcks, ReconcilerError> {
    let reference = instance_reference(satellite)?;
    let instance: Microcks = get_typed(
        ctx.store.as_ref(),
        &kinds::microcks(),
        &reference.name,
        &reference.namespace,
    )
    .await?
    .ok_or_else(|| {
        ReconcilerError::NotFound(format!(
            "Microcks instance '{}' not found in namespace '{}'",
            reference.name, reference.namespace
        ))
    })?;

    let status = instance
        .status
        .as_ref()
        .map_or(Status::Unknown, |s| s.status);
    if status != Status::Ready {
        return Err(ReconcilerError::NotReady(format!(
            "Microcks instance '{}' is not ready yet (status: {})",
            reference.name,
            status.as_str()
        )));
    }

    debug!(
        "Bound to Microcks instance {}/{}",
        reference.namespace, reference.name
    );
    Ok(instance)
}

/// Resolve the instance and authenticate against its API
///
/// # Errors
///
/// Binding failures as in [`resolve_instance`], plus configuration and
/// authentication failures.
pub async fn bind(satellite: &ObjectMeta, ctx: &Reconciler) -> Result<BoundInstance, ReconcilerError> {
    let instance = resolve_instance(satellite, ctx).await?;
    let resolved = ctx.composer.resolve(&instance.spec)?;
    let name = instance.name_any();
    let namespace = instance.namespace().unwrap_or_default();
    let api = ctx.remote.for_instance(&name, &namespace)?;
    let token = obtain_token(ctx, satellite, &instance, &resolved, api.as_ref()).await?;
    Ok(BoundInstance {
        instance,
        resolved,
        api,
        token,
    })
}
