use crate::compose::ResolvedSpec;
use crate::crd::Microcks;
use crate::store::UpdatePolicy;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;

/// Builds one managed object of a module
pub trait ManagedResourceProducer: Send + Sync {
    /// Stable identifier, used in results and condition messages
    fn id(&self) -> &'static str;

    fn api_resource(&self) -> ApiResource;

    /// Name of the produced object for a given primary
    fn secondary_name(&self, primary: &Microcks) -> String;

    /// Desired object, or `None` when it does not apply to this spec
    ///
    /// `actual` is only fetched for producers that [`reads_actual`](Self::reads_actual).
    fn desired(
        &self,
        resolved: &ResolvedSpec,
        primary: &Microcks,
        actual: Option<&DynamicObject>,
    ) -> anyhow::Result<Option<DynamicObject>>;

    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Converge
    }

    /// Whether the desired object depends on the one already stored
    fn reads_actual(&self) -> bool {
        false
    }
}

pub type NameFn = fn(&str) -> String;
pub type BuildFn = fn(&ResolvedSpec, &Microcks) -> anyhow::Result<Option<DynamicObject>>;
pub type RebuildFn =
    fn(&ResolvedSpec, &Microcks, Option<&DynamicObject>) -> anyhow::Result<Option<DynamicObject>>;

#[derive(Debug, Clone, Copy)]
enum Build {
    Fresh(BuildFn),
    /// Carries state over from the stored object (generated credentials)
    FromActual(RebuildFn),
}

/// Producer assembled from plain functions
#[derive(Debug, Clone)]
pub struct FnProducer {
    id: &'static str,
    kind: fn() -> ApiResource,
    name: NameFn,
    build: Build,
    policy: UpdatePolicy,
}

impl FnProducer {
    #[must_use]
    pub fn new(id: &'static str, kind: fn() -> ApiResource, name: NameFn, build: BuildFn) -> Self {
        Self {
            id,
            kind,
            name,
            build: Build::Fresh(build),
            policy: UpdatePolicy::Converge,
        }
    }

    /// Producer whose build sees the currently stored object
    #[must_use]
    pub fn from_actual(
        id: &'static str,
        kind: fn() -> ApiResource,
        name: NameFn,
        build: RebuildFn,
    ) -> Self {
        Self {
            id,
            kind,
            name,
            build: Build::FromActual(build),
            policy: UpdatePolicy::Converge,
        }
    }

    /// Never update the object once created
    #[must_use]
    pub fn create_only(mut self) -> Self {
        self.policy = UpdatePolicy::CreateOnly;
        self
    }
}

impl ManagedResourceProducer for FnProducer {
    fn id(&self) -> &'static str {
        self.id
    }

    fn api_resource(&self) -> ApiResource {
        (self.kind)()
    }

    fn secondary_name(&self, primary: &Microcks) -> String {
        (self.name)(&primary.name_any())
    }

    fn desired(
        &self,
        resolved: &ResolvedSpec,
        primary: &Microcks,
        actual: Option<&DynamicObject>,
    ) -> anyhow::Result<Option<DynamicObject>> {
        match self.build {
            Build::Fresh(build) => build(resolved, primary),
            Build::FromActual(build) => build(resolved, primary, actual),
        }
    }

    fn update_policy(&self) -> UpdatePolicy {
        self.policy
    }

    fn reads_actual(&self) -> bool {
        matches!(self.build, Build::FromActual(_))
    }
}
