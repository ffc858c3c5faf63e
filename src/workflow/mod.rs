//! # Module Workflows
//!
//! A Microcks instance is made of a fixed set of modules. Each module owns an
//! ordered list of managed-resource producers, an optional install
//! precondition and an optional readiness postcondition. The engine converges
//! every producer of a module and reports a [`ModuleResult`]; failures are
//! collected per producer and never stop sibling producers or modules.

mod engine;
mod producer;
mod result;

pub use engine::{ModuleWorkflow, ReadyPostcondition};
pub use producer::{FnProducer, ManagedResourceProducer};
pub use result::ModuleResult;

/// The components of a Microcks instance, in reconcile order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Module {
    Keycloak,
    Mongo,
    Microcks,
    Postman,
    AsyncMinion,
}

impl Module {
    pub const ALL: [Module; 5] = [
        Module::Keycloak,
        Module::Mongo,
        Module::Microcks,
        Module::Postman,
        Module::AsyncMinion,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Keycloak => "Keycloak",
            Module::Mongo => "Mongo",
            Module::Microcks => "Microcks",
            Module::Postman => "Postman",
            Module::AsyncMinion => "AsyncMinion",
        }
    }

    /// Condition tracking the rollout, e.g. `KeycloakDeploying`
    #[must_use]
    pub fn deploying_condition(&self) -> String {
        format!("{}Deploying", self.as_str())
    }

    /// Condition tracking readiness, e.g. `KeycloakReady`
    #[must_use]
    pub fn ready_condition(&self) -> String {
        format!("{}Ready", self.as_str())
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
