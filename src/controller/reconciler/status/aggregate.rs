//! # Readiness Aggregation
//!
//! Folds module results into the `{Module}Deploying` / `{Module}Ready`
//! conditions and derives the global status of a `Microcks` instance.

use super::conditions::{find, upsert_and_timestamp};
use crate::crd::{HasConditions, Status};
use crate::workflow::{Module, ModuleResult};

/// Record one module's outcome in its conditions
///
/// A module that is not installed leaves its conditions untouched.
pub fn handle_result<S: HasConditions>(status: &mut S, result: &ModuleResult) {
    if !result.installed {
        return;
    }

    let deploying = result.module.deploying_condition();
    let ready = result.module.ready_condition();

    if result.has_errors() {
        let message = format!(
            "{} resources failed: {}",
            result.module,
            result.error_summary()
        );
        upsert_and_timestamp(
            status,
            &deploying,
            Status::Error,
            Some("ResourceError"),
            Some(message.clone()),
        );
        upsert_and_timestamp(status, &ready, Status::Error, Some("ResourceError"), Some(message));
    } else if result.ready {
        upsert_and_timestamp(
            status,
            &deploying,
            Status::Ready,
            Some("Deployed"),
            Some("deployment complete".to_string()),
        );
        upsert_and_timestamp(status, &ready, Status::Ready, Some("Ready"), None);
    } else {
        let waiting = result
            .not_ready
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!("waiting for {waiting}");
        upsert_and_timestamp(
            status,
            &deploying,
            Status::Deploying,
            Some("Rollout"),
            Some(message.clone()),
        );
        upsert_and_timestamp(status, &ready, Status::Deploying, Some("Rollout"), Some(message));
    }
}

/// Global status from the installed modules' `{Module}Ready` conditions
///
/// `Error` wins over `Deploying`, which wins over `Ready`. A broker failure
/// counts as an error.
#[must_use]
pub fn aggregate<S: HasConditions>(status: &S, installed: &[Module], broker_failed: bool) -> Status {
    let states: Vec<Status> = installed
        .iter()
        .map(|module| {
            find(status, &module.ready_condition()).map_or(Status::Unknown, |c| c.status)
        })
        .collect();

    if broker_failed || states.contains(&Status::Error) {
        Status::Error
    } else if states.iter().all(|s| *s == Status::Ready) {
        Status::Ready
    } else {
        Status::Deploying
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::MicrocksStatus;

    fn result(module: Module, ready: bool, errored: &[(&str, &str)]) -> ModuleResult {
        ModuleResult {
            installed: true,
            ready,
            errored: errored
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..ModuleResult::not_installed(module)
        }
    }

    #[test]
    fn test_not_installed_leaves_conditions() {
        let mut status = MicrocksStatus::default();
        handle_result(&mut status, &ModuleResult::not_installed(Module::AsyncMinion));
        assert!(status.conditions.is_empty());
    }

    #[test]
    fn test_errored_module_lists_failures() {
        let mut status = MicrocksStatus::default();
        handle_result(
            &mut status,
            &result(Module::Mongo, false, &[("mongodb-deployment", "quota exceeded")]),
        );
        let ready = find(&status, "MongoReady").unwrap();
        assert_eq!(ready.status, Status::Error);
        assert!(ready
            .message
            .as_deref()
            .unwrap()
            .contains("mongodb-deployment: quota exceeded"));
        assert_eq!(find(&status, "MongoDeploying").unwrap().status, Status::Error);
    }

    #[test]
    fn test_ready_module_reports_deployment_complete() {
        let mut status = MicrocksStatus::default();
        handle_result(&mut status, &result(Module::Microcks, true, &[]));
        let deploying = find(&status, "MicrocksDeploying").unwrap();
        assert_eq!(deploying.status, Status::Ready);
        assert_eq!(deploying.message.as_deref(), Some("deployment complete"));
    }

    #[test]
    fn test_aggregate_precedence() {
        let mut status = MicrocksStatus::default();
        let installed = [Module::Keycloak, Module::Microcks];

        handle_result(&mut status, &result(Module::Keycloak, true, &[]));
        handle_result(&mut status, &result(Module::Microcks, false, &[]));
        assert_eq!(aggregate(&status, &installed, false), Status::Deploying);

        handle_result(&mut status, &result(Module::Microcks, true, &[]));
        assert_eq!(aggregate(&status, &installed, false), Status::Ready);
        assert_eq!(aggregate(&status, &installed, true), Status::Error);

        handle_result(&mut status, &result(Module::Keycloak, false, &[("keycloak-service", "x")]));
        assert_eq!(aggregate(&status, &installed, false), Status::Error);

        // Flips back once the module recovers
        handle_result(&mut status, &result(Module::Keycloak, true, &[]));
        assert_eq!(aggregate(&status, &installed, false), Status::Ready);
    }
}
