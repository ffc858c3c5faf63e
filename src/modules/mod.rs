//! # Modules
//!
//! Managed-resource producers of every Microcks module, plus exposition and
//! broker resolution. Producers are plain data-construction functions: they
//! read the resolved spec and return the desired object.

pub mod async_minion;
pub mod auth;
pub mod broker;
pub mod common;
pub mod database;
pub mod exposition;
pub mod microcks;
pub mod runner;

use crate::workflow::ModuleWorkflow;

/// Module workflows in reconcile order
#[must_use]
pub fn workflows() -> Vec<ModuleWorkflow> {
    vec![
        auth::workflow(),
        database::workflow(),
        microcks::workflow(),
        runner::workflow(),
        async_minion::workflow(),
    ]
}
