use super::Module;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of one module workflow pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleResult {
    pub module: Module,
    /// False when the install precondition did not hold
    pub installed: bool,
    /// Producers whose object converged
    pub produced_ok: BTreeSet<String>,
    /// Producers whose object exists but failed the readiness postcondition
    pub not_ready: BTreeSet<String>,
    /// Producer id -> error message
    pub errored: BTreeMap<String, String>,
    pub ready: bool,
}

impl ModuleResult {
    #[must_use]
    pub fn not_installed(module: Module) -> Self {
        Self {
            module,
            installed: false,
            produced_ok: BTreeSet::new(),
            not_ready: BTreeSet::new(),
            errored: BTreeMap::new(),
            ready: false,
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errored.is_empty()
    }

    /// Human readable summary of the failing producers
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.errored
            .iter()
            .map(|(id, message)| format!("{id}: {message}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
