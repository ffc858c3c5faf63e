//! # Status Types
//!
//! Status structures shared by the primary resource and satellite resources.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state used both for the global status and for conditions
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub enum Status {
    #[default]
    Unknown,
    Deploying,
    Ready,
    Error,
}

impl Status {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "Unknown",
            Status::Deploying => "Deploying",
            Status::Ready => "Ready",
            Status::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Module condition (`MicrocksReady`) or item key (secret name, artifact URL)
    pub r#type: String,
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

/// Microcks instance status
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MicrocksStatus {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub microcks_url: Option<String>,
    #[serde(default)]
    pub keycloak_url: Option<String>,
    /// Exposition type in effect
    #[serde(default)]
    pub exposition: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Remote item created in a Microcks instance on behalf of a satellite
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObservedItem {
    /// Remote collection the item lives in (`secrets`, `jobs`, `artifacts`)
    pub collection: String,
    pub remote_id: String,
}

/// Status of `APISource` and `SecretSource`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Item key -> remote identity, carried across reconciles
    #[serde(default)]
    pub observed_state: BTreeMap<String, ObservedItem>,
}

/// Outcome of a remote test run
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub enum TestResult {
    #[default]
    Unknown,
    Success,
    Failure,
}

/// Status of a `Test`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestStatus {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Remote test id
    #[serde(default)]
    pub id: Option<String>,
    /// Result page in the Microcks UI
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub result: TestResult,
}

/// Access to the condition list and global fields of any status type
pub trait HasConditions {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
    fn set_status(&mut self, status: Status, message: Option<String>);
    fn status(&self) -> Status;
}

macro_rules! has_conditions {
    ($($ty:ty),*) => {
        $(
            impl HasConditions for $ty {
                fn conditions(&self) -> &[Condition] {
                    &self.conditions
                }

                fn conditions_mut(&mut self) -> &mut Vec<Condition> {
                    &mut self.conditions
                }

                fn set_status(&mut self, status: Status, message: Option<String>) {
                    self.status = status;
                    self.message = message;
                }

                fn status(&self) -> Status {
                    self.status
                }
            }
        )*
    };
}

has_conditions!(MicrocksStatus, SourceStatus, TestStatus);
