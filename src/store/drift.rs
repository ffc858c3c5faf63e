//! # Drift Detection
//!
//! Decides whether a managed object must be created, updated or left alone.
//! The API server adds defaults and bookkeeping fields to everything it
//! stores, so an object has drifted only when some field we declared no
//! longer holds the value we declared.

use serde_json::Value;

/// How a producer's object may be changed once it exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Re-apply whenever the object drifted from the desired state
    #[default]
    Converge,
    /// Create once, never touch again (generated credentials)
    CreateOnly,
}

/// What a create-or-update call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Unchanged,
}

impl Change {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Change::Created => "created",
            Change::Updated => "updated",
            Change::Unchanged => "unchanged",
        }
    }
}

/// Plan the change needed to bring `actual` to `desired`
#[must_use]
pub fn plan(desired: &Value, actual: Option<&Value>, policy: UpdatePolicy) -> Change {
    match actual {
        None => Change::Created,
        Some(_) if policy == UpdatePolicy::CreateOnly => Change::Unchanged,
        Some(actual) if json_contains(actual, desired) => Change::Unchanged,
        Some(_) => Change::Updated,
    }
}

/// Whether every field of `desired` is present in `actual` with the same value
///
/// Objects are compared key by key, arrays element by element (same length),
/// scalars by equality. A `null` in `desired` matches an absent field.
#[must_use]
pub fn json_contains(actual: &Value, desired: &Value) -> bool {
    match (actual, desired) {
        (Value::Object(actual), Value::Object(desired)) => desired.iter().all(|(key, value)| {
            match actual.get(key) {
                Some(actual_value) => json_contains(actual_value, value),
                None => value.is_null(),
            }
        }),
        (Value::Array(actual), Value::Array(desired)) => {
            actual.len() == desired.len()
                && actual
                    .iter()
                    .zip(desired.iter())
                    .all(|(a, d)| json_contains(a, d))
        }
        (actual, desired) => actual == desired,
    }
}
