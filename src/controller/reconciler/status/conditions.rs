//! # Conditions
//!
//! Condition bookkeeping over any status implementing [`HasConditions`].
//! Conditions are keyed by type, appended in first-seen order and never
//! removed.

use crate::crd::{Condition, HasConditions, Status};

/// Timestamp format of `lastTransitionTime`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Find the condition of a type, appending a fresh one if absent
pub fn get_or_create<'a, S: HasConditions>(status: &'a mut S, r#type: &str) -> &'a mut Condition {
    let conditions = status.conditions_mut();
    let index = match conditions.iter().position(|c| c.r#type == r#type) {
        Some(index) => index,
        None => {
            conditions.push(Condition {
                r#type: r#type.to_string(),
                ..Condition::default()
            });
            conditions.len() - 1
        }
    };
    &mut conditions[index]
}

pub fn touch(condition: &mut Condition) {
    condition.last_transition_time = Some(chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string());
}

/// Set a condition's state; the transition time moves only when the
/// status value changes or the condition is new
pub fn upsert_and_timestamp<S: HasConditions>(
    status: &mut S,
    r#type: &str,
    value: Status,
    reason: Option<&str>,
    message: Option<String>,
) {
    let condition = get_or_create(status, r#type);
    let transitioned = condition.last_transition_time.is_none() || condition.status != value;
    condition.status = value;
    condition.reason = reason.map(str::to_string);
    condition.message = message;
    if transitioned {
        touch(condition);
    }
}

#[must_use]
pub fn find<'a, S: HasConditions>(status: &'a S, r#type: &str) -> Option<&'a Condition> {
    status.conditions().iter().find(|c| c.r#type == r#type)
}

#[must_use]
pub fn is_ready<S: HasConditions>(status: &S, r#type: &str) -> bool {
    find(status, r#type).is_some_and(|c| c.status == Status::Ready)
}
