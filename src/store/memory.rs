//! In-memory [`ResourceStore`] standing in for a cluster in tests.
//!
//! Supports failure injection per object and readiness simulation, so the
//! workflow engine and the reconcilers can be driven without an API server.

use super::drift::{plan, Change, UpdatePolicy};
use super::{name_of, namespace_of, Applied, ChangeEvent, ResourceStore, StoreError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use kube::api::{ApiResource, DynamicObject};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    failures: Mutex<HashSet<(String, String)>>,
    applies: Mutex<Vec<(String, String, Change)>>,
    revision: Mutex<u64>,
}

fn kind_key(kind: &ApiResource) -> String {
    format!("{}/{}", kind.api_version, kind.kind)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// RFC 7386 JSON merge patch
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = json!({});
            }
            if let Value::Object(target) = target {
                for (key, value) in entries {
                    if value.is_null() {
                        target.remove(key);
                    } else {
                        merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object as if it already existed in the cluster
    pub fn insert(&self, kind: &ApiResource, object: &DynamicObject) -> Result<(), StoreError> {
        let key = (
            kind_key(kind),
            namespace_of(object)?.to_string(),
            name_of(object)?.to_string(),
        );
        let value = self.stamp(serde_json::to_value(object)?, kind);
        lock(&self.objects).insert(key, value);
        Ok(())
    }

    /// Make every write to the named object fail
    pub fn fail_on(&self, kind: &ApiResource, name: &str) {
        lock(&self.failures).insert((kind_key(kind), name.to_string()));
    }

    pub fn clear_failure(&self, kind: &ApiResource, name: &str) {
        lock(&self.failures).remove(&(kind_key(kind), name.to_string()));
    }

    /// Simulate a completed rollout of a workload
    pub fn mark_ready(&self, kind: &ApiResource, name: &str, namespace: &str) -> bool {
        let mut objects = lock(&self.objects);
        let Some(object) = objects.get_mut(&(kind_key(kind), namespace.to_string(), name.to_string()))
        else {
            return false;
        };
        let replicas = object
            .pointer("/spec/replicas")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        merge_patch(
            object,
            &json!({"status": {"replicas": replicas, "readyReplicas": replicas, "availableReplicas": replicas}}),
        );
        true
    }

    /// Simulate a stalled rollout of a workload
    pub fn mark_not_ready(&self, kind: &ApiResource, name: &str, namespace: &str) -> bool {
        let mut objects = lock(&self.objects);
        match objects.get_mut(&(kind_key(kind), namespace.to_string(), name.to_string())) {
            Some(object) => {
                merge_patch(object, &json!({"status": {"readyReplicas": 0}}));
                true
            }
            None => false,
        }
    }

    /// Mark every stored object of a kind as rolled out
    pub fn mark_all_ready(&self, kind: &ApiResource) {
        let keys: Vec<ObjectKey> = lock(&self.objects)
            .keys()
            .filter(|(k, _, _)| *k == kind_key(kind))
            .cloned()
            .collect();
        for (_, namespace, name) in keys {
            self.mark_ready(kind, &name, &namespace);
        }
    }

    #[must_use]
    pub fn contains(&self, kind: &ApiResource, name: &str, namespace: &str) -> bool {
        lock(&self.objects).contains_key(&(kind_key(kind), namespace.to_string(), name.to_string()))
    }

    /// Names of every stored object of a kind, sorted
    #[must_use]
    pub fn names(&self, kind: &ApiResource) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(k, _, _)| *k == kind_key(kind))
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Every create-or-update call that was recorded as a change
    #[must_use]
    pub fn changes(&self) -> Vec<(String, String, Change)> {
        lock(&self.applies).clone()
    }

    fn stamp(&self, mut value: Value, kind: &ApiResource) -> Value {
        let mut revision = lock(&self.revision);
        *revision += 1;
        merge_patch(
            &mut value,
            &json!({
                "apiVersion": kind.api_version,
                "kind": kind.kind,
                "metadata": {"resourceVersion": revision.to_string()}
            }),
        );
        value
    }

    fn check_failure(&self, kind: &ApiResource, name: &str) -> Result<(), StoreError> {
        if lock(&self.failures).contains(&(kind_key(kind), name.to_string())) {
            return Err(StoreError::Rejected(format!(
                "{} {} rejected by failure injection",
                kind.kind, name
            )));
        }
        Ok(())
    }

    fn patch(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.check_failure(kind, name)?;
        let mut objects = lock(&self.objects);
        let object = objects
            .get_mut(&(kind_key(kind), namespace.to_string(), name.to_string()))
            .ok_or_else(|| {
                StoreError::Rejected(format!("{} {namespace}/{name} not found", kind.kind))
            })?;
        merge_patch(object, patch);
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        let objects = lock(&self.objects);
        match objects.get(&(kind_key(kind), namespace.to_string(), name.to_string())) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn create_or_update(
        &self,
        kind: &ApiResource,
        desired: &DynamicObject,
        policy: UpdatePolicy,
    ) -> Result<Applied, StoreError> {
        let name = name_of(desired)?.to_string();
        let namespace = namespace_of(desired)?.to_string();
        self.check_failure(kind, &name)?;

        let key = (kind_key(kind), namespace, name.clone());
        let desired_json = serde_json::to_value(desired)?;
        let actual = lock(&self.objects).get(&key).cloned();

        let change = plan(&desired_json, actual.as_ref(), policy);
        let stored = match (change, actual) {
            (Change::Created, _) | (_, None) => self.stamp(desired_json, kind),
            (Change::Updated, Some(mut actual)) => {
                merge_patch(&mut actual, &desired_json);
                self.stamp(actual, kind)
            }
            (Change::Unchanged, Some(actual)) => actual,
        };
        lock(&self.objects).insert(key, stored.clone());
        if change != Change::Unchanged {
            lock(&self.applies).push((kind.kind.clone(), name, change));
        }

        Ok(Applied {
            object: serde_json::from_value(stored)?,
            change,
        })
    }

    async fn delete(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
    ) -> Result<(), StoreError> {
        self.check_failure(kind, name)?;
        lock(&self.objects).remove(&(kind_key(kind), namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn patch_merge(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.patch(kind, name, namespace, patch)
    }

    async fn patch_status(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        status: &Value,
    ) -> Result<(), StoreError> {
        self.patch(kind, name, namespace, &json!({ "status": status }))
    }

    fn watch(
        &self,
        _kind: &ApiResource,
        _namespace: &str,
        _label_selector: Option<&str>,
    ) -> BoxStream<'static, Result<ChangeEvent, StoreError>> {
        stream::pending().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kinds;

    fn config_map(name: &str, value: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "ns"},
            "data": {"key": value}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_update_unchanged() {
        let store = InMemoryStore::new();
        let kind = kinds::config_map();

        let first = store
            .create_or_update(&kind, &config_map("cm", "a"), UpdatePolicy::Converge)
            .await
            .unwrap();
        let second = store
            .create_or_update(&kind, &config_map("cm", "a"), UpdatePolicy::Converge)
            .await
            .unwrap();
        let third = store
            .create_or_update(&kind, &config_map("cm", "b"), UpdatePolicy::Converge)
            .await
            .unwrap();

        assert_eq!(first.change, Change::Created);
        assert_eq!(second.change, Change::Unchanged);
        assert_eq!(third.change, Change::Updated);
        assert_eq!(third.object.data["data"]["key"], "b");
    }

    #[tokio::test]
    async fn test_failure_injection_and_delete_idempotence() {
        let store = InMemoryStore::new();
        let kind = kinds::config_map();
        store.fail_on(&kind, "broken");

        assert!(store
            .create_or_update(&kind, &config_map("broken", "x"), UpdatePolicy::Converge)
            .await
            .is_err());
        store.clear_failure(&kind, "broken");
        store.delete(&kind, "absent", "ns").await.unwrap();
    }

    #[test]
    fn test_merge_patch_removes_nulls() {
        let mut target = json!({"metadata": {"finalizers": ["a"], "name": "x"}});
        merge_patch(&mut target, &json!({"metadata": {"finalizers": null}}));
        assert_eq!(target, json!({"metadata": {"name": "x"}}));
    }
}
