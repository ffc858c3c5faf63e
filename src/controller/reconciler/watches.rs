//! # Watch Registry
//!
//! Change-watches on third-party objects (Strimzi `Kafka`, `KafkaNodePool`)
//! that the primary controller cannot `own` through typed APIs.
//!
//! Each registered object gets one background task forwarding its change
//! events as a reconcile trigger for the owning `Microcks` instance. The
//! trigger stream is consumed by the primary controller through
//! `reconcile_all_on`.

use crate::crd::Microcks;
use crate::store::ResourceStore;
use futures::channel::mpsc;
use futures::StreamExt;
use kube::api::ApiResource;
use kube_runtime::reflector::ObjectRef;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Identity of a watched object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub api_version: String,
}

impl WatchKey {
    #[must_use]
    pub fn new(kind: &ApiResource, name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            kind: kind.kind.clone(),
            api_version: kind.api_version.clone(),
        }
    }
}

pub struct WatchRegistry {
    handles: Mutex<HashMap<WatchKey, AbortHandle>>,
    trigger: mpsc::UnboundedSender<ObjectRef<Microcks>>,
    restart_delay: Duration,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("watches", &self.len())
            .finish_non_exhaustive()
    }
}

impl WatchRegistry {
    /// Create a registry and the trigger stream fed by its watches
    #[must_use]
    pub fn new(restart_delay: Duration) -> (Self, mpsc::UnboundedReceiver<ObjectRef<Microcks>>) {
        let (trigger, receiver) = mpsc::unbounded();
        (
            Self {
                handles: Mutex::new(HashMap::new()),
                trigger,
                restart_delay,
            },
            receiver,
        )
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<WatchKey, AbortHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching an object on behalf of an instance
    ///
    /// Returns `false` when the object is already watched. Must be called
    /// within a tokio runtime.
    pub fn register(
        &self,
        store: Arc<dyn ResourceStore>,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        owner: ObjectRef<Microcks>,
    ) -> bool {
        let key = WatchKey::new(kind, name, namespace);
        let mut handles = self.handles();
        if handles.contains_key(&key) {
            return false;
        }

        let task = tokio::spawn(forward_changes(
            store,
            kind.clone(),
            key.clone(),
            owner,
            self.trigger.clone(),
            self.restart_delay,
        ));
        info!(
            "👀 Watching {} {}/{} for changes",
            key.kind, key.namespace, key.name
        );
        handles.insert(key, task.abort_handle());
        true
    }

    /// Stop watching an object; returns whether a watch existed
    pub fn unregister(&self, kind: &ApiResource, name: &str, namespace: &str) -> bool {
        let key = WatchKey::new(kind, name, namespace);
        match self.handles().remove(&key) {
            Some(handle) => {
                handle.abort();
                debug!("Stopped watching {} {}/{}", key.kind, namespace, name);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_registered(&self, kind: &ApiResource, name: &str, namespace: &str) -> bool {
        self.handles()
            .contains_key(&WatchKey::new(kind, name, namespace))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        for handle in self.handles().values() {
            handle.abort();
        }
    }
}

async fn forward_changes(
    store: Arc<dyn ResourceStore>,
    kind: ApiResource,
    key: WatchKey,
    owner: ObjectRef<Microcks>,
    trigger: mpsc::UnboundedSender<ObjectRef<Microcks>>,
    restart_delay: Duration,
) {
    loop {
        let mut events = store.watch(&kind, &key.namespace, None);
        while let Some(event) = events.next().await {
            match event {
                Ok(change) if change.name == key.name => {
                    debug!(
                        "{} {}/{} changed (deleted: {}), triggering {}",
                        key.kind, key.namespace, key.name, change.deleted, owner.name
                    );
                    if trigger.unbounded_send(owner.clone()).is_err() {
                        debug!("Trigger receiver closed, stopping watch on {}", key.name);
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Watch error on {} {}/{}: {}",
                        key.kind, key.namespace, key.name, e
                    );
                }
            }
        }
        tokio::time::sleep(restart_delay).await;
    }
}
