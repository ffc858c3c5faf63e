//! Cluster-backed [`ResourceStore`].

use super::drift::{plan, Change, UpdatePolicy};
use super::{name_of, namespace_of, Applied, ChangeEvent, ResourceStore, StoreError};
use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use kube_runtime::watcher;
use tracing::{debug, info};

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, kind)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        Ok(self.api(kind, namespace).get_opt(name).await?)
    }

    async fn create_or_update(
        &self,
        kind: &ApiResource,
        desired: &DynamicObject,
        policy: UpdatePolicy,
    ) -> Result<Applied, StoreError> {
        let name = name_of(desired)?;
        let namespace = namespace_of(desired)?;
        let api = self.api(kind, namespace);

        let mut desired = desired.clone();
        desired.types = Some(kube::api::TypeMeta {
            api_version: kind.api_version.clone(),
            kind: kind.kind.clone(),
        });

        let actual = api.get_opt(name).await?;
        let desired_json = serde_json::to_value(&desired)?;
        let actual_json = actual.as_ref().map(serde_json::to_value).transpose()?;

        match plan(&desired_json, actual_json.as_ref(), policy) {
            Change::Created => {
                let pp = PostParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..PostParams::default()
                };
                let object = api.create(&pp, &desired).await?;
                info!("Created {} {}/{}", kind.kind, namespace, name);
                Ok(Applied {
                    object,
                    change: Change::Created,
                })
            }
            Change::Updated => {
                let patch_params = PatchParams::apply(FIELD_MANAGER).force();
                let object = api.patch(name, &patch_params, &Patch::Apply(&desired)).await?;
                info!("Updated drifted {} {}/{}", kind.kind, namespace, name);
                Ok(Applied {
                    object,
                    change: Change::Updated,
                })
            }
            Change::Unchanged => {
                debug!("{} {}/{} is up to date", kind.kind, namespace, name);
                let object = actual.ok_or_else(|| {
                    StoreError::Invalid(format!("{} {namespace}/{name} vanished", kind.kind))
                })?;
                Ok(Applied {
                    object,
                    change: Change::Unchanged,
                })
            }
        }
    }

    async fn delete(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
    ) -> Result<(), StoreError> {
        match self
            .api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!("Deleted {} {}/{}", kind.kind, namespace, name);
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!("{} {}/{} already absent", kind.kind, namespace, name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_merge(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.api(kind, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        kind: &ApiResource,
        name: &str,
        namespace: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "status": status });
        self.api(kind, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    fn watch(
        &self,
        kind: &ApiResource,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> BoxStream<'static, Result<ChangeEvent, StoreError>> {
        let api = self.api(kind, namespace);
        let mut config = watcher::Config::default();
        if let Some(selector) = label_selector {
            config = config.labels(selector);
        }

        watcher(api, config)
            .filter_map(|event| async move {
                match event {
                    Ok(watcher::Event::Apply(object)) => Some(Ok(change_event(&object, false))),
                    Ok(watcher::Event::Delete(object)) => Some(Ok(change_event(&object, true))),
                    Ok(watcher::Event::InitApply(object)) => {
                        Some(Ok(change_event(&object, false)))
                    }
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(StoreError::Rejected(format!("watch failed: {e}")))),
                }
            })
            .boxed()
    }
}

fn change_event(object: &DynamicObject, deleted: bool) -> ChangeEvent {
    ChangeEvent {
        name: object.metadata.name.clone().unwrap_or_default(),
        namespace: object.metadata.namespace.clone(),
        deleted,
    }
}
