//! Common test utilities
//!
//! Provides rustls setup for the Pact tests, a fake Microcks API standing in
//! for a running instance, and fixtures that seed the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use kube::api::DynamicObject;
use microcks_operator::client::{
    AuthConfig, ItemCollection, OperationState, RemoteApiError, RemoteApiFactory,
    RemoteInstanceApi, ServiceAccountCredential, TestRequest,
};
use microcks_operator::compose::Composer;
use microcks_operator::config::OperatorConfig;
use microcks_operator::constants::INSTANCE_ANNOTATION;
use microcks_operator::controller::reconciler::{Reconciler, WatchRegistry};
use microcks_operator::crd::{Microcks, MicrocksSpec, MicrocksStatus, Status};
use microcks_operator::store::{get_typed, kinds, to_dynamic, InMemoryStore};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub const NAMESPACE: &str = "tests";
pub const INSTANCE: &str = "mcks";

/// Token exchange recorded by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub principal: String,
    pub secret: String,
    pub endpoint: String,
}

#[derive(Debug, Default)]
struct FakeState {
    auth: AuthConfig,
    next_id: u64,
    items: BTreeMap<(String, String), Value>,
    imports: Vec<String>,
    tests: HashMap<String, OperationState>,
    deleted_tests: Vec<String>,
    exchanges: Vec<Exchange>,
    tokens_seen: Vec<String>,
    failing_items: Vec<String>,
    unreachable: bool,
}

/// In-memory Microcks API
#[derive(Debug, Default)]
pub struct FakeMicrocks {
    state: Mutex<FakeState>,
}

impl FakeMicrocks {
    /// Instance without authentication
    pub fn anonymous() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Instance delegating authentication to Keycloak
    pub fn secured(realm: &str) -> Arc<Self> {
        let fake = Self::default();
        fake.lock().auth = AuthConfig {
            enabled: true,
            realm: realm.to_string(),
            auth_server_url: "https://keycloak.example.com".to_string(),
        };
        Arc::new(fake)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_id(state: &mut FakeState) -> String {
        state.next_id += 1;
        state.next_id.to_string()
    }

    /// Items of a collection, keyed by id
    pub fn items(&self, collection: ItemCollection) -> BTreeMap<String, Value> {
        self.lock()
            .items
            .iter()
            .filter(|((c, _), _)| c == collection.as_str())
            .map(|((_, id), body)| (id.clone(), body.clone()))
            .collect()
    }

    /// Remove an item behind the operator's back
    pub fn forget_item(&self, collection: ItemCollection, id: &str) {
        self.lock()
            .items
            .remove(&(collection.as_str().to_string(), id.to_string()));
    }

    /// Make create and update fail for items with this name
    pub fn fail_item(&self, name: &str) {
        self.lock().failing_items.push(name.to_string());
    }

    /// Make every call fail like an unreachable instance
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn imports(&self) -> Vec<String> {
        self.lock().imports.clone()
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock().exchanges.clone()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.lock().tokens_seen.clone()
    }

    /// Finish a running test with the given outcome
    pub fn complete_test(&self, id: &str, success: bool) {
        self.lock().tests.insert(
            id.to_string(),
            OperationState {
                in_progress: false,
                success,
            },
        );
    }

    /// Drop a run as if it was purged from the instance
    pub fn forget_test(&self, id: &str) {
        self.lock().tests.remove(id);
    }

    pub fn deleted_tests(&self) -> Vec<String> {
        self.lock().deleted_tests.clone()
    }

    fn enter(&self, token: &str) -> Result<MutexGuard<'_, FakeState>, RemoteApiError> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(RemoteApiError::Http {
                status: 503,
                message: "instance unavailable".to_string(),
            });
        }
        state.tokens_seen.push(token.to_string());
        Ok(state)
    }

    fn check_failing(state: &FakeState, body: &Value) -> Result<(), RemoteApiError> {
        let name = body.get("name").and_then(Value::as_str).unwrap_or_default();
        if state.failing_items.iter().any(|f| f == name) {
            return Err(RemoteApiError::Http {
                status: 500,
                message: format!("cannot store '{name}'"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteInstanceApi for FakeMicrocks {
    async fn get_auth_config(&self) -> Result<AuthConfig, RemoteApiError> {
        let state = self.lock();
        if state.unreachable {
            return Err(RemoteApiError::Http {
                status: 503,
                message: "instance unavailable".to_string(),
            });
        }
        Ok(state.auth.clone())
    }

    async fn exchange_credential_for_token(
        &self,
        credential: &ServiceAccountCredential,
        endpoint: &str,
    ) -> Result<String, RemoteApiError> {
        self.lock().exchanges.push(Exchange {
            principal: credential.principal.clone(),
            secret: credential.secret.clone(),
            endpoint: endpoint.to_string(),
        });
        Ok(format!("token-for-{}", credential.principal))
    }

    async fn create_item(
        &self,
        token: &str,
        collection: ItemCollection,
        body: &Value,
    ) -> Result<String, RemoteApiError> {
        let mut state = self.enter(token)?;
        Self::check_failing(&state, body)?;
        let id = Self::next_id(&mut state);
        state
            .items
            .insert((collection.as_str().to_string(), id.clone()), body.clone());
        Ok(id)
    }

    async fn update_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
        body: &Value,
    ) -> Result<(), RemoteApiError> {
        let mut state = self.enter(token)?;
        Self::check_failing(&state, body)?;
        let key = (collection.as_str().to_string(), id.to_string());
        if !state.items.contains_key(&key) {
            return Err(RemoteApiError::NotFound(format!("{collection}/{id}")));
        }
        state.items.insert(key, body.clone());
        Ok(())
    }

    async fn get_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
    ) -> Result<Option<Value>, RemoteApiError> {
        let state = self.enter(token)?;
        Ok(state
            .items
            .get(&(collection.as_str().to_string(), id.to_string()))
            .cloned())
    }

    async fn delete_item(
        &self,
        token: &str,
        collection: ItemCollection,
        id: &str,
    ) -> Result<(), RemoteApiError> {
        let mut state = self.enter(token)?;
        state
            .items
            .remove(&(collection.as_str().to_string(), id.to_string()));
        Ok(())
    }

    async fn import_artifact(
        &self,
        token: &str,
        url: &str,
        _main_artifact: bool,
        _secret_name: Option<&str>,
    ) -> Result<String, RemoteApiError> {
        let mut state = self.enter(token)?;
        state.imports.push(url.to_string());
        let service = url
            .rsplit('/')
            .next()
            .and_then(|file| file.split('.').next())
            .unwrap_or("service");
        Ok(format!("{service}:1.0.0"))
    }

    async fn submit_operation(
        &self,
        token: &str,
        _request: &TestRequest,
    ) -> Result<String, RemoteApiError> {
        let mut state = self.enter(token)?;
        let id = format!("test-{}", Self::next_id(&mut state));
        state.tests.insert(
            id.clone(),
            OperationState {
                in_progress: true,
                success: false,
            },
        );
        Ok(id)
    }

    async fn poll_operation(&self, token: &str, id: &str) -> Result<OperationState, RemoteApiError> {
        let state = self.enter(token)?;
        state
            .tests
            .get(id)
            .copied()
            .ok_or_else(|| RemoteApiError::NotFound(format!("tests/{id}")))
    }

    async fn delete_operation(&self, token: &str, id: &str) -> Result<(), RemoteApiError> {
        let mut state = self.enter(token)?;
        state.tests.remove(id);
        state.deleted_tests.push(id.to_string());
        Ok(())
    }
}

/// Factory handing out the same fake for every instance
#[derive(Debug)]
pub struct FakeFactory(pub Arc<FakeMicrocks>);

impl RemoteApiFactory for FakeFactory {
    fn for_instance(
        &self,
        _name: &str,
        _namespace: &str,
    ) -> Result<Arc<dyn RemoteInstanceApi>, RemoteApiError> {
        Ok(self.0.clone())
    }
}

/// Reconciler context backed by the in-memory store and a fake API
pub fn reconciler(store: &Arc<InMemoryStore>, api: &Arc<FakeMicrocks>) -> Arc<Reconciler> {
    let (watches, _triggers) = WatchRegistry::new(Duration::from_millis(10));
    Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(FakeFactory(api.clone())),
        Composer::default(),
        Arc::new(watches),
        Arc::new(OperatorConfig::default()),
    ))
}

/// A `Microcks` instance in the test namespace
pub fn instance(spec: MicrocksSpec, status: Option<Status>) -> Microcks {
    let mut instance = Microcks::new(INSTANCE, spec);
    instance.metadata.namespace = Some(NAMESPACE.to_string());
    instance.metadata.uid = Some("0f4c7a4e-1111-4a2b-9c1d-000000000001".to_string());
    instance.metadata.generation = Some(1);
    instance.status = status.map(|status| MicrocksStatus {
        status,
        microcks_url: Some("https://microcks.example.com".to_string()),
        ..MicrocksStatus::default()
    });
    instance
}

/// Seed a ready instance with the default spec
pub fn seed_ready_instance(store: &InMemoryStore) -> Microcks {
    let instance = instance(MicrocksSpec::default(), Some(Status::Ready));
    seed(store, &kinds::microcks(), &instance);
    instance
}

/// Seed any typed object into the store
pub fn seed<K: serde::Serialize>(store: &InMemoryStore, kind: &kube::api::ApiResource, object: &K) {
    let dynamic: DynamicObject = to_dynamic(object).expect("object converts to a dynamic object");
    store.insert(kind, &dynamic).expect("object is stored");
}

/// Seed a Secret given as plain string data
pub fn seed_secret(store: &InMemoryStore, name: &str, data: &[(&str, &str)]) {
    let string_data: serde_json::Map<String, Value> = data
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
        .collect();
    let secret: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": NAMESPACE},
        "stringData": string_data
    }))
    .expect("valid secret");
    store.insert(&kinds::secret(), &secret).expect("secret is stored");
}

/// Annotations binding a satellite to the test instance
pub fn bound_to_instance() -> BTreeMap<String, String> {
    BTreeMap::from([(INSTANCE_ANNOTATION.to_string(), INSTANCE.to_string())])
}

/// Re-read a typed object the way the next watch event would deliver it
pub async fn refresh<K: serde::de::DeserializeOwned>(
    store: &InMemoryStore,
    kind: &kube::api::ApiResource,
    name: &str,
) -> K {
    get_typed(store, kind, name, NAMESPACE)
        .await
        .expect("store is readable")
        .expect("object still exists")
}
