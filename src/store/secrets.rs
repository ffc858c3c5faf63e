//! Secret helpers shared by producers and the auth broker.

use super::{kinds, ResourceStore, StoreError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use kube::api::DynamicObject;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Read and decode a Secret's data
///
/// Returns `None` when the Secret does not exist.
pub async fn read_secret_data(
    store: &dyn ResourceStore,
    name: &str,
    namespace: &str,
) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError> {
    match store.get(&kinds::secret(), name, namespace).await? {
        Some(secret) => decode_secret(&secret).map(Some),
        None => Ok(None),
    }
}

/// Decode the payload of a Secret object
///
/// `data` entries are base64 decoded; `stringData` entries fill in keys
/// absent from `data`.
pub fn decode_secret(secret: &DynamicObject) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
    let mut decoded = BTreeMap::new();
    if let Some(data) = secret.data.get("data").and_then(Value::as_object) {
        for (key, value) in data {
            let encoded = value.as_str().unwrap_or_default();
            let bytes = STANDARD.decode(encoded).map_err(|e| {
                StoreError::Invalid(format!(
                    "Secret {}/{} key '{key}' is not base64: {e}",
                    secret.metadata.namespace.as_deref().unwrap_or_default(),
                    secret.metadata.name.as_deref().unwrap_or_default()
                ))
            })?;
            decoded.insert(key.clone(), bytes);
        }
    }
    if let Some(data) = secret.data.get("stringData").and_then(Value::as_object) {
        for (key, value) in data {
            decoded
                .entry(key.clone())
                .or_insert_with(|| value.as_str().unwrap_or_default().as_bytes().to_vec());
        }
    }
    Ok(decoded)
}

/// Read a single key as UTF-8
pub async fn read_secret_key(
    store: &dyn ResourceStore,
    name: &str,
    namespace: &str,
    key: &str,
) -> Result<Option<String>, StoreError> {
    let Some(data) = read_secret_data(store, name, namespace).await? else {
        return Ok(None);
    };
    data.get(key)
        .map(|bytes| {
            String::from_utf8(bytes.clone()).map_err(|e| {
                StoreError::Invalid(format!("Secret {namespace}/{name} key '{key}' is not UTF-8: {e}"))
            })
        })
        .transpose()
}

/// Build base64-encoded `data` for a Secret
#[must_use]
pub fn secret_data<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Value
where
    K: Into<String>,
    V: AsRef<[u8]>,
{
    let data: Map<String, Value> = entries
        .into_iter()
        .map(|(k, v)| (k.into(), Value::String(STANDARD.encode(v.as_ref()))))
        .collect();
    Value::Object(data)
}
