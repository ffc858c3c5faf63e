//! API resource descriptors for every kind the operator reads or writes.

use crate::crd::{APISource, Microcks, SecretSource, Test};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{ApiResource, GroupVersionKind};

pub fn microcks() -> ApiResource {
    ApiResource::erase::<Microcks>(&())
}

pub fn api_source() -> ApiResource {
    ApiResource::erase::<APISource>(&())
}

pub fn secret_source() -> ApiResource {
    ApiResource::erase::<SecretSource>(&())
}

pub fn test() -> ApiResource {
    ApiResource::erase::<Test>(&())
}

pub fn deployment() -> ApiResource {
    ApiResource::erase::<Deployment>(&())
}

pub fn service() -> ApiResource {
    ApiResource::erase::<Service>(&())
}

pub fn secret() -> ApiResource {
    ApiResource::erase::<Secret>(&())
}

pub fn config_map() -> ApiResource {
    ApiResource::erase::<ConfigMap>(&())
}

pub fn persistent_volume_claim() -> ApiResource {
    ApiResource::erase::<PersistentVolumeClaim>(&())
}

pub fn ingress() -> ApiResource {
    ApiResource::erase::<Ingress>(&())
}

/// Gateway API `HTTPRoute`
pub fn http_route() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: "gateway.networking.k8s.io".to_string(),
        version: "v1".to_string(),
        kind: "HTTPRoute".to_string(),
    })
}

/// OpenShift `Route`
pub fn route() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: "route.openshift.io".to_string(),
        version: "v1".to_string(),
        kind: "Route".to_string(),
    })
}

/// Strimzi `Kafka`
pub fn kafka() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: "kafka.strimzi.io".to_string(),
        version: "v1beta2".to_string(),
        kind: "Kafka".to_string(),
    })
}

/// Strimzi `KafkaNodePool`
pub fn kafka_node_pool() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: "kafka.strimzi.io".to_string(),
        version: "v1beta2".to_string(),
        kind: "KafkaNodePool".to_string(),
    })
}
