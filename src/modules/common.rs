//! Building blocks shared by the module producers.

use crate::compose::ResolvedSpec;
use crate::crd::{IngressSpec, Microcks};
use crate::store::to_dynamic;
use anyhow::Context;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort, ServiceSpec,
    TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec as K8sIngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Labels selecting the pods of one component of one instance
#[must_use]
pub fn selector_labels(instance: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/instance".to_string(), instance.to_string()),
        ("app.kubernetes.io/component".to_string(), component.to_string()),
    ])
}

/// Common labels plus selector labels
#[must_use]
pub fn labels(resolved: &ResolvedSpec, instance: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = resolved.common_labels();
    labels.extend(selector_labels(instance, component));
    labels.insert("app.kubernetes.io/part-of".to_string(), "microcks".to_string());
    labels
}

/// Metadata of a managed object: namespace, labels, annotations and owner reference
#[must_use]
pub fn metadata(
    resolved: &ResolvedSpec,
    primary: &Microcks,
    name: &str,
    component: &str,
) -> ObjectMeta {
    let annotations = resolved.common_annotations();
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: primary.namespace(),
        labels: Some(labels(resolved, &primary.name_any(), component)),
        annotations: (!annotations.is_empty()).then_some(annotations),
        owner_references: primary.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..ObjectMeta::default()
    }
}

/// Convert a typed object into the dynamic form the store works with
pub fn dynamic<K: Serialize>(object: &K) -> anyhow::Result<Option<DynamicObject>> {
    to_dynamic(object)
        .map(Some)
        .context("Failed to convert managed object")
}

/// Whether a Deployment has every desired replica ready
#[must_use]
pub fn deployment_ready(object: &DynamicObject) -> bool {
    let desired = object
        .data
        .pointer("/spec/replicas")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(1);
    let ready = object
        .data
        .pointer("/status/readyReplicas")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    ready >= desired
}

#[must_use]
pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..EnvVar::default()
    }
}

/// Environment variable read from a Secret key
#[must_use]
pub fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    serde_json::from_value(json!({
        "name": name,
        "valueFrom": {"secretKeyRef": {"name": secret, "key": key}}
    }))
    .unwrap_or_else(|_| env(name, ""))
}

#[must_use]
pub fn container(
    name: &str,
    image: String,
    ports: &[(&str, i32)],
    env: Vec<EnvVar>,
    resources: Option<ResourceRequirements>,
) -> Container {
    let readiness_port = ports.first().map(|(_, port)| *port);
    Container {
        name: name.to_string(),
        image: Some(image),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(
            ports
                .iter()
                .map(|(port_name, port)| ContainerPort {
                    name: Some((*port_name).to_string()),
                    container_port: *port,
                    ..ContainerPort::default()
                })
                .collect(),
        ),
        env: (!env.is_empty()).then_some(env),
        resources,
        readiness_probe: readiness_port.map(|port| Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                ..TCPSocketAction::default()
            }),
            initial_delay_seconds: Some(5),
            period_seconds: Some(10),
            ..Probe::default()
        }),
        ..Container::default()
    }
}

#[must_use]
pub fn with_mount(mut container: Container, volume: &str, path: &str) -> Container {
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(VolumeMount {
            name: volume.to_string(),
            mount_path: path.to_string(),
            ..VolumeMount::default()
        });
    container
}

#[must_use]
pub fn deployment(
    meta: ObjectMeta,
    selector: BTreeMap<String, String>,
    replicas: i32,
    container: Container,
    volumes: Vec<Volume>,
    recreate: bool,
) -> Deployment {
    Deployment {
        metadata: meta.clone(),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..LabelSelector::default()
            },
            strategy: recreate.then(|| DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..DeploymentStrategy::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: meta.labels,
                    annotations: meta.annotations,
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

#[must_use]
pub fn service(
    meta: ObjectMeta,
    selector: BTreeMap<String, String>,
    ports: &[(&str, i32)],
) -> Service {
    Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port)| ServicePort {
                        name: Some((*name).to_string()),
                        port: *port,
                        target_port: Some(IntOrString::Int(*port)),
                        protocol: Some("TCP".to_string()),
                        ..ServicePort::default()
                    })
                    .collect(),
            ),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

#[must_use]
pub fn persistent_volume_claim(
    meta: ObjectMeta,
    size: &str,
    storage_class: Option<String>,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta,
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage_class,
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    }
}

/// Volume backed by a claim when persistent, by an empty dir otherwise
#[must_use]
pub fn data_volume(name: &str, claim: Option<String>) -> Volume {
    let source = match claim {
        Some(claim) => json!({"name": name, "persistentVolumeClaim": {"claimName": claim}}),
        None => json!({"name": name, "emptyDir": {}}),
    };
    serde_json::from_value(source).unwrap_or_else(|_| Volume {
        name: name.to_string(),
        ..Volume::default()
    })
}

/// Volume mounting every key of a ConfigMap
#[must_use]
pub fn config_map_volume(name: &str, config_map: &str) -> Volume {
    serde_json::from_value(json!({"name": name, "configMap": {"name": config_map}}))
        .unwrap_or_else(|_| Volume {
            name: name.to_string(),
            ..Volume::default()
        })
}

/// Volume mounting every key of a Secret
#[must_use]
pub fn secret_volume(name: &str, secret: &str) -> Volume {
    serde_json::from_value(json!({"name": name, "secret": {"secretName": secret}}))
        .unwrap_or_else(|_| Volume {
            name: name.to_string(),
            ..Volume::default()
        })
}

/// Ingress routing a host to one service port
#[must_use]
pub fn ingress(
    meta: ObjectMeta,
    host: &str,
    service: &str,
    port: i32,
    settings: &IngressSpec,
) -> Ingress {
    let mut meta = meta;
    if let Some(extra) = &settings.annotations {
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(extra.clone());
    }
    let tls_secret = settings
        .secret_ref
        .clone()
        .or_else(|| settings.generate_cert.unwrap_or(false).then(|| format!("{service}-tls")));

    Ingress {
        metadata: meta,
        spec: Some(K8sIngressSpec {
            ingress_class_name: settings.class_name.clone(),
            tls: tls_secret.map(|secret| {
                vec![IngressTLS {
                    hosts: Some(vec![host.to_string()]),
                    secret_name: Some(secret),
                }]
            }),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..ServiceBackendPort::default()
                                }),
                            }),
                            ..IngressBackend::default()
                        },
                    }],
                }),
            }]),
            ..K8sIngressSpec::default()
        }),
        ..Ingress::default()
    }
}

/// Gateway API HTTPRoute attached to the configured parent gateway
pub fn http_route(
    resolved: &ResolvedSpec,
    meta: ObjectMeta,
    host: &str,
    service: &str,
    port: i32,
) -> anyhow::Result<Option<DynamicObject>> {
    let gateway = resolved
        .common_expositions
        .as_ref()
        .and_then(|e| e.gateway_ref.clone())
        .unwrap_or_default();
    let gateway_name = gateway
        .name
        .context("'spec.commonExpositions.gatewayRef.name' is required for GatewayRoute exposition")?;

    let mut parent = json!({"name": gateway_name});
    if let Some(namespace) = gateway.namespace {
        parent["namespace"] = json!(namespace);
    }
    if let Some(section) = gateway.section_name {
        parent["sectionName"] = json!(section);
    }

    let route = json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "HTTPRoute",
        "metadata": meta,
        "spec": {
            "parentRefs": [parent],
            "hostnames": [host],
            "rules": [{
                "matches": [{"path": {"type": "PathPrefix", "value": "/"}}],
                "backendRefs": [{"name": service, "port": port}]
            }]
        }
    });
    dynamic(&route)
}

/// OpenShift Route with edge TLS termination
pub fn openshift_route(
    meta: ObjectMeta,
    host: &str,
    service: &str,
    target_port: &str,
) -> anyhow::Result<Option<DynamicObject>> {
    let route = json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": meta,
        "spec": {
            "host": host,
            "to": {"kind": "Service", "name": service},
            "port": {"targetPort": target_port},
            "tls": {"termination": "edge", "insecureEdgeTerminationPolicy": "Redirect"}
        }
    });
    dynamic(&route)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deployment_ready_requires_all_replicas() {
        let rolling = object(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "d"},
            "spec": {"replicas": 2},
            "status": {"readyReplicas": 1}
        }));
        let done = object(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "d"},
            "spec": {"replicas": 2},
            "status": {"readyReplicas": 2}
        }));
        let fresh = object(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "d"},
            "spec": {}
        }));
        assert!(!deployment_ready(&rolling));
        assert!(deployment_ready(&done));
        assert!(!deployment_ready(&fresh));
    }

    #[test]
    fn test_secret_env_uses_key_ref() {
        let var = serde_json::to_value(secret_env("PASSWORD", "creds", "password")).unwrap();
        assert_eq!(var["valueFrom"]["secretKeyRef"]["name"], "creds");
        assert_eq!(var["valueFrom"]["secretKeyRef"]["key"], "password");
    }
}
