//! # Message Broker
//!
//! Kafka cluster backing the async minion, declared through Strimzi custom
//! resources. The operator only writes them; Strimzi runs the cluster.

use super::common::{dynamic, metadata};
use crate::compose::ResolvedSpec;
use crate::crd::Microcks;
use crate::store::kinds;
use anyhow::Context;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;
use serde_json::json;

const COMPONENT: &str = "kafka";
const BOOTSTRAP_PORT: i32 = 9092;

#[must_use]
pub fn kafka_name(instance: &str) -> String {
    format!("{instance}-kafka")
}

#[must_use]
pub fn node_pool_name(instance: &str) -> String {
    format!("{instance}-kafka-pool")
}

/// Bootstrap servers of the broker used by the instance, if any
#[must_use]
pub fn bootstrap_servers(resolved: &ResolvedSpec, instance: &str) -> Option<String> {
    if resolved.kafka_installed() {
        Some(format!(
            "{}-kafka-bootstrap:{BOOTSTRAP_PORT}",
            kafka_name(instance)
        ))
    } else {
        resolved.kafka().url.filter(|u| !u.is_empty())
    }
}

/// Kinds and names of every broker object of an instance
#[must_use]
pub fn broker_objects(instance: &str) -> Vec<(ApiResource, String)> {
    vec![
        (kinds::kafka(), kafka_name(instance)),
        (kinds::kafka_node_pool(), node_pool_name(instance)),
    ]
}

/// Desired Strimzi objects, in apply order
pub fn desired_broker(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Vec<(ApiResource, DynamicObject)>> {
    let instance = primary.name_any();
    let kafka = resolved.kafka();
    let replicas = kafka.replicas.unwrap_or(1).max(1);
    let cluster = kafka_name(&instance);

    let mut kafka_meta = metadata(resolved, primary, &cluster, COMPONENT);
    kafka_meta.annotations.get_or_insert_with(Default::default).extend([
        ("strimzi.io/node-pools".to_string(), "enabled".to_string()),
        ("strimzi.io/kraft".to_string(), "enabled".to_string()),
    ]);
    let cluster_object = json!({
        "apiVersion": "kafka.strimzi.io/v1beta2",
        "kind": "Kafka",
        "metadata": kafka_meta,
        "spec": {
            "kafka": {
                "listeners": [
                    {"name": "plain", "port": BOOTSTRAP_PORT, "type": "internal", "tls": false}
                ],
                "config": {
                    "offsets.topic.replication.factor": replicas,
                    "transaction.state.log.replication.factor": replicas,
                    "transaction.state.log.min.isr": 1,
                    "default.replication.factor": replicas,
                    "min.insync.replicas": 1
                }
            },
            "entityOperator": {"topicOperator": {}, "userOperator": {}}
        }
    });

    let storage = if kafka.persistent.unwrap_or(false) {
        json!({
            "type": "persistent-claim",
            "size": kafka.volume_size.as_deref().unwrap_or("2Gi"),
            "deleteClaim": true
        })
    } else {
        json!({"type": "ephemeral"})
    };

    let pool_name = node_pool_name(&instance);
    let mut pool_meta = metadata(resolved, primary, &pool_name, COMPONENT);
    pool_meta
        .labels
        .get_or_insert_with(Default::default)
        .insert("strimzi.io/cluster".to_string(), cluster.clone());
    let pool_object = json!({
        "apiVersion": "kafka.strimzi.io/v1beta2",
        "kind": "KafkaNodePool",
        "metadata": pool_meta,
        "spec": {
            "replicas": replicas,
            "roles": ["controller", "broker"],
            "storage": storage
        }
    });

    let cluster_object = dynamic(&cluster_object)?.context("Kafka object is empty")?;
    let pool_object = dynamic(&pool_object)?.context("KafkaNodePool object is empty")?;
    Ok(vec![
        (kinds::kafka(), cluster_object),
        (kinds::kafka_node_pool(), pool_object),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;
    use crate::crd::{AsyncFeatureSpec, FeaturesSpec, KafkaSpec, MicrocksSpec};

    fn async_spec(kafka: KafkaSpec) -> MicrocksSpec {
        MicrocksSpec {
            features: Some(FeaturesSpec {
                async_api: Some(AsyncFeatureSpec {
                    enabled: Some(true),
                    kafka: Some(kafka),
                    ..AsyncFeatureSpec::default()
                }),
                ..FeaturesSpec::default()
            }),
            ..MicrocksSpec::default()
        }
    }

    #[test]
    fn test_node_pool_targets_cluster() {
        let spec = async_spec(KafkaSpec::default());
        let resolved = Composer::default().resolve(&spec).unwrap();
        let primary = Microcks::new("mcks", spec);

        let objects = desired_broker(&resolved, &primary).unwrap();
        assert_eq!(objects.len(), 2);
        let (kind, pool) = &objects[1];
        assert_eq!(kind.kind, "KafkaNodePool");
        assert_eq!(pool.metadata.name.as_deref(), Some("mcks-kafka-pool"));
        assert_eq!(
            pool.metadata.labels.as_ref().unwrap()["strimzi.io/cluster"],
            "mcks-kafka"
        );
        assert_eq!(pool.data["spec"]["storage"]["type"], "ephemeral");
    }

    #[test]
    fn test_external_broker_url() {
        let spec = async_spec(KafkaSpec {
            install: Some(false),
            url: Some("kafka.shared:9092".to_string()),
            ..KafkaSpec::default()
        });
        let resolved = Composer::default().resolve(&spec).unwrap();
        assert!(!resolved.kafka_installed());
        assert_eq!(
            bootstrap_servers(&resolved, "mcks").as_deref(),
            Some("kafka.shared:9092")
        );
    }
}
