//! # Test CRD
//!
//! Launches a conformance test in a Microcks instance and follows it to
//! completion.

use crate::crd::status::TestStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Test",
    group = "microcks.io",
    version = "v1alpha1",
    namespaced,
    status = "TestStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Result", "type":"string", "jsonPath":".status.result"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    /// Service under test, as `name:version`
    pub service_id: String,
    pub test_endpoint: String,
    pub runner_type: TestRunnerType,
    /// Kubernetes duration string, e.g. `10s` or `2m`
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Microcks secret used to reach the endpoint
    #[serde(default)]
    pub secret_name: Option<String>,
    #[serde(default)]
    pub filtered_operations: Option<Vec<String>>,
    #[serde(default)]
    pub retention_policy: RetentionPolicy,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestRunnerType {
    #[default]
    Http,
    SoapHttp,
    SoapUi,
    Postman,
    OpenApiSchema,
    AsyncApiSchema,
    GrpcProtobuf,
    GraphqlSchema,
}

impl TestRunnerType {
    /// Name used by the Microcks API
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TestRunnerType::Http => "HTTP",
            TestRunnerType::SoapHttp => "SOAP_HTTP",
            TestRunnerType::SoapUi => "SOAP_UI",
            TestRunnerType::Postman => "POSTMAN",
            TestRunnerType::OpenApiSchema => "OPEN_API_SCHEMA",
            TestRunnerType::AsyncApiSchema => "ASYNC_API_SCHEMA",
            TestRunnerType::GrpcProtobuf => "GRPC_PROTOBUF",
            TestRunnerType::GraphqlSchema => "GRAPHQL_SCHEMA",
        }
    }
}

/// What happens to a `Test` once its run completed
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub enum RetentionPolicy {
    #[default]
    Retain,
    Delete,
    DeleteOnSuccess,
}

fn default_timeout() -> String {
    "10s".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_type_wire_names() {
        assert_eq!(
            serde_json::to_value(TestRunnerType::OpenApiSchema).unwrap(),
            "OPEN_API_SCHEMA"
        );
        assert_eq!(
            serde_json::to_value(TestRunnerType::SoapHttp).unwrap(),
            "SOAP_HTTP"
        );
        assert_eq!(
            serde_json::to_value(TestRunnerType::GraphqlSchema).unwrap(),
            TestRunnerType::GraphqlSchema.as_str()
        );
    }

    #[test]
    fn test_spec_defaults() {
        let spec: TestSpec = serde_json::from_value(serde_json::json!({
            "serviceId": "Pastry API:1.0.0",
            "testEndpoint": "http://pastry:8080",
            "runnerType": "OPEN_API_SCHEMA"
        }))
        .unwrap();

        assert_eq!(spec.timeout, "10s");
        assert_eq!(spec.retention_policy, RetentionPolicy::Retain);
    }
}
