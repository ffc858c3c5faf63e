//! Pact contract tests for the Microcks REST API
//!
//! These tests define the contract between the Microcks Operator and the API
//! of a running Microcks instance. Pact provides a mock server that answers
//! like Microcks; the operator's own `MicrocksClient` issues the requests.

#[cfg(test)]
mod common;

use common::init_rustls;
use microcks_operator::client::{ItemCollection, MicrocksClient, RemoteInstanceApi, TestRequest};
use pact_consumer::prelude::*;
use serde_json::json;
use std::time::Duration;

fn client_for(mock_server: &dyn ValidatingMockServer) -> MicrocksClient {
    // mock_server.url() ends with a slash
    let base_url = mock_server.url().to_string();
    MicrocksClient::new(
        format!("{}/api", base_url.trim_end_matches('/')),
        Duration::from_secs(5),
        Duration::from_secs(10),
    )
    .expect("Failed to build client")
}

#[tokio::test]
async fn test_read_keycloak_config_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("Microcks-Operator", "Microcks-API");

    pact_builder.interaction("read the authentication settings", "", |mut i| {
        i.given("Microcks delegates authentication to Keycloak");
        i.request.method("GET").path("/api/keycloak/config");
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "enabled": true,
                "realm": "microcks",
                "resource": "microcks-app-js",
                "auth-server-url": "https://keycloak.example.com"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let auth = client_for(mock_server.as_ref())
        .get_auth_config()
        .await
        .expect("Failed to read config");

    assert!(auth.enabled);
    assert_eq!(auth.realm, "microcks");
    assert_eq!(auth.auth_server_url, "https://keycloak.example.com");
}

#[tokio::test]
async fn test_create_secret_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("Microcks-Operator", "Microcks-API");

    pact_builder.interaction("create a secret", "", |mut i| {
        i.given("no secret named github exists");
        i.request
            .method("POST")
            .path("/api/secrets")
            .header("authorization", "Bearer test-token")
            .json_body(json!({
                "name": "github",
                "token": "ghp_x",
                "tokenHeader": "Authorization"
            }));
        i.response
            .status(201)
            .header("content-type", "application/json")
            .json_body(json!({
                "id": "65f1d3b2c9a1",
                "name": "github"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let id = client_for(mock_server.as_ref())
        .create_item(
            "test-token",
            ItemCollection::Secrets,
            &json!({"name": "github", "token": "ghp_x", "tokenHeader": "Authorization"}),
        )
        .await
        .expect("Failed to create secret");

    assert_eq!(id, "65f1d3b2c9a1");
}

#[tokio::test]
async fn test_unknown_job_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("Microcks-Operator", "Microcks-API");

    pact_builder.interaction("read an importer job that does not exist", "", |mut i| {
        i.given("no importer job with id 42 exists");
        i.request
            .method("GET")
            .path("/api/jobs/42")
            .header("authorization", "Bearer test-token");
        i.response.status(404);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let job = client_for(mock_server.as_ref())
        .get_item("test-token", ItemCollection::Jobs, "42")
        .await
        .expect("A missing job is not an error");

    assert!(job.is_none());
}

#[tokio::test]
async fn test_launch_test_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("Microcks-Operator", "Microcks-API");

    pact_builder.interaction("launch a conformance test", "", |mut i| {
        i.given("service API Pastry:1.0.0 exists");
        i.request
            .method("POST")
            .path("/api/tests")
            .header("authorization", "Bearer test-token")
            .json_body(json!({
                "serviceId": "API Pastry:1.0.0",
                "testEndpoint": "http://pastry.apps.svc:8080",
                "runnerType": "OPEN_API_SCHEMA",
                "timeout": 10000
            }));
        i.response
            .status(201)
            .header("content-type", "application/json")
            .json_body(json!({
                "id": "66a0c1e5",
                "inProgress": true,
                "success": false
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let request = TestRequest {
        service_id: "API Pastry:1.0.0".to_string(),
        test_endpoint: "http://pastry.apps.svc:8080".to_string(),
        runner_type: "OPEN_API_SCHEMA".to_string(),
        timeout: 10_000,
        secret_name: None,
        filtered_operations: None,
    };
    let id = client_for(mock_server.as_ref())
        .submit_operation("test-token", &request)
        .await
        .expect("Failed to launch test");

    assert_eq!(id, "66a0c1e5");
}

#[tokio::test]
async fn test_poll_test_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("Microcks-Operator", "Microcks-API");

    pact_builder.interaction("read a finished test", "", |mut i| {
        i.given("test 66a0c1e5 has completed successfully");
        i.request
            .method("GET")
            .path("/api/tests/66a0c1e5")
            .header("authorization", "Bearer test-token");
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "id": "66a0c1e5",
                "inProgress": false,
                "success": true,
                "testedEndpoint": "http://pastry.apps.svc:8080"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let state = client_for(mock_server.as_ref())
        .poll_operation("test-token", "66a0c1e5")
        .await
        .expect("Failed to poll test");

    assert!(!state.in_progress);
    assert!(state.success);
}
