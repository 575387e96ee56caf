//! # Integration Tests for the HTTP Broker Client
//!
//! Runs `HttpBrokerClient` and `BrokerOrphanMitigator` against wiremock
//! servers to check request construction, response parsing, and error
//! mapping without a live broker.

use std::sync::Arc;
use std::time::Duration;

use cc_broker_client::{
    BrokerClientConfig, BrokerError, BrokerOrphanMitigator, ClientProvider,
    DefaultClientProvider, HttpBrokerClient, OrphanMitigator, ServiceBrokerClient,
};
use cc_core::{BrokerEndpoint, Guid, ServiceBinding, ServiceInstance, ServiceInstanceKind};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BINDING_PATH: &str = "/v2/service_instances/si-1/service_bindings/sb-1";

fn managed_instance(server: &MockServer) -> ServiceInstance {
    ServiceInstance {
        guid: Guid::from("si-1"),
        name: "postgres".into(),
        space_guid: Guid::from("space-1"),
        bindable: true,
        kind: ServiceInstanceKind::Managed {
            broker: BrokerEndpoint {
                url: server.uri(),
                username: "admin".into(),
                password: "secret".into(),
            },
            service_id: "svc-id".into(),
            plan_id: "plan-id".into(),
        },
    }
}

fn binding() -> ServiceBinding {
    let mut binding = ServiceBinding::new(Guid::from("app-1"), Guid::from("si-1"), json!({"tier": "gold"}));
    binding.guid = Guid::from("sb-1");
    binding
}

fn client(server: &MockServer, timeout_secs: u64) -> HttpBrokerClient {
    let config = BrokerClientConfig::new(timeout_secs);
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("http client");
    let mitigator = Arc::new(BrokerOrphanMitigator::new(http.clone(), config.clone()));
    HttpBrokerClient::new(&managed_instance(server), http, config, mitigator).expect("client")
}

#[tokio::test]
async fn bind_sends_osb_request_and_parses_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BINDING_PATH))
        .and(header("Authorization", "Basic YWRtaW46c2VjcmV0"))
        .and(header("X-Broker-API-Version", "2.13"))
        .and(body_partial_json(json!({
            "service_id": "svc-id",
            "plan_id": "plan-id",
            "app_guid": "app-1",
            "bind_resource": {"app_guid": "app-1"},
            "parameters": {"tier": "gold"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "credentials": {"uri": "postgres://user:pw@db:5432/app"},
            "syslog_drain_url": "syslog://drain.example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = client(&server, 5).bind(&binding()).await.expect("bind");
    assert_eq!(attrs.credentials, json!({"uri": "postgres://user:pw@db:5432/app"}));
    assert_eq!(attrs.syslog_drain_url.as_deref(), Some("syslog://drain.example.com"));
}

#[tokio::test]
async fn bind_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BINDING_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_string("binding exists"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 5).bind(&binding()).await.unwrap_err();
    match err {
        BrokerError::Api { status, body, .. } => {
            assert_eq!(status, 409);
            assert_eq!(body, "binding exists");
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn bind_timeout_is_an_ordinary_failure() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(BINDING_PATH))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"credentials": {}}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client(&server, 1).bind(&binding()).await.unwrap_err();
    assert!(
        matches!(err, BrokerError::Timeout { timeout_secs: 1, .. }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn unbind_passes_service_and_plan() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(BINDING_PATH))
        .and(query_param("service_id", "svc-id"))
        .and(query_param("plan_id", "plan-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, 5).unbind(&binding()).await.expect("unbind");
}

#[tokio::test]
async fn unbind_treats_gone_as_success() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(BINDING_PATH))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, 5).unbind(&binding()).await.expect("unbind");
}

#[tokio::test]
async fn orphan_mitigator_unbinds_in_background() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(BINDING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = DefaultClientProvider::new(BrokerClientConfig::new(5)).expect("provider");
    let client = provider
        .client_for(&managed_instance(&server))
        .expect("client");
    client
        .orphan_mitigator()
        .cleanup_failed_bind(&client.attrs(), &binding());

    for _ in 0..50 {
        let received = server.received_requests().await.unwrap_or_default();
        if !received.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method.as_str(), "DELETE");
}
