//! HTTP client for managed service instances.
//!
//! Speaks the Open Service Broker binding endpoints:
//!
//! - `PUT    {broker}/v2/service_instances/{instance}/service_bindings/{binding}`
//! - `DELETE {broker}/v2/service_instances/{instance}/service_bindings/{binding}?service_id=..&plan_id=..`
//!
//! Requests carry HTTP basic auth from the instance's broker endpoint and an
//! `X-Broker-API-Version` header. Every request is bounded by the configured
//! timeout; a timeout is an ordinary [`BrokerError::Timeout`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cc_core::{BindingAttributes, BrokerEndpoint, Guid, ServiceBinding, ServiceInstance, ServiceInstanceKind};
use serde::Serialize;
use serde_json::Value;

use crate::client::{ClientAttrs, OrphanMitigator, ServiceBrokerClient};
use crate::error::BrokerError;
use crate::orphan::BrokerOrphanMitigator;

/// Broker API version sent on every request.
pub const BROKER_API_VERSION: &str = "2.13";

const BROKER_API_VERSION_HEADER: &str = "X-Broker-API-Version";

/// Configuration shared by all HTTP broker clients.
#[derive(Debug, Clone)]
pub struct BrokerClientConfig {
    /// Per-request timeout in seconds (default: 60).
    pub timeout_secs: u64,
}

impl Default for BrokerClientConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl BrokerClientConfig {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub(crate) fn build_http_client(&self) -> Result<reqwest::Client, BrokerError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| BrokerError::Config(format!("failed to build HTTP client: {e}")))
    }
}

#[derive(Serialize)]
struct BindResource<'a> {
    app_guid: &'a str,
}

#[derive(Serialize)]
struct BindRequest<'a> {
    service_id: &'a str,
    plan_id: &'a str,
    app_guid: &'a str,
    bind_resource: BindResource<'a>,
    parameters: &'a Value,
}

/// Binding endpoint URL for an instance/binding pair.
pub(crate) fn binding_url(
    endpoint: &BrokerEndpoint,
    instance_guid: &Guid,
    binding_guid: &Guid,
) -> String {
    format!(
        "{}/v2/service_instances/{}/service_bindings/{}",
        endpoint.url.trim_end_matches('/'),
        instance_guid,
        binding_guid
    )
}

fn transport_error(endpoint: &str, timeout_secs: u64, e: reqwest::Error) -> BrokerError {
    if e.is_timeout() {
        BrokerError::Timeout {
            endpoint: endpoint.to_string(),
            timeout_secs,
        }
    } else {
        BrokerError::Http {
            endpoint: endpoint.to_string(),
            source: e,
        }
    }
}

/// Issue the broker unbind request. Shared with the orphan mitigator.
pub(crate) async fn send_unbind(
    http: &reqwest::Client,
    timeout_secs: u64,
    endpoint: &BrokerEndpoint,
    instance_guid: &Guid,
    service_id: &str,
    plan_id: &str,
    binding_guid: &Guid,
) -> Result<(), BrokerError> {
    let url = binding_url(endpoint, instance_guid, binding_guid);
    let resp = http
        .delete(&url)
        .basic_auth(&endpoint.username, Some(&endpoint.password))
        .header(BROKER_API_VERSION_HEADER, BROKER_API_VERSION)
        .query(&[("service_id", service_id), ("plan_id", plan_id)])
        .send()
        .await
        .map_err(|e| transport_error(&url, timeout_secs, e))?;

    let status = resp.status();
    // 410 Gone: the broker no longer knows the binding, which is the goal.
    if status.is_success() || status == reqwest::StatusCode::GONE {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BrokerError::Api {
        endpoint: url,
        status: status.as_u16(),
        body,
    })
}

/// Broker client for one managed service instance.
#[derive(Debug)]
pub struct HttpBrokerClient {
    http: reqwest::Client,
    config: BrokerClientConfig,
    instance_guid: Guid,
    endpoint: BrokerEndpoint,
    service_id: String,
    plan_id: String,
    mitigator: Arc<BrokerOrphanMitigator>,
}

impl HttpBrokerClient {
    /// Build a client for a managed instance. Fails for user-provided
    /// instances and for unparseable broker URLs.
    pub fn new(
        instance: &ServiceInstance,
        http: reqwest::Client,
        config: BrokerClientConfig,
        mitigator: Arc<BrokerOrphanMitigator>,
    ) -> Result<Self, BrokerError> {
        let ServiceInstanceKind::Managed {
            broker,
            service_id,
            plan_id,
        } = &instance.kind
        else {
            return Err(BrokerError::Config(format!(
                "service instance {} is not broker-managed",
                instance.guid
            )));
        };

        url::Url::parse(&broker.url).map_err(|e| {
            BrokerError::Config(format!("invalid broker url {:?}: {e}", broker.url))
        })?;

        Ok(Self {
            http,
            config,
            instance_guid: instance.guid.clone(),
            endpoint: broker.clone(),
            service_id: service_id.clone(),
            plan_id: plan_id.clone(),
            mitigator,
        })
    }
}

#[async_trait]
impl ServiceBrokerClient for HttpBrokerClient {
    fn attrs(&self) -> ClientAttrs {
        ClientAttrs::Broker {
            instance_guid: self.instance_guid.clone(),
            endpoint: self.endpoint.clone(),
            service_id: self.service_id.clone(),
            plan_id: self.plan_id.clone(),
        }
    }

    async fn bind(&self, binding: &ServiceBinding) -> Result<BindingAttributes, BrokerError> {
        let url = binding_url(&self.endpoint, &self.instance_guid, &binding.guid);
        let body = BindRequest {
            service_id: &self.service_id,
            plan_id: &self.plan_id,
            app_guid: binding.app_guid.as_str(),
            bind_resource: BindResource {
                app_guid: binding.app_guid.as_str(),
            },
            parameters: &binding.binding_options,
        };

        tracing::debug!(binding = %binding.guid, instance = %self.instance_guid, "broker bind");

        let resp = self
            .http
            .put(&url)
            .basic_auth(&self.endpoint.username, Some(&self.endpoint.password))
            .header(BROKER_API_VERSION_HEADER, BROKER_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&url, self.config.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BrokerError::Api {
                endpoint: url,
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<BindingAttributes>()
            .await
            .map_err(|source| BrokerError::Deserialization {
                endpoint: url,
                source,
            })
    }

    async fn unbind(&self, binding: &ServiceBinding) -> Result<(), BrokerError> {
        tracing::debug!(binding = %binding.guid, instance = %self.instance_guid, "broker unbind");
        send_unbind(
            &self.http,
            self.config.timeout_secs,
            &self.endpoint,
            &self.instance_guid,
            &self.service_id,
            &self.plan_id,
            &binding.guid,
        )
        .await
    }

    fn orphan_mitigator(&self) -> &dyn OrphanMitigator {
        self.mitigator.as_ref()
    }
}
