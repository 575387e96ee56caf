//! Client traits and the default per-instance client provider.

use std::sync::Arc;

use async_trait::async_trait;
use cc_core::{BindingAttributes, BrokerEndpoint, Guid, ServiceBinding, ServiceInstance, ServiceInstanceKind};

use crate::error::BrokerError;
use crate::http::{BrokerClientConfig, HttpBrokerClient};
use crate::orphan::BrokerOrphanMitigator;
use crate::user_provided::UserProvidedClient;

/// Everything needed to reach the backend of one service instance again,
/// independent of the client that made the original call.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAttrs {
    Broker {
        instance_guid: Guid,
        endpoint: BrokerEndpoint,
        service_id: String,
        plan_id: String,
    },
    UserProvided {
        instance_guid: Guid,
    },
}

impl ClientAttrs {
    pub fn instance_guid(&self) -> &Guid {
        match self {
            Self::Broker { instance_guid, .. } | Self::UserProvided { instance_guid } => {
                instance_guid
            }
        }
    }
}

/// Bind/unbind calls against one service instance's backend.
#[async_trait]
pub trait ServiceBrokerClient: Send + Sync {
    /// Attributes identifying the backend, for later compensation.
    fn attrs(&self) -> ClientAttrs;

    /// Create the binding on the backend. Not reversible by itself.
    async fn bind(&self, binding: &ServiceBinding) -> Result<BindingAttributes, BrokerError>;

    /// Remove the binding from the backend.
    async fn unbind(&self, binding: &ServiceBinding) -> Result<(), BrokerError>;

    /// Compensation used when a bind cannot be completed locally.
    fn orphan_mitigator(&self) -> &dyn OrphanMitigator;
}

/// Best-effort reversal of a bind whose local persistence failed.
///
/// Fire-and-forget: the outcome is logged, never returned.
pub trait OrphanMitigator: Send + Sync {
    fn cleanup_failed_bind(&self, attrs: &ClientAttrs, binding: &ServiceBinding);
}

/// Resolves the client for a service instance.
pub trait ClientProvider: Send + Sync {
    fn client_for(
        &self,
        instance: &ServiceInstance,
    ) -> Result<Arc<dyn ServiceBrokerClient>, BrokerError>;
}

/// HTTP client for managed instances, local client for user-provided ones.
#[derive(Debug, Clone)]
pub struct DefaultClientProvider {
    http: reqwest::Client,
    config: BrokerClientConfig,
    mitigator: Arc<BrokerOrphanMitigator>,
}

impl DefaultClientProvider {
    pub fn new(config: BrokerClientConfig) -> Result<Self, BrokerError> {
        let http = config.build_http_client()?;
        let mitigator = Arc::new(BrokerOrphanMitigator::new(http.clone(), config.clone()));
        Ok(Self {
            http,
            config,
            mitigator,
        })
    }
}

impl ClientProvider for DefaultClientProvider {
    fn client_for(
        &self,
        instance: &ServiceInstance,
    ) -> Result<Arc<dyn ServiceBrokerClient>, BrokerError> {
        match &instance.kind {
            ServiceInstanceKind::Managed { .. } => Ok(Arc::new(HttpBrokerClient::new(
                instance,
                self.http.clone(),
                self.config.clone(),
                Arc::clone(&self.mitigator),
            )?)),
            ServiceInstanceKind::UserProvided { .. } => {
                Ok(Arc::new(UserProvidedClient::new(instance)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(kind: ServiceInstanceKind) -> ServiceInstance {
        ServiceInstance {
            guid: Guid::from("si-1"),
            name: "db".into(),
            space_guid: Guid::from("space-1"),
            bindable: true,
            kind,
        }
    }

    #[test]
    fn provider_picks_client_by_instance_kind() {
        let provider = DefaultClientProvider::new(BrokerClientConfig::default()).unwrap();

        let managed = instance(ServiceInstanceKind::Managed {
            broker: BrokerEndpoint {
                url: "http://broker.example.com".into(),
                username: "admin".into(),
                password: "secret".into(),
            },
            service_id: "svc".into(),
            plan_id: "plan".into(),
        });
        let client = provider.client_for(&managed).unwrap();
        assert!(matches!(client.attrs(), ClientAttrs::Broker { .. }));

        let ups = instance(ServiceInstanceKind::UserProvided {
            credentials: json!({"uri": "postgres://"}),
            syslog_drain_url: None,
        });
        let client = provider.client_for(&ups).unwrap();
        assert_eq!(
            client.attrs(),
            ClientAttrs::UserProvided {
                instance_guid: Guid::from("si-1")
            }
        );
    }

    #[test]
    fn invalid_broker_url_is_a_config_error() {
        let provider = DefaultClientProvider::new(BrokerClientConfig::default()).unwrap();
        let managed = instance(ServiceInstanceKind::Managed {
            broker: BrokerEndpoint {
                url: "not a url".into(),
                username: String::new(),
                password: String::new(),
            },
            service_id: "svc".into(),
            plan_id: "plan".into(),
        });
        assert!(matches!(
            provider.client_for(&managed),
            Err(BrokerError::Config(_))
        ));
    }
}
