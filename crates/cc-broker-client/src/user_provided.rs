//! Client for user-provided service instances.
//!
//! There is no broker: a bind hands back the credentials stored on the
//! instance and an unbind has nothing to undo.

use async_trait::async_trait;
use cc_core::{BindingAttributes, Guid, ServiceBinding, ServiceInstance, ServiceInstanceKind};
use serde_json::Value;

use crate::client::{ClientAttrs, OrphanMitigator, ServiceBrokerClient};
use crate::error::BrokerError;
use crate::orphan::NoopOrphanMitigator;

#[derive(Debug)]
pub struct UserProvidedClient {
    instance_guid: Guid,
    credentials: Value,
    syslog_drain_url: Option<String>,
    mitigator: NoopOrphanMitigator,
}

impl UserProvidedClient {
    pub fn new(instance: &ServiceInstance) -> Result<Self, BrokerError> {
        match &instance.kind {
            ServiceInstanceKind::UserProvided {
                credentials,
                syslog_drain_url,
            } => Ok(Self {
                instance_guid: instance.guid.clone(),
                credentials: credentials.clone(),
                syslog_drain_url: syslog_drain_url.clone(),
                mitigator: NoopOrphanMitigator,
            }),
            ServiceInstanceKind::Managed { .. } => Err(BrokerError::Config(format!(
                "service instance {} is broker-managed",
                instance.guid
            ))),
        }
    }
}

#[async_trait]
impl ServiceBrokerClient for UserProvidedClient {
    fn attrs(&self) -> ClientAttrs {
        ClientAttrs::UserProvided {
            instance_guid: self.instance_guid.clone(),
        }
    }

    async fn bind(&self, _binding: &ServiceBinding) -> Result<BindingAttributes, BrokerError> {
        Ok(BindingAttributes {
            credentials: self.credentials.clone(),
            syslog_drain_url: self.syslog_drain_url.clone(),
            gateway_data: None,
        })
    }

    async fn unbind(&self, _binding: &ServiceBinding) -> Result<(), BrokerError> {
        Ok(())
    }

    fn orphan_mitigator(&self) -> &dyn OrphanMitigator {
        &self.mitigator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn bind_returns_instance_credentials() {
        let instance = ServiceInstance {
            guid: Guid::from("ups-1"),
            name: "creds".into(),
            space_guid: Guid::from("space"),
            bindable: true,
            kind: ServiceInstanceKind::UserProvided {
                credentials: json!({"username": "admin"}),
                syslog_drain_url: Some("syslog://logs".into()),
            },
        };
        let client = UserProvidedClient::new(&instance).unwrap();
        let binding = ServiceBinding::new(Guid::from("app"), instance.guid.clone(), json!({}));
        let attrs = client.bind(&binding).await.unwrap();
        assert_eq!(attrs.credentials, json!({"username": "admin"}));
        assert_eq!(attrs.syslog_drain_url.as_deref(), Some("syslog://logs"));
        client.unbind(&binding).await.unwrap();
    }
}
