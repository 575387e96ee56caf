//! Orphan mitigation.
//!
//! When a broker bind succeeds but the binding cannot be persisted, the
//! broker holds a binding nobody knows about. [`BrokerOrphanMitigator`]
//! spawns a background unbind with retry; the caller never waits for it.

use cc_core::ServiceBinding;

use crate::client::{ClientAttrs, OrphanMitigator};
use crate::http::{send_unbind, BrokerClientConfig};
use crate::retry::retry;

/// Spawns a best-effort broker unbind for a failed bind.
#[derive(Debug, Clone)]
pub struct BrokerOrphanMitigator {
    http: reqwest::Client,
    config: BrokerClientConfig,
}

impl BrokerOrphanMitigator {
    pub fn new(http: reqwest::Client, config: BrokerClientConfig) -> Self {
        Self { http, config }
    }
}

impl OrphanMitigator for BrokerOrphanMitigator {
    fn cleanup_failed_bind(&self, attrs: &ClientAttrs, binding: &ServiceBinding) {
        let ClientAttrs::Broker {
            instance_guid,
            endpoint,
            service_id,
            plan_id,
        } = attrs.clone()
        else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                binding = %binding.guid,
                "no async runtime available, orphaned binding left on broker"
            );
            return;
        };

        let http = self.http.clone();
        let timeout_secs = self.config.timeout_secs;
        let binding_guid = binding.guid.clone();

        runtime.spawn(async move {
            let result = retry("orphan unbind", || {
                send_unbind(
                    &http,
                    timeout_secs,
                    &endpoint,
                    &instance_guid,
                    &service_id,
                    &plan_id,
                    &binding_guid,
                )
            })
            .await;
            match result {
                Ok(()) => tracing::info!(
                    binding = %binding_guid,
                    instance = %instance_guid,
                    "orphaned binding removed from broker"
                ),
                Err(e) => tracing::warn!(
                    binding = %binding_guid,
                    instance = %instance_guid,
                    error = %e,
                    "orphan mitigation failed, binding may remain on broker"
                ),
            }
        });
    }
}

/// Used where nothing can be orphaned (user-provided instances).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOrphanMitigator;

impl OrphanMitigator for NoopOrphanMitigator {
    fn cleanup_failed_bind(&self, attrs: &ClientAttrs, binding: &ServiceBinding) {
        tracing::debug!(
            binding = %binding.guid,
            instance = %attrs.instance_guid(),
            "no orphan mitigation needed"
        );
    }
}
