//! In-process broker doubles for development and tests.
//!
//! [`MockBrokerClient`] counts calls, can be told to fail or to stall, and
//! tracks how many binds overlap. [`RecordingOrphanMitigator`] records every
//! cleanup request instead of acting on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cc_core::{BindingAttributes, Guid, ServiceBinding, ServiceInstance, ServiceInstanceKind};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::client::{ClientAttrs, ClientProvider, OrphanMitigator, ServiceBrokerClient};
use crate::error::BrokerError;

/// Orphan mitigator that only records what it was asked to clean up.
#[derive(Debug, Default)]
pub struct RecordingOrphanMitigator {
    calls: Mutex<Vec<(ClientAttrs, ServiceBinding)>>,
}

impl RecordingOrphanMitigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleanup_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Binding guids passed to `cleanup_failed_bind`, in call order.
    pub fn cleaned_bindings(&self) -> Vec<Guid> {
        self.calls.lock().iter().map(|(_, binding)| binding.guid.clone()).collect()
    }

    /// Attributes and binding of every cleanup request, in call order.
    pub fn calls(&self) -> Vec<(ClientAttrs, ServiceBinding)> {
        self.calls.lock().clone()
    }
}

impl OrphanMitigator for RecordingOrphanMitigator {
    fn cleanup_failed_bind(&self, attrs: &ClientAttrs, binding: &ServiceBinding) {
        self.calls.lock().push((attrs.clone(), binding.clone()));
    }
}

/// Scriptable broker client.
#[derive(Debug)]
pub struct MockBrokerClient {
    attrs: ClientAttrs,
    credentials: Mutex<Value>,
    bind_failure: Mutex<Option<String>>,
    unbind_failure: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    bind_calls: AtomicUsize,
    unbind_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    mitigator: Arc<RecordingOrphanMitigator>,
}

impl MockBrokerClient {
    pub fn new(attrs: ClientAttrs) -> Self {
        Self {
            attrs,
            credentials: Mutex::new(json!({"username": "mock", "password": "mock-password"})),
            bind_failure: Mutex::new(None),
            unbind_failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            bind_calls: AtomicUsize::new(0),
            unbind_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            mitigator: Arc::new(RecordingOrphanMitigator::new()),
        }
    }

    /// A client whose attributes match the instance's kind.
    pub fn for_instance(instance: &ServiceInstance) -> Self {
        let attrs = match &instance.kind {
            ServiceInstanceKind::Managed {
                broker,
                service_id,
                plan_id,
            } => ClientAttrs::Broker {
                instance_guid: instance.guid.clone(),
                endpoint: broker.clone(),
                service_id: service_id.clone(),
                plan_id: plan_id.clone(),
            },
            ServiceInstanceKind::UserProvided { .. } => ClientAttrs::UserProvided {
                instance_guid: instance.guid.clone(),
            },
        };
        Self::new(attrs)
    }

    pub fn set_credentials(&self, credentials: Value) {
        *self.credentials.lock() = credentials;
    }

    /// Make every subsequent bind fail with [`BrokerError::Rejected`].
    pub fn fail_binds(&self, reason: impl Into<String>) {
        *self.bind_failure.lock() = Some(reason.into());
    }

    pub fn fail_unbinds(&self, reason: impl Into<String>) {
        *self.unbind_failure.lock() = Some(reason.into());
    }

    /// Stall each bind and unbind for `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn bind_calls(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }

    pub fn unbind_calls(&self) -> usize {
        self.unbind_calls.load(Ordering::SeqCst)
    }

    /// Highest number of bind/unbind calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn mitigator(&self) -> &RecordingOrphanMitigator {
        &self.mitigator
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceBrokerClient for MockBrokerClient {
    fn attrs(&self) -> ClientAttrs {
        self.attrs.clone()
    }

    async fn bind(&self, _binding: &ServiceBinding) -> Result<BindingAttributes, BrokerError> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let failure = self.bind_failure.lock().clone();
        let credentials = self.credentials.lock().clone();
        self.leave();
        match failure {
            Some(reason) => Err(BrokerError::Rejected(reason)),
            None => Ok(BindingAttributes {
                credentials,
                syslog_drain_url: None,
                gateway_data: None,
            }),
        }
    }

    async fn unbind(&self, _binding: &ServiceBinding) -> Result<(), BrokerError> {
        self.unbind_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let failure = self.unbind_failure.lock().clone();
        self.leave();
        match failure {
            Some(reason) => Err(BrokerError::Rejected(reason)),
            None => Ok(()),
        }
    }

    fn orphan_mitigator(&self) -> &dyn OrphanMitigator {
        self.mitigator.as_ref()
    }
}

/// Hands out one [`MockBrokerClient`] per service instance, creating it on
/// first use.
#[derive(Debug, Default)]
pub struct MockClientProvider {
    clients: Mutex<HashMap<Guid, Arc<MockBrokerClient>>>,
    lookups: AtomicUsize,
}

impl MockClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register the client for an instance.
    pub fn register(&self, instance_guid: Guid, client: Arc<MockBrokerClient>) {
        self.clients.lock().insert(instance_guid, client);
    }

    /// The client handed out for an instance, if any.
    pub fn client(&self, instance_guid: &Guid) -> Option<Arc<MockBrokerClient>> {
        self.clients.lock().get(instance_guid).cloned()
    }

    /// How many times `client_for` was called.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ClientProvider for MockClientProvider {
    fn client_for(
        &self,
        instance: &ServiceInstance,
    ) -> Result<Arc<dyn ServiceBrokerClient>, BrokerError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let client = self
            .clients
            .lock()
            .entry(instance.guid.clone())
            .or_insert_with(|| Arc::new(MockBrokerClient::for_instance(instance)))
            .clone();
        Ok(client)
    }
}
