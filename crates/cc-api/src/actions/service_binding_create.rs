//! # Service Binding Create
//!
//! Binds an app to a service instance. The broker call and the local insert
//! cannot share a transaction, so the workflow tracks an explicit
//! [`BindPhase`]:
//!
//! ```text
//! Pending ──bind ok──▶ Bound ──persist ok──▶ Persisted
//!    │                   │
//!    └──────failure──────┴──▶ ReversalAttempted ──▶ Failed
//! ```
//!
//! Any failure from the bind call onward triggers the client's orphan
//! mitigator exactly once and the original error is returned. The
//! mitigator's own outcome never reaches the caller.
//!
//! Managed instances are locked for the broker call and the insert. The
//! `audit.service_binding.create` event is written after the lock is
//! released, in its own transaction.

use cc_broker_client::{BrokerError, ClientProvider, ServiceBrokerClient};
use cc_core::{Guid, ServiceBinding, ValidationErrors, ValidationKind};
use cc_store::{Store, StoreError, SERVICE_BINDING_KEY};
use serde_json::Value;
use thiserror::Error;

use crate::access::{Operation, RequestContext};
use crate::audit::{BindingEventKind, EventRecorder};
use crate::locks::InstanceLocks;

#[derive(Error, Debug)]
pub enum ServiceBindingCreateError {
    #[error("service instance {0} not found")]
    ServiceInstanceNotFound(Guid),

    #[error("service instance is not bindable")]
    UnbindableService,

    #[error("app {0} not found")]
    AppNotFound(Guid),

    #[error("not authorized to bind in this space")]
    NotAuthorized,

    #[error("app {app_guid} is already bound to service instance {service_instance_guid}")]
    AppServiceTaken {
        app_guid: Guid,
        service_instance_guid: Guid,
    },

    #[error("invalid service binding: {}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceBindingCreateError {
    /// Classify validation failures for `binding`. Non-validation store
    /// errors pass through unchanged.
    pub fn from_store(err: StoreError, binding: &ServiceBinding) -> Self {
        match err {
            StoreError::Validation(errors) => Self::from_validation(&errors, binding),
            other => Self::Store(other),
        }
    }

    fn from_validation(errors: &ValidationErrors, binding: &ServiceBinding) -> Self {
        if errors.has(&SERVICE_BINDING_KEY, ValidationKind::Unique) {
            Self::AppServiceTaken {
                app_guid: binding.app_guid.clone(),
                service_instance_guid: binding.service_instance_guid.clone(),
            }
        } else if errors.has(&["app"], ValidationKind::Presence) {
            Self::AppNotFound(binding.app_guid.clone())
        } else if errors.has(&["service_instance"], ValidationKind::Presence) {
            Self::ServiceInstanceNotFound(binding.service_instance_guid.clone())
        } else {
            Self::Invalid(errors.full_messages())
        }
    }
}

/// Where a bind attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPhase {
    Pending,
    Bound,
    Persisted,
    ReversalAttempted,
    Failed,
}

impl BindPhase {
    pub fn can_advance_to(self, next: BindPhase) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Bound)
                | (Self::Bound, Self::Persisted)
                | (Self::Pending, Self::ReversalAttempted)
                | (Self::Bound, Self::ReversalAttempted)
                | (Self::ReversalAttempted, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::Failed)
    }
}

/// Validated input for a new binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBindingRequest {
    pub app_guid: Guid,
    pub service_instance_guid: Guid,
    pub binding_options: Value,
}

/// One bind against one client, from broker call to local row.
struct BindAttempt<'c> {
    client: &'c dyn ServiceBrokerClient,
    binding: ServiceBinding,
    phase: BindPhase,
}

impl<'c> BindAttempt<'c> {
    fn new(client: &'c dyn ServiceBrokerClient, binding: ServiceBinding) -> Self {
        Self {
            client,
            binding,
            phase: BindPhase::Pending,
        }
    }

    fn advance(&mut self, next: BindPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal bind transition {:?} -> {next:?}",
            self.phase
        );
        tracing::debug!(binding = %self.binding.guid, from = ?self.phase, to = ?next, "bind phase");
        self.phase = next;
    }

    async fn run(&mut self, store: &dyn Store) -> Result<(), ServiceBindingCreateError> {
        let attributes = self.client.bind(&self.binding).await?;
        self.binding.apply(attributes);
        self.advance(BindPhase::Bound);

        persist(store, &self.binding)
            .await
            .map_err(|e| ServiceBindingCreateError::from_store(e, &self.binding))?;
        self.advance(BindPhase::Persisted);
        Ok(())
    }

    fn reverse(&mut self) {
        self.advance(BindPhase::ReversalAttempted);
        self.client
            .orphan_mitigator()
            .cleanup_failed_bind(&self.client.attrs(), &self.binding);
        self.advance(BindPhase::Failed);
    }
}

async fn persist(store: &dyn Store, binding: &ServiceBinding) -> Result<(), StoreError> {
    let mut tx = store.begin().await?;
    tx.insert_service_binding(binding).await?;
    tx.commit().await
}

pub struct ServiceBindingCreate<'a> {
    store: &'a dyn Store,
    brokers: &'a dyn ClientProvider,
    locks: &'a InstanceLocks,
    events: &'a dyn EventRecorder,
    context: &'a RequestContext,
}

impl<'a> ServiceBindingCreate<'a> {
    pub fn new(
        store: &'a dyn Store,
        brokers: &'a dyn ClientProvider,
        locks: &'a InstanceLocks,
        events: &'a dyn EventRecorder,
        context: &'a RequestContext,
    ) -> Self {
        Self {
            store,
            brokers,
            locks,
            events,
            context,
        }
    }

    pub async fn create(
        &self,
        request: ServiceBindingRequest,
    ) -> Result<ServiceBinding, ServiceBindingCreateError> {
        use ServiceBindingCreateError as E;

        let instance = self
            .store
            .find_service_instance(&request.service_instance_guid)
            .await
            .map_err(E::Store)?
            .ok_or_else(|| E::ServiceInstanceNotFound(request.service_instance_guid.clone()))?;
        if !instance.bindable {
            return Err(E::UnbindableService);
        }
        let app = self
            .store
            .find_app(&request.app_guid)
            .await
            .map_err(E::Store)?
            .ok_or_else(|| E::AppNotFound(request.app_guid.clone()))?;

        let binding = ServiceBinding::new(
            app.guid.clone(),
            instance.guid.clone(),
            request.binding_options,
        );
        self.context
            .permissions
            .validate_access(Operation::Create, &app.space_guid)
            .map_err(|_| E::NotAuthorized)?;
        self.store
            .validate_service_binding(&binding)
            .await
            .map_err(|e| E::from_store(e, &binding))?;

        let client = self.brokers.client_for(&instance)?;
        let binding = {
            let _lock = self.locks.lock_if_managed(&instance).await;
            self.bind_and_persist(client.as_ref(), binding).await?
        };

        let mut tx = self.store.begin().await.map_err(E::Store)?;
        self.events
            .record_service_binding_event(
                tx.as_mut(),
                BindingEventKind::Create,
                &binding,
                &self.context.actor,
            )
            .await
            .map_err(E::Store)?;
        tx.commit().await.map_err(E::Store)?;

        tracing::info!(
            binding = %binding.guid,
            app = %binding.app_guid,
            service_instance = %binding.service_instance_guid,
            "service binding created"
        );
        Ok(binding)
    }

    async fn bind_and_persist(
        &self,
        client: &dyn ServiceBrokerClient,
        binding: ServiceBinding,
    ) -> Result<ServiceBinding, ServiceBindingCreateError> {
        let mut attempt = BindAttempt::new(client, binding);
        match attempt.run(self.store).await {
            Ok(()) => Ok(attempt.binding),
            Err(err) => {
                tracing::warn!(
                    binding = %attempt.binding.guid,
                    phase = ?attempt.phase,
                    error = %err,
                    "bind failed, attempting orphan mitigation"
                );
                attempt.reverse();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEventRepository, SERVICE_BINDING_CREATE_EVENT};
    use crate::auth::{Actor, Scopes};
    use crate::access::Permissions;
    use crate::test_support::*;
    use cc_broker_client::mock::MockClientProvider;
    use cc_core::{SpaceRole, SpaceRoleKind};
    use cc_store::{MemoryStore, WriteTarget};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        store: MemoryStore,
        brokers: MockClientProvider,
        locks: InstanceLocks,
        events: AuditEventRepository,
        context: RequestContext,
    }

    fn fixture() -> Fixture {
        let store = seeded_store();
        let events = AuditEventRepository::new(Arc::new(store.clone()));
        Fixture {
            store,
            brokers: MockClientProvider::new(),
            locks: InstanceLocks::new(),
            events,
            context: RequestContext::admin(),
        }
    }

    impl Fixture {
        async fn create(&self, instance: &str) -> Result<ServiceBinding, ServiceBindingCreateError> {
            ServiceBindingCreate::new(
                &self.store,
                &self.brokers,
                &self.locks,
                &self.events,
                &self.context,
            )
            .create(request(APP, instance))
            .await
        }

        fn client(&self, instance: &str) -> Arc<cc_broker_client::mock::MockBrokerClient> {
            self.brokers.client(&Guid::from(instance)).unwrap()
        }
    }

    fn request(app: &str, instance: &str) -> ServiceBindingRequest {
        ServiceBindingRequest {
            app_guid: Guid::from(app),
            service_instance_guid: Guid::from(instance),
            binding_options: json!({}),
        }
    }

    #[test]
    fn phase_transitions() {
        use BindPhase::*;
        assert!(Pending.can_advance_to(Bound));
        assert!(Bound.can_advance_to(Persisted));
        assert!(Bound.can_advance_to(ReversalAttempted));
        assert!(ReversalAttempted.can_advance_to(Failed));
        assert!(!Pending.can_advance_to(Persisted));
        assert!(!Persisted.can_advance_to(ReversalAttempted));
        assert!(!Failed.can_advance_to(Pending));
        assert!(Persisted.is_terminal() && Failed.is_terminal());
        assert!(!Bound.is_terminal());
    }

    #[tokio::test]
    async fn binds_persists_and_audits() {
        let fx = fixture();
        let binding = fx.create(MANAGED_INSTANCE).await.unwrap();

        assert_eq!(binding.credentials["username"], "mock");
        assert_eq!(fx.store.service_bindings(), vec![binding.clone()]);
        let events = fx.store.audit_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SERVICE_BINDING_CREATE_EVENT);
        assert_eq!(events[0].actee, binding.guid);
        let client = fx.client(MANAGED_INSTANCE);
        assert_eq!(client.bind_calls(), 1);
        assert_eq!(client.mitigator().cleanup_count(), 0);
        assert!(!fx.locks.is_locked(&Guid::from(MANAGED_INSTANCE)));
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let fx = fixture();
        let err = fx.create("nope").await.unwrap_err();
        assert!(matches!(err, ServiceBindingCreateError::ServiceInstanceNotFound(g) if g.as_str() == "nope"));
        assert_eq!(fx.brokers.lookups(), 0);
    }

    #[tokio::test]
    async fn unbindable_instance_rejected_before_broker() {
        let fx = fixture();
        let err = fx.create(UNBINDABLE_INSTANCE).await.unwrap_err();
        assert!(matches!(err, ServiceBindingCreateError::UnbindableService));
        assert_eq!(fx.brokers.lookups(), 0);
        assert!(fx.store.service_bindings().is_empty());
    }

    #[tokio::test]
    async fn auditor_is_not_authorized() {
        let mut fx = fixture();
        let scopes = Scopes::parse("cloud_controller.read cloud_controller.write");
        fx.context = RequestContext::new(
            Actor {
                guid: Guid::from("auditor"),
                email: None,
                scopes,
            },
            Permissions::new(
                scopes,
                vec![SpaceRole {
                    user_guid: Guid::from("auditor"),
                    space_guid: Guid::from(SPACE),
                    role: SpaceRoleKind::Auditor,
                }],
            ),
        );
        let err = fx.create(MANAGED_INSTANCE).await.unwrap_err();
        assert!(matches!(err, ServiceBindingCreateError::NotAuthorized));
        assert_eq!(fx.brokers.lookups(), 0);
    }

    #[tokio::test]
    async fn instance_in_other_space_is_invalid() {
        let fx = fixture();
        fx.store
            .put_service_instance(managed_instance("far", OTHER_SPACE, true));
        let err = fx.create("far").await.unwrap_err();
        match err {
            ServiceBindingCreateError::Invalid(messages) => {
                assert_eq!(messages, vec!["service_instance must belong to the same space"])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_binding_is_taken_without_broker_call() {
        let fx = fixture();
        fx.create(USER_PROVIDED_INSTANCE).await.unwrap();
        let err = fx.create(USER_PROVIDED_INSTANCE).await.unwrap_err();
        assert!(matches!(err, ServiceBindingCreateError::AppServiceTaken { .. }));
        assert_eq!(fx.client(USER_PROVIDED_INSTANCE).bind_calls(), 1);
    }

    #[tokio::test]
    async fn broker_failure_mitigates_once_and_returns_broker_error() {
        let fx = fixture();
        let instance = fx
            .store
            .find_service_instance(&Guid::from(MANAGED_INSTANCE))
            .await
            .unwrap()
            .unwrap();
        let client = Arc::new(cc_broker_client::mock::MockBrokerClient::for_instance(&instance));
        client.fail_binds("catalog mismatch");
        fx.brokers.register(instance.guid.clone(), client.clone());

        let err = fx.create(MANAGED_INSTANCE).await.unwrap_err();

        assert!(matches!(err, ServiceBindingCreateError::Broker(BrokerError::Rejected(_))));
        assert_eq!(client.mitigator().cleanup_count(), 1);
        assert!(fx.store.service_bindings().is_empty());
        assert!(fx.store.audit_events().is_empty());
    }

    #[tokio::test]
    async fn persist_failure_mitigates_once_and_returns_store_error() {
        let fx = fixture();
        fx.store.fail_next_write(
            WriteTarget::ServiceBinding,
            StoreError::Database("disk full".into()),
        );

        let err = fx.create(MANAGED_INSTANCE).await.unwrap_err();

        match err {
            ServiceBindingCreateError::Store(StoreError::Database(msg)) => assert_eq!(msg, "disk full"),
            other => panic!("unexpected error: {other:?}"),
        }
        let client = fx.client(MANAGED_INSTANCE);
        assert_eq!(client.bind_calls(), 1);
        let mitigator = client.mitigator();
        assert_eq!(mitigator.cleanup_count(), 1);
        let (attrs, partial) = &mitigator.calls()[0];
        assert_eq!(*attrs, client.attrs());
        assert_eq!(partial.service_instance_guid.as_str(), MANAGED_INSTANCE);
        assert_eq!(partial.credentials["username"], "mock");
        assert!(fx.store.service_bindings().is_empty());
        assert!(fx.store.audit_events().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_also_mitigates() {
        let fx = fixture();
        fx.store
            .fail_next_write(WriteTarget::Commit, StoreError::Database("lost".into()));
        let err = fx.create(USER_PROVIDED_INSTANCE).await.unwrap_err();
        assert!(matches!(err, ServiceBindingCreateError::Store(_)));
        assert_eq!(fx.client(USER_PROVIDED_INSTANCE).mitigator().cleanup_count(), 1);
    }

    #[tokio::test]
    async fn audit_failure_after_persist_does_not_mitigate() {
        let fx = fixture();
        fx.store
            .fail_next_write(WriteTarget::AuditEvent, StoreError::Database("audit".into()));
        let err = fx.create(MANAGED_INSTANCE).await.unwrap_err();
        assert!(matches!(err, ServiceBindingCreateError::Store(_)));
        assert_eq!(fx.store.service_bindings().len(), 1);
        assert_eq!(fx.client(MANAGED_INSTANCE).mitigator().cleanup_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn managed_binds_are_serialized_per_instance() {
        let fx = Arc::new(fixture());
        for app in ["a1", "a2", "a3"] {
            fx.store.put_app(cc_core::App {
                guid: Guid::from(app),
                name: app.into(),
                space_guid: Guid::from(SPACE),
            });
        }
        let instance = fx
            .store
            .find_service_instance(&Guid::from(MANAGED_INSTANCE))
            .await
            .unwrap()
            .unwrap();
        let client = Arc::new(cc_broker_client::mock::MockBrokerClient::for_instance(&instance));
        client.set_delay(Duration::from_millis(20));
        fx.brokers.register(instance.guid.clone(), client.clone());

        let mut handles = Vec::new();
        for app in ["a1", "a2", "a3"] {
            let fx = fx.clone();
            handles.push(tokio::spawn(async move {
                ServiceBindingCreate::new(&fx.store, &fx.brokers, &fx.locks, &fx.events, &fx.context)
                    .create(request(app, MANAGED_INSTANCE))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(client.bind_calls(), 3);
        assert_eq!(client.max_in_flight(), 1);
        assert_eq!(fx.store.service_bindings().len(), 3);
    }
}
