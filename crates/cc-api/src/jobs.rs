//! # Deletion Jobs
//!
//! A [`DeletionJob`] removes one service binding: broker unbind (managed
//! instances only), row removal (plus dependent associations when
//! recursive) and the delete audit event, the last two in one transaction.
//!
//! Jobs run inline or through the [`JobQueue`], a Tokio mpsc channel drained
//! by a single worker task. Failures of queued jobs are logged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cc_broker_client::{BrokerError, ServiceBrokerClient};
use cc_core::{Guid, ServiceBinding};
use cc_store::{Store, StoreError};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::audit::{BindingEventKind, EventRecorder};
use crate::auth::Actor;

#[derive(Error, Debug)]
pub enum DeletionJobError {
    #[error("broker unbind failed: {0}")]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JobQueueError {
    #[error("job queue is not running")]
    Closed,
}

/// Everything needed to delete one binding, detached from the request.
pub struct DeletionJob {
    pub guid: Guid,
    binding: ServiceBinding,
    client: Option<Arc<dyn ServiceBrokerClient>>,
    recursive: bool,
    actor: Actor,
    store: Arc<dyn Store>,
    events: Arc<dyn EventRecorder>,
}

impl std::fmt::Debug for DeletionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionJob")
            .field("guid", &self.guid)
            .field("binding", &self.binding.guid)
            .field("unbind", &self.client.is_some())
            .field("recursive", &self.recursive)
            .finish()
    }
}

impl DeletionJob {
    /// `client` is `Some` only for managed instances.
    pub fn new(
        binding: ServiceBinding,
        client: Option<Arc<dyn ServiceBrokerClient>>,
        recursive: bool,
        actor: Actor,
        store: Arc<dyn Store>,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            guid: Guid::generate(),
            binding,
            client,
            recursive,
            actor,
            store,
            events,
        }
    }

    pub async fn perform(self) -> Result<(), DeletionJobError> {
        if let Some(client) = &self.client {
            client.unbind(&self.binding).await?;
        }

        let mut tx = self.store.begin().await?;
        if self.recursive {
            let removed = tx.delete_binding_associations(&self.binding.guid).await?;
            if removed > 0 {
                tracing::debug!(binding = %self.binding.guid, removed, "associations removed");
            }
        }
        tx.delete_service_binding(&self.binding.guid).await?;
        self.events
            .record_service_binding_event(
                tx.as_mut(),
                BindingEventKind::Delete,
                &self.binding,
                &self.actor,
            )
            .await?;
        tx.commit().await?;

        tracing::info!(binding = %self.binding.guid, job = %self.guid, "service binding deleted");
        Ok(())
    }
}

/// Background queue for deletion jobs.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<DeletionJob>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

impl JobQueue {
    /// Create the queue and spawn its worker on the current runtime.
    ///
    /// Outside a runtime the worker cannot start and every enqueue fails
    /// with [`JobQueueError::Closed`].
    pub fn start() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_worker(receiver, pending.clone(), idle.clone()));
            }
            Err(_) => {
                tracing::warn!("no async runtime available, deletion job worker not started");
            }
        }

        Self {
            sender,
            pending,
            idle,
        }
    }

    /// Hand a job to the worker, returning its guid.
    pub fn enqueue(&self, job: DeletionJob) -> Result<Guid, JobQueueError> {
        let guid = job.guid.clone();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(JobQueueError::Closed);
        }
        tracing::debug!(job = %guid, "deletion job enqueued");
        Ok(guid)
    }

    /// Jobs enqueued but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every enqueued job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<DeletionJob>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
) {
    while let Some(job) = receiver.recv().await {
        let job_guid = job.guid.clone();
        let binding_guid = job.binding.guid.clone();
        if let Err(e) = job.perform().await {
            tracing::error!(
                job = %job_guid,
                binding = %binding_guid,
                error = %e,
                "deletion job failed"
            );
        }
        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEventRepository, SERVICE_BINDING_DELETE_EVENT};
    use cc_broker_client::mock::MockBrokerClient;
    use cc_broker_client::ClientAttrs;
    use cc_core::{App, ServiceBindingAssociation, Space};
    use cc_store::MemoryStore;
    use serde_json::json;

    fn seeded() -> (MemoryStore, ServiceBinding) {
        let store = MemoryStore::new();
        store.put_space(Space {
            guid: Guid::from("space"),
            name: "dev".into(),
            organization_guid: Guid::from("org"),
        });
        store.put_app(App {
            guid: Guid::from("app"),
            name: "app".into(),
            space_guid: Guid::from("space"),
        });
        let binding = ServiceBinding::new(Guid::from("app"), Guid::from("si"), json!({}));
        store.put_service_binding(binding.clone());
        (store, binding)
    }

    fn job(
        store: &MemoryStore,
        binding: ServiceBinding,
        client: Option<Arc<dyn ServiceBrokerClient>>,
        recursive: bool,
    ) -> DeletionJob {
        let store: Arc<dyn Store> = Arc::new(store.clone());
        let events = Arc::new(AuditEventRepository::new(store.clone()));
        DeletionJob::new(binding, client, recursive, Actor::admin(), store, events)
    }

    fn mock_client() -> Arc<MockBrokerClient> {
        Arc::new(MockBrokerClient::new(ClientAttrs::UserProvided {
            instance_guid: Guid::from("si"),
        }))
    }

    #[tokio::test]
    async fn perform_unbinds_then_deletes_and_audits() {
        let (store, binding) = seeded();
        let client = mock_client();
        job(&store, binding, Some(client.clone() as Arc<dyn ServiceBrokerClient>), false)
            .perform()
            .await
            .unwrap();

        assert_eq!(client.unbind_calls(), 1);
        assert!(store.service_bindings().is_empty());
        let events = store.audit_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SERVICE_BINDING_DELETE_EVENT);
    }

    #[tokio::test]
    async fn failed_unbind_keeps_binding() {
        let (store, binding) = seeded();
        let client = mock_client();
        client.fail_unbinds("broker down");
        let err = job(&store, binding, Some(client as Arc<dyn ServiceBrokerClient>), false)
            .perform()
            .await
            .unwrap_err();
        assert!(matches!(err, DeletionJobError::Broker(_)));
        assert_eq!(store.service_bindings().len(), 1);
        assert!(store.audit_events().is_empty());
    }

    #[tokio::test]
    async fn recursive_job_removes_associations() {
        let (store, binding) = seeded();
        store.put_binding_association(ServiceBindingAssociation {
            guid: Guid::from("assoc"),
            service_binding_guid: binding.guid.clone(),
            relation: "route".into(),
        });

        let err = job(&store, binding.clone(), None, false)
            .perform()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeletionJobError::Store(StoreError::HasDependents { .. })
        ));

        job(&store, binding, None, true).perform().await.unwrap();
        assert!(store.service_bindings().is_empty());
        assert!(store.binding_associations().is_empty());
    }

    #[tokio::test]
    async fn queue_runs_jobs_and_reports_idle() {
        let (store, binding) = seeded();
        let queue = JobQueue::start();
        let client = mock_client();
        client.set_delay(std::time::Duration::from_millis(20));

        queue
            .enqueue(job(
                &store,
                binding,
                Some(client.clone() as Arc<dyn ServiceBrokerClient>),
                false,
            ))
            .unwrap();
        assert_eq!(queue.pending(), 1);

        tokio::time::timeout(std::time::Duration::from_secs(2), queue.wait_idle())
            .await
            .expect("queue drains");
        assert_eq!(queue.pending(), 0);
        assert!(store.service_bindings().is_empty());
        assert_eq!(client.unbind_calls(), 1);
    }

    #[test]
    fn queue_without_runtime_rejects_jobs() {
        let queue = JobQueue::start();
        let (store, binding) = seeded();
        assert_eq!(
            queue.enqueue(job(&store, binding, None, false)).unwrap_err(),
            JobQueueError::Closed
        );
        assert_eq!(queue.pending(), 0);
    }
}
