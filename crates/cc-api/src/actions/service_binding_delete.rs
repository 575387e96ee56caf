//! # Service Binding Delete
//!
//! Resolves the binding with read access (missing or unreadable is
//! not-found), checks write access, refuses to orphan associations unless
//! the delete is recursive, then runs a [`DeletionJob`] either inline or
//! through the [`JobQueue`](crate::jobs::JobQueue).
//!
//! Managed instances are unbound at the broker before the row is removed.
//! The instance lock is held until the job has been performed or enqueued.

use cc_broker_client::BrokerError;
use cc_core::Guid;
use cc_store::StoreError;
use thiserror::Error;

use crate::access::{Operation, RequestContext};
use crate::jobs::{DeletionJob, DeletionJobError, JobQueueError};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Remove dependent associations along with the binding.
    pub recursive: bool,
    /// Return once the job is queued instead of waiting for it.
    pub run_async: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Carries the job guid.
    Enqueued(Guid),
}

#[derive(Error, Debug)]
pub enum ServiceBindingDeleteError {
    #[error("service binding {0} not found")]
    NotFound(Guid),

    #[error("not authorized to delete service binding")]
    NotAuthorized,

    #[error("service binding {guid} has {count} dependent associations")]
    AssociationNotEmpty { guid: Guid, count: u64 },

    #[error(transparent)]
    Job(#[from] DeletionJobError),

    #[error(transparent)]
    Queue(#[from] JobQueueError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ServiceBindingDelete<'a> {
    state: &'a AppState,
    context: &'a RequestContext,
}

impl<'a> ServiceBindingDelete<'a> {
    pub fn new(state: &'a AppState, context: &'a RequestContext) -> Self {
        Self { state, context }
    }

    pub async fn delete(
        &self,
        guid: &Guid,
        options: DeleteOptions,
    ) -> Result<DeleteOutcome, ServiceBindingDeleteError> {
        use ServiceBindingDeleteError as E;

        let store = &self.state.store;
        let permissions = &self.context.permissions;

        let binding = store
            .find_service_binding(guid)
            .await?
            .ok_or_else(|| E::NotFound(guid.clone()))?;
        let app = match store.find_app(&binding.app_guid).await? {
            Some(app) if permissions.can_read(&app.space_guid) => app,
            _ => return Err(E::NotFound(guid.clone())),
        };
        permissions
            .validate_access(Operation::Delete, &app.space_guid)
            .map_err(|_| E::NotAuthorized)?;

        if !options.recursive {
            let count = store.count_binding_associations(&binding.guid).await?;
            if count > 0 {
                return Err(E::AssociationNotEmpty {
                    guid: binding.guid.clone(),
                    count,
                });
            }
        }

        let instance = store
            .find_service_instance(&binding.service_instance_guid)
            .await?;
        let managed = instance.as_ref().filter(|i| i.is_managed());
        let client = match managed {
            Some(instance) => Some(self.state.brokers.client_for(instance)?),
            None => None,
        };

        let _lock = match managed {
            Some(instance) => self.state.locks.lock_if_managed(instance).await,
            None => None,
        };
        let job = DeletionJob::new(
            binding,
            client,
            options.recursive,
            self.context.actor.clone(),
            store.clone(),
            self.state.events.clone(),
        );

        if options.run_async {
            let job_guid = self.state.jobs.enqueue(job)?;
            tracing::info!(binding = %guid, job = %job_guid, "service binding deletion queued");
            Ok(DeleteOutcome::Enqueued(job_guid))
        } else {
            job.perform().await?;
            Ok(DeleteOutcome::Deleted)
        }
    }
}
