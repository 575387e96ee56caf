//! Per-service-instance locks.
//!
//! Bind and unbind calls against one managed instance run one at a time.
//! User-provided instances have no broker-side state and are never locked.
//! The guard is released on drop, and an instance's entry is removed once
//! nobody holds or waits for it.

use std::sync::Arc;

use cc_core::{Guid, ServiceInstance};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<Guid, Arc<Mutex<()>>>;

/// Held while an operation owns a service instance.
#[derive(Debug)]
pub struct InstanceLockGuard {
    instance_guid: Guid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl InstanceLockGuard {
    pub fn instance_guid(&self) -> &Guid {
        &self.instance_guid
    }
}

impl Drop for InstanceLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters and holders keep their own clone of the mutex.
        self.locks
            .remove_if(&self.instance_guid, |_, mutex| Arc::strong_count(mutex) == 1);
        tracing::debug!(instance = %self.instance_guid, "service instance lock released");
    }
}

/// Registry of async mutexes keyed by service-instance guid.
#[derive(Debug, Clone, Default)]
pub struct InstanceLocks {
    locks: Arc<LockMap>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the instance's lock is free, then take it.
    pub async fn lock(&self, instance_guid: &Guid) -> InstanceLockGuard {
        let mutex = self
            .locks
            .entry(instance_guid.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = match mutex.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(instance = %instance_guid, "waiting for service instance lock");
                mutex.lock_owned().await
            }
        };
        InstanceLockGuard {
            instance_guid: instance_guid.clone(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Lock managed instances; user-provided instances get `None`.
    pub async fn lock_if_managed(&self, instance: &ServiceInstance) -> Option<InstanceLockGuard> {
        if instance.is_managed() {
            Some(self.lock(&instance.guid).await)
        } else {
            None
        }
    }

    /// Whether the instance is currently locked.
    pub fn is_locked(&self, instance_guid: &Guid) -> bool {
        self.locks
            .get(instance_guid)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }
}
