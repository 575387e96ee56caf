//! Route mapping removal.
//!
//! Deletes the primary mapping, the legacy mirror for the app's process of
//! the mapped type and writes `audit.app.unmap-route`, all in one
//! transaction.

use cc_core::{App, RouteMapping};
use cc_store::{Store, StoreError};

use crate::access::RequestContext;
use crate::audit::EventRecorder;

pub struct RouteMappingDelete<'a> {
    store: &'a dyn Store,
    events: &'a dyn EventRecorder,
    context: &'a RequestContext,
}

impl<'a> RouteMappingDelete<'a> {
    pub fn new(
        store: &'a dyn Store,
        events: &'a dyn EventRecorder,
        context: &'a RequestContext,
    ) -> Self {
        Self {
            store,
            events,
            context,
        }
    }

    /// Remove `mapping`, which belongs to `app`.
    pub async fn delete(&self, app: &App, mapping: &RouteMapping) -> Result<(), StoreError> {
        let route = self
            .store
            .find_route(&mapping.route_guid)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                resource: "route",
                guid: mapping.route_guid.clone(),
            })?;
        let process = self
            .store
            .find_process(&app.guid, &mapping.process_type)
            .await?;

        let mut tx = self.store.begin().await?;
        tx.delete_route_mapping(&mapping.guid).await?;
        if let Some(process) = &process {
            let removed = tx
                .delete_process_route_mappings(&process.guid, &route.guid)
                .await?;
            tracing::debug!(process = %process.guid, route = %route.guid, removed, "legacy mappings removed");
        }
        self.events
            .record_unmap_route(tx.as_mut(), app, &route, &self.context.actor, mapping)
            .await?;
        tx.commit().await?;

        tracing::info!(route_mapping = %mapping.guid, app = %app.guid, "route unmapped");
        Ok(())
    }
}
