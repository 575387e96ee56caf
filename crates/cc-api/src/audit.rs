//! # Audit Events
//!
//! Every mutation records an [`AuditEvent`] through the workflow's open
//! transaction, so the event commits or rolls back with the change it
//! describes. A recorder failure aborts the workflow.

use std::sync::Arc;

use async_trait::async_trait;
use cc_core::{App, AuditEvent, Guid, Route, RouteMapping, ServiceBinding};
use cc_store::{Store, StoreError, StoreTransaction};
use chrono::Utc;
use serde_json::json;

use crate::auth::Actor;

pub const MAP_ROUTE_EVENT: &str = "audit.app.map-route";
pub const UNMAP_ROUTE_EVENT: &str = "audit.app.unmap-route";
pub const SERVICE_BINDING_CREATE_EVENT: &str = "audit.service_binding.create";
pub const SERVICE_BINDING_DELETE_EVENT: &str = "audit.service_binding.delete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingEventKind {
    Create,
    Delete,
}

impl BindingEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Create => SERVICE_BINDING_CREATE_EVENT,
            Self::Delete => SERVICE_BINDING_DELETE_EVENT,
        }
    }
}

/// Records audit events inside a caller-owned transaction.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record_map_route(
        &self,
        tx: &mut dyn StoreTransaction,
        app: &App,
        route: &Route,
        actor: &Actor,
        mapping: &RouteMapping,
    ) -> Result<AuditEvent, StoreError>;

    async fn record_unmap_route(
        &self,
        tx: &mut dyn StoreTransaction,
        app: &App,
        route: &Route,
        actor: &Actor,
        mapping: &RouteMapping,
    ) -> Result<AuditEvent, StoreError>;

    async fn record_service_binding_event(
        &self,
        tx: &mut dyn StoreTransaction,
        kind: BindingEventKind,
        binding: &ServiceBinding,
        actor: &Actor,
    ) -> Result<AuditEvent, StoreError>;
}

/// Default recorder: resolves the owning organization and writes the event
/// row through the transaction.
pub struct AuditEventRepository {
    store: Arc<dyn Store>,
}

impl AuditEventRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn organization_of(&self, space_guid: &Guid) -> Result<Guid, StoreError> {
        match self.store.find_space(space_guid).await? {
            Some(space) => Ok(space.organization_guid),
            None => {
                tracing::warn!(space = %space_guid, "audit event for unknown space");
                Err(StoreError::NotFound {
                    resource: "space",
                    guid: space_guid.clone(),
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write(
        &self,
        tx: &mut dyn StoreTransaction,
        event_type: &str,
        actor: &Actor,
        actee: Guid,
        actee_type: &str,
        actee_name: String,
        space_guid: Guid,
        metadata: serde_json::Value,
    ) -> Result<AuditEvent, StoreError> {
        let event = AuditEvent {
            guid: Guid::generate(),
            event_type: event_type.to_string(),
            actor: actor.guid.to_string(),
            actor_type: "user".to_string(),
            actor_name: actor.email.clone(),
            actee,
            actee_type: actee_type.to_string(),
            actee_name,
            organization_guid: self.organization_of(&space_guid).await?,
            space_guid,
            metadata,
            timestamp: Utc::now(),
        };
        tx.insert_audit_event(&event).await?;
        tracing::debug!(
            event_type = %event.event_type,
            actee = %event.actee,
            actor = %event.actor,
            "audit event recorded"
        );
        Ok(event)
    }
}

fn route_metadata(route: &Route, mapping: &RouteMapping) -> serde_json::Value {
    json!({
        "route_guid": route.guid,
        "route_mapping_guid": mapping.guid,
        "process_type": mapping.process_type,
        "app_port": mapping.app_port,
    })
}

#[async_trait]
impl EventRecorder for AuditEventRepository {
    async fn record_map_route(
        &self,
        tx: &mut dyn StoreTransaction,
        app: &App,
        route: &Route,
        actor: &Actor,
        mapping: &RouteMapping,
    ) -> Result<AuditEvent, StoreError> {
        self.write(
            tx,
            MAP_ROUTE_EVENT,
            actor,
            app.guid.clone(),
            "app",
            app.name.clone(),
            app.space_guid.clone(),
            route_metadata(route, mapping),
        )
        .await
    }

    async fn record_unmap_route(
        &self,
        tx: &mut dyn StoreTransaction,
        app: &App,
        route: &Route,
        actor: &Actor,
        mapping: &RouteMapping,
    ) -> Result<AuditEvent, StoreError> {
        self.write(
            tx,
            UNMAP_ROUTE_EVENT,
            actor,
            app.guid.clone(),
            "app",
            app.name.clone(),
            app.space_guid.clone(),
            route_metadata(route, mapping),
        )
        .await
    }

    async fn record_service_binding_event(
        &self,
        tx: &mut dyn StoreTransaction,
        kind: BindingEventKind,
        binding: &ServiceBinding,
        actor: &Actor,
    ) -> Result<AuditEvent, StoreError> {
        let space_guid = self
            .store
            .find_app(&binding.app_guid)
            .await?
            .map(|app| app.space_guid)
            .unwrap_or_else(|| Guid::from(""));
        let metadata = match kind {
            BindingEventKind::Create => json!({
                "request": {
                    "app_guid": binding.app_guid,
                    "service_instance_guid": binding.service_instance_guid,
                }
            }),
            BindingEventKind::Delete => json!({ "request": {} }),
        };
        self.write(
            tx,
            kind.event_type(),
            actor,
            binding.guid.clone(),
            "service_binding",
            String::new(),
            space_guid,
            metadata,
        )
        .await
    }
}
