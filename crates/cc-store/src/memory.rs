//! In-memory [`Store`] backend.
//!
//! Committed tables live behind one `parking_lot::Mutex`. A transaction works
//! on a snapshot taken at `begin()` and records each staged write; `commit()`
//! replays the writes against the current committed tables, re-running every
//! check, and swaps the result in only if all of them pass.
//!
//! Test helpers: `put_*` fixture seeding, read-back accessors for staged
//! state, a `begin` counter, and one-shot fault injection per write target.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cc_core::{
    App, AuditEvent, Guid, Organization, Process, ProcessRouteMapping, Route, RouteMapping,
    ServiceBinding, ServiceBindingAssociation, ServiceInstance, Space, SpaceRole,
    ValidationErrors, ValidationKind,
};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::{
    Page, Pagination, ResourceCounts, RouteMappingFilter, ServiceBindingFilter, Store,
    StoreError, StoreTransaction, PROCESS_ROUTE_MAPPING_KEY, ROUTE_MAPPING_KEY,
    SERVICE_BINDING_KEY,
};

/// Write kinds that can be made to fail with [`MemoryStore::fail_next_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteTarget {
    RouteMapping,
    ProcessRouteMapping,
    ServiceBinding,
    AuditEvent,
    Commit,
}

/// Read-only fixture records, loadable from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub organizations: Vec<Organization>,
    pub spaces: Vec<Space>,
    pub apps: Vec<App>,
    pub processes: Vec<Process>,
    pub routes: Vec<Route>,
    pub service_instances: Vec<ServiceInstance>,
    pub space_roles: Vec<SpaceRole>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    organizations: HashMap<Guid, Organization>,
    spaces: HashMap<Guid, Space>,
    apps: HashMap<Guid, App>,
    processes: HashMap<Guid, Process>,
    routes: HashMap<Guid, Route>,
    service_instances: HashMap<Guid, ServiceInstance>,
    space_roles: Vec<SpaceRole>,
    route_mappings: HashMap<Guid, RouteMapping>,
    process_route_mappings: Vec<ProcessRouteMapping>,
    service_bindings: HashMap<Guid, ServiceBinding>,
    associations: HashMap<Guid, ServiceBindingAssociation>,
    audit_events: Vec<AuditEvent>,
}

#[derive(Debug, Clone)]
enum Write {
    InsertRouteMapping(RouteMapping),
    DeleteRouteMapping(Guid),
    InsertProcessRouteMapping(ProcessRouteMapping),
    DeleteProcessRouteMappings { process_guid: Guid, route_guid: Guid },
    InsertServiceBinding(ServiceBinding),
    DeleteServiceBinding(Guid),
    DeleteBindingAssociations(Guid),
    InsertAuditEvent(AuditEvent),
}

impl Tables {
    fn check_route_mapping(&self, mapping: &RouteMapping) -> Result<(), StoreError> {
        mapping.validate()?;
        let mut errors = ValidationErrors::new();
        if !self.apps.contains_key(&mapping.app_guid) {
            errors.add(&["app"], ValidationKind::Presence);
        }
        if !self.routes.contains_key(&mapping.route_guid) {
            errors.add(&["route"], ValidationKind::Presence);
        }
        let taken = self.route_mappings.values().any(|existing| {
            existing.app_guid == mapping.app_guid
                && existing.route_guid == mapping.route_guid
                && existing.process_type == mapping.process_type
        });
        if taken {
            errors.add(&ROUTE_MAPPING_KEY, ValidationKind::Unique);
        }
        errors.into_result().map_err(StoreError::from)
    }

    fn check_service_binding(&self, binding: &ServiceBinding) -> Result<(), StoreError> {
        binding.validate()?;
        let mut errors = ValidationErrors::new();
        let app = self.apps.get(&binding.app_guid);
        let instance = self.service_instances.get(&binding.service_instance_guid);
        if app.is_none() {
            errors.add(&["app"], ValidationKind::Presence);
        }
        if instance.is_none() {
            errors.add(&["service_instance"], ValidationKind::Presence);
        }
        if let (Some(app), Some(instance)) = (app, instance) {
            if app.space_guid != instance.space_guid {
                errors.add(&["service_instance"], ValidationKind::SpaceMismatch);
            }
        }
        let taken = self.service_bindings.values().any(|existing| {
            existing.app_guid == binding.app_guid
                && existing.service_instance_guid == binding.service_instance_guid
        });
        if taken {
            errors.add(&SERVICE_BINDING_KEY, ValidationKind::Unique);
        }
        errors.into_result().map_err(StoreError::from)
    }

    /// Apply one write, returning the number of affected rows.
    fn apply(&mut self, write: &Write) -> Result<u64, StoreError> {
        match write {
            Write::InsertRouteMapping(mapping) => {
                self.check_route_mapping(mapping)?;
                self.route_mappings
                    .insert(mapping.guid.clone(), mapping.clone());
                Ok(1)
            }
            Write::DeleteRouteMapping(guid) => match self.route_mappings.remove(guid) {
                Some(_) => Ok(1),
                None => Err(StoreError::NotFound {
                    resource: "route_mapping",
                    guid: guid.clone(),
                }),
            },
            Write::InsertProcessRouteMapping(mapping) => {
                let mut errors = ValidationErrors::new();
                if !self.processes.contains_key(&mapping.process_guid) {
                    errors.add(&["process"], ValidationKind::Presence);
                }
                if !self.routes.contains_key(&mapping.route_guid) {
                    errors.add(&["route"], ValidationKind::Presence);
                }
                let taken = self.process_route_mappings.iter().any(|existing| {
                    existing.process_guid == mapping.process_guid
                        && existing.route_guid == mapping.route_guid
                });
                if taken {
                    errors.add(&PROCESS_ROUTE_MAPPING_KEY, ValidationKind::Unique);
                }
                errors.into_result()?;
                self.process_route_mappings.push(mapping.clone());
                Ok(1)
            }
            Write::DeleteProcessRouteMappings {
                process_guid,
                route_guid,
            } => {
                let before = self.process_route_mappings.len();
                self.process_route_mappings.retain(|m| {
                    !(m.process_guid == *process_guid && m.route_guid == *route_guid)
                });
                Ok((before - self.process_route_mappings.len()) as u64)
            }
            Write::InsertServiceBinding(binding) => {
                self.check_service_binding(binding)?;
                self.service_bindings
                    .insert(binding.guid.clone(), binding.clone());
                Ok(1)
            }
            Write::DeleteServiceBinding(guid) => {
                if !self.service_bindings.contains_key(guid) {
                    return Err(StoreError::NotFound {
                        resource: "service_binding",
                        guid: guid.clone(),
                    });
                }
                if self
                    .associations
                    .values()
                    .any(|a| a.service_binding_guid == *guid)
                {
                    return Err(StoreError::HasDependents {
                        resource: "service_binding",
                        guid: guid.clone(),
                    });
                }
                self.service_bindings.remove(guid);
                Ok(1)
            }
            Write::DeleteBindingAssociations(binding_guid) => {
                let before = self.associations.len();
                self.associations
                    .retain(|_, a| a.service_binding_guid != *binding_guid);
                Ok((before - self.associations.len()) as u64)
            }
            Write::InsertAuditEvent(event) => {
                self.audit_events.push(event.clone());
                Ok(1)
            }
        }
    }

    fn space_of_app(&self, app_guid: &Guid) -> Option<&Guid> {
        self.apps.get(app_guid).map(|app| &app.space_guid)
    }
}

fn in_spaces(spaces: &Option<Vec<Guid>>, space: Option<&Guid>) -> bool {
    match spaces {
        None => true,
        Some(allowed) => space.is_some_and(|s| allowed.contains(s)),
    }
}

fn paginate<T: Clone>(mut rows: Vec<T>, pagination: Pagination) -> Page<T> {
    let total_results = rows.len() as u64;
    let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
    let resources = if offset >= rows.len() {
        Vec::new()
    } else {
        rows.drain(offset..)
            .take(pagination.per_page as usize)
            .collect()
    };
    Page {
        total_results,
        resources,
    }
}

struct Inner {
    tables: Mutex<Tables>,
    faults: Mutex<HashMap<WriteTarget, StoreError>>,
    begun: AtomicU64,
}

impl Inner {
    fn take_fault(&self, target: WriteTarget) -> Result<(), StoreError> {
        match self.faults.lock().remove(&target) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Shared in-memory store. Cloning yields another handle to the same tables.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.inner.tables.lock();
        f.debug_struct("MemoryStore")
            .field("route_mappings", &tables.route_mappings.len())
            .field("service_bindings", &tables.service_bindings.len())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                faults: Mutex::new(HashMap::new()),
                begun: AtomicU64::new(0),
            }),
        }
    }

    /// A store pre-populated with fixture records.
    pub fn with_fixtures(fixtures: Fixtures) -> Self {
        let store = Self::new();
        for org in fixtures.organizations {
            store.put_organization(org);
        }
        for space in fixtures.spaces {
            store.put_space(space);
        }
        for app in fixtures.apps {
            store.put_app(app);
        }
        for process in fixtures.processes {
            store.put_process(process);
        }
        for route in fixtures.routes {
            store.put_route(route);
        }
        for instance in fixtures.service_instances {
            store.put_service_instance(instance);
        }
        for role in fixtures.space_roles {
            store.put_space_role(role);
        }
        store
    }

    pub fn put_organization(&self, org: Organization) {
        self.inner
            .tables
            .lock()
            .organizations
            .insert(org.guid.clone(), org);
    }

    pub fn put_space(&self, space: Space) {
        self.inner
            .tables
            .lock()
            .spaces
            .insert(space.guid.clone(), space);
    }

    pub fn put_app(&self, app: App) {
        self.inner.tables.lock().apps.insert(app.guid.clone(), app);
    }

    pub fn put_process(&self, process: Process) {
        self.inner
            .tables
            .lock()
            .processes
            .insert(process.guid.clone(), process);
    }

    pub fn put_route(&self, route: Route) {
        self.inner
            .tables
            .lock()
            .routes
            .insert(route.guid.clone(), route);
    }

    pub fn put_service_instance(&self, instance: ServiceInstance) {
        self.inner
            .tables
            .lock()
            .service_instances
            .insert(instance.guid.clone(), instance);
    }

    pub fn put_space_role(&self, role: SpaceRole) {
        self.inner.tables.lock().space_roles.push(role);
    }

    /// Insert a committed route mapping, bypassing checks.
    pub fn put_route_mapping(&self, mapping: RouteMapping) {
        self.inner
            .tables
            .lock()
            .route_mappings
            .insert(mapping.guid.clone(), mapping);
    }

    pub fn put_process_route_mapping(&self, mapping: ProcessRouteMapping) {
        self.inner.tables.lock().process_route_mappings.push(mapping);
    }

    /// Insert a committed service binding, bypassing checks.
    pub fn put_service_binding(&self, binding: ServiceBinding) {
        self.inner
            .tables
            .lock()
            .service_bindings
            .insert(binding.guid.clone(), binding);
    }

    pub fn put_binding_association(&self, association: ServiceBindingAssociation) {
        self.inner
            .tables
            .lock()
            .associations
            .insert(association.guid.clone(), association);
    }

    /// Make the next write of `target` fail with `error`. One-shot.
    pub fn fail_next_write(&self, target: WriteTarget, error: StoreError) {
        self.inner.faults.lock().insert(target, error);
    }

    /// How many transactions have been opened.
    pub fn transactions_begun(&self) -> u64 {
        self.inner.begun.load(Ordering::SeqCst)
    }

    pub fn route_mappings(&self) -> Vec<RouteMapping> {
        self.inner
            .tables
            .lock()
            .route_mappings
            .values()
            .cloned()
            .collect()
    }

    pub fn process_route_mappings(&self) -> Vec<ProcessRouteMapping> {
        self.inner.tables.lock().process_route_mappings.clone()
    }

    pub fn service_bindings(&self) -> Vec<ServiceBinding> {
        self.inner
            .tables
            .lock()
            .service_bindings
            .values()
            .cloned()
            .collect()
    }

    pub fn binding_associations(&self) -> Vec<ServiceBindingAssociation> {
        self.inner
            .tables
            .lock()
            .associations
            .values()
            .cloned()
            .collect()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.inner.tables.lock().audit_events.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.inner.begun.fetch_add(1, Ordering::SeqCst);
        let view = self.inner.tables.lock().clone();
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            view,
            writes: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_space(&self, guid: &Guid) -> Result<Option<Space>, StoreError> {
        Ok(self.inner.tables.lock().spaces.get(guid).cloned())
    }

    async fn find_app(&self, guid: &Guid) -> Result<Option<App>, StoreError> {
        Ok(self.inner.tables.lock().apps.get(guid).cloned())
    }

    async fn find_route(&self, guid: &Guid) -> Result<Option<Route>, StoreError> {
        Ok(self.inner.tables.lock().routes.get(guid).cloned())
    }

    async fn find_process(
        &self,
        app_guid: &Guid,
        process_type: &str,
    ) -> Result<Option<Process>, StoreError> {
        Ok(self
            .inner
            .tables
            .lock()
            .processes
            .values()
            .find(|p| p.app_guid == *app_guid && p.process_type == process_type)
            .cloned())
    }

    async fn find_service_instance(
        &self,
        guid: &Guid,
    ) -> Result<Option<ServiceInstance>, StoreError> {
        Ok(self.inner.tables.lock().service_instances.get(guid).cloned())
    }

    async fn space_roles_for(&self, user_guid: &Guid) -> Result<Vec<SpaceRole>, StoreError> {
        Ok(self
            .inner
            .tables
            .lock()
            .space_roles
            .iter()
            .filter(|r| r.user_guid == *user_guid)
            .cloned()
            .collect())
    }

    async fn find_route_mapping(&self, guid: &Guid) -> Result<Option<RouteMapping>, StoreError> {
        Ok(self.inner.tables.lock().route_mappings.get(guid).cloned())
    }

    async fn list_route_mappings(
        &self,
        filter: &RouteMappingFilter,
        pagination: Pagination,
    ) -> Result<Page<RouteMapping>, StoreError> {
        let tables = self.inner.tables.lock();
        let mut rows: Vec<RouteMapping> = tables
            .route_mappings
            .values()
            .filter(|m| filter.app_guid.as_ref().map_or(true, |a| m.app_guid == *a))
            .filter(|m| in_spaces(&filter.space_guids, tables.space_of_app(&m.app_guid)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.created_at, &a.guid).cmp(&(b.created_at, &b.guid)));
        Ok(paginate(rows, pagination))
    }

    async fn find_service_binding(
        &self,
        guid: &Guid,
    ) -> Result<Option<ServiceBinding>, StoreError> {
        Ok(self.inner.tables.lock().service_bindings.get(guid).cloned())
    }

    async fn list_service_bindings(
        &self,
        filter: &ServiceBindingFilter,
        pagination: Pagination,
    ) -> Result<Page<ServiceBinding>, StoreError> {
        let tables = self.inner.tables.lock();
        let mut rows: Vec<ServiceBinding> = tables
            .service_bindings
            .values()
            .filter(|b| filter.app_guid.as_ref().map_or(true, |a| b.app_guid == *a))
            .filter(|b| {
                filter
                    .service_instance_guid
                    .as_ref()
                    .map_or(true, |i| b.service_instance_guid == *i)
            })
            .filter(|b| in_spaces(&filter.space_guids, tables.space_of_app(&b.app_guid)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.created_at, &a.guid).cmp(&(b.created_at, &b.guid)));
        Ok(paginate(rows, pagination))
    }

    async fn count_binding_associations(&self, binding_guid: &Guid) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .tables
            .lock()
            .associations
            .values()
            .filter(|a| a.service_binding_guid == *binding_guid)
            .count() as u64)
    }

    async fn validate_service_binding(&self, binding: &ServiceBinding) -> Result<(), StoreError> {
        self.inner.tables.lock().check_service_binding(binding)
    }

    async fn resource_counts(&self) -> Result<ResourceCounts, StoreError> {
        let tables = self.inner.tables.lock();
        Ok(ResourceCounts {
            route_mappings: tables.route_mappings.len() as u64,
            service_bindings: tables.service_bindings.len() as u64,
        })
    }
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    view: Tables,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    fn stage(&mut self, target: Option<WriteTarget>, write: Write) -> Result<u64, StoreError> {
        if let Some(target) = target {
            self.inner.take_fault(target)?;
        }
        let affected = self.view.apply(&write)?;
        self.writes.push(write);
        Ok(affected)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_route_mapping(&mut self, mapping: &RouteMapping) -> Result<(), StoreError> {
        self.stage(
            Some(WriteTarget::RouteMapping),
            Write::InsertRouteMapping(mapping.clone()),
        )
        .map(drop)
    }

    async fn delete_route_mapping(&mut self, guid: &Guid) -> Result<(), StoreError> {
        self.stage(
            Some(WriteTarget::RouteMapping),
            Write::DeleteRouteMapping(guid.clone()),
        )
        .map(drop)
    }

    async fn insert_process_route_mapping(
        &mut self,
        mapping: &ProcessRouteMapping,
    ) -> Result<(), StoreError> {
        self.stage(
            Some(WriteTarget::ProcessRouteMapping),
            Write::InsertProcessRouteMapping(mapping.clone()),
        )
        .map(drop)
    }

    async fn delete_process_route_mappings(
        &mut self,
        process_guid: &Guid,
        route_guid: &Guid,
    ) -> Result<u64, StoreError> {
        self.stage(
            Some(WriteTarget::ProcessRouteMapping),
            Write::DeleteProcessRouteMappings {
                process_guid: process_guid.clone(),
                route_guid: route_guid.clone(),
            },
        )
    }

    async fn insert_service_binding(
        &mut self,
        binding: &ServiceBinding,
    ) -> Result<(), StoreError> {
        self.stage(
            Some(WriteTarget::ServiceBinding),
            Write::InsertServiceBinding(binding.clone()),
        )
        .map(drop)
    }

    async fn delete_service_binding(&mut self, guid: &Guid) -> Result<(), StoreError> {
        self.stage(
            Some(WriteTarget::ServiceBinding),
            Write::DeleteServiceBinding(guid.clone()),
        )
        .map(drop)
    }

    async fn delete_binding_associations(
        &mut self,
        binding_guid: &Guid,
    ) -> Result<u64, StoreError> {
        self.stage(None, Write::DeleteBindingAssociations(binding_guid.clone()))
    }

    async fn insert_audit_event(&mut self, event: &AuditEvent) -> Result<(), StoreError> {
        self.stage(
            Some(WriteTarget::AuditEvent),
            Write::InsertAuditEvent(event.clone()),
        )
        .map(drop)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.take_fault(WriteTarget::Commit)?;
        let mut committed = self.inner.tables.lock();
        let mut next = committed.clone();
        for write in &self.writes {
            next.apply(write)?;
        }
        *committed = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_core::{SpaceRoleKind, ValidationKind};
    use serde_json::json;

    struct World {
        store: MemoryStore,
        app: App,
        route: Route,
        process: Process,
    }

    fn world() -> World {
        let store = MemoryStore::new();
        let space = Guid::from("space-1");
        let app = App {
            guid: Guid::from("app-1"),
            name: "app".into(),
            space_guid: space.clone(),
        };
        let route = Route {
            guid: Guid::from("route-1"),
            host: "www".into(),
            path: String::new(),
            space_guid: space,
        };
        let process = Process {
            guid: Guid::from("process-1"),
            app_guid: app.guid.clone(),
            process_type: "web".into(),
        };
        store.put_app(app.clone());
        store.put_route(route.clone());
        store.put_process(process.clone());
        World {
            store,
            app,
            route,
            process,
        }
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let w = world();
        let mapping = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "web", None);
        let mut tx = w.store.begin().await.unwrap();
        tx.insert_route_mapping(&mapping).await.unwrap();
        assert!(w.store.find_route_mapping(&mapping.guid).await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert!(w.store.find_route_mapping(&mapping.guid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropping_a_transaction_rolls_back() {
        let w = world();
        let mapping = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "web", None);
        {
            let mut tx = w.store.begin().await.unwrap();
            tx.insert_route_mapping(&mapping).await.unwrap();
            tx.insert_process_route_mapping(&ProcessRouteMapping {
                process_guid: w.process.guid.clone(),
                route_guid: w.route.guid.clone(),
                app_port: None,
            })
            .await
            .unwrap();
        }
        assert!(w.store.route_mappings().is_empty());
        assert!(w.store.process_route_mappings().is_empty());
    }

    #[tokio::test]
    async fn duplicate_key_rejected_at_insert() {
        let w = world();
        let first = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "web", None);
        let mut tx = w.store.begin().await.unwrap();
        tx.insert_route_mapping(&first).await.unwrap();
        tx.commit().await.unwrap();

        let dup = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "web", Some(9000));
        let mut tx = w.store.begin().await.unwrap();
        let err = tx.insert_route_mapping(&dup).await.unwrap_err();
        let errors = err.validation().expect("validation error");
        assert!(errors.has(&ROUTE_MAPPING_KEY, ValidationKind::Unique));
    }

    #[tokio::test]
    async fn racing_transactions_fail_at_commit_with_same_classification() {
        let w = world();
        let a = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "web", None);
        let b = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "web", None);

        let mut tx_a = w.store.begin().await.unwrap();
        let mut tx_b = w.store.begin().await.unwrap();
        tx_a.insert_route_mapping(&a).await.unwrap();
        tx_b.insert_route_mapping(&b).await.unwrap();
        tx_a.commit().await.unwrap();

        let err = tx_b.commit().await.unwrap_err();
        assert!(err
            .validation()
            .is_some_and(|e| e.has(&ROUTE_MAPPING_KEY, ValidationKind::Unique)));
        assert_eq!(w.store.route_mappings().len(), 1);
    }

    #[tokio::test]
    async fn different_process_types_do_not_collide() {
        let w = world();
        let web = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "web", None);
        let worker = RouteMapping::new(w.app.guid.clone(), w.route.guid.clone(), "worker", None);
        let mut tx = w.store.begin().await.unwrap();
        tx.insert_route_mapping(&web).await.unwrap();
        tx.insert_route_mapping(&worker).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(w.store.route_mappings().len(), 2);
    }

    #[tokio::test]
    async fn missing_references_are_presence_errors() {
        let w = world();
        let mapping = RouteMapping::new(Guid::from("ghost"), w.route.guid.clone(), "web", None);
        let mut tx = w.store.begin().await.unwrap();
        let err = tx.insert_route_mapping(&mapping).await.unwrap_err();
        assert!(err
            .validation()
            .is_some_and(|e| e.has(&["app"], ValidationKind::Presence)));
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let w = world();
        w.store.fail_next_write(
            WriteTarget::AuditEvent,
            StoreError::Database("disk full".into()),
        );
        let event = AuditEvent {
            guid: Guid::generate(),
            event_type: "audit.app.map-route".into(),
            actor: "user".into(),
            actor_type: "user".into(),
            actor_name: None,
            actee: w.app.guid.clone(),
            actee_type: "app".into(),
            actee_name: w.app.name.clone(),
            space_guid: w.app.space_guid.clone(),
            organization_guid: Guid::from(""),
            metadata: json!({}),
            timestamp: chrono::Utc::now(),
        };
        let mut tx = w.store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_audit_event(&event).await,
            Err(StoreError::Database(_))
        ));
        tx.insert_audit_event(&event).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(w.store.audit_events().len(), 1);
    }

    #[tokio::test]
    async fn binding_with_associations_cannot_be_deleted() {
        let w = world();
        let instance = ServiceInstance {
            guid: Guid::from("si-1"),
            name: "db".into(),
            space_guid: w.app.space_guid.clone(),
            bindable: true,
            kind: cc_core::ServiceInstanceKind::UserProvided {
                credentials: json!({}),
                syslog_drain_url: None,
            },
        };
        w.store.put_service_instance(instance.clone());
        let binding = ServiceBinding::new(w.app.guid.clone(), instance.guid.clone(), json!({}));
        w.store.put_service_binding(binding.clone());
        w.store.put_binding_association(ServiceBindingAssociation {
            guid: Guid::generate(),
            service_binding_guid: binding.guid.clone(),
            relation: "volume_mount".into(),
        });

        let mut tx = w.store.begin().await.unwrap();
        assert!(matches!(
            tx.delete_service_binding(&binding.guid).await,
            Err(StoreError::HasDependents { .. })
        ));

        let mut tx = w.store.begin().await.unwrap();
        assert_eq!(tx.delete_binding_associations(&binding.guid).await.unwrap(), 1);
        tx.delete_service_binding(&binding.guid).await.unwrap();
        tx.commit().await.unwrap();
        assert!(w.store.service_bindings().is_empty());
        assert!(w.store.binding_associations().is_empty());
    }

    #[tokio::test]
    async fn binding_validation_reports_space_mismatch_and_duplicates() {
        let w = world();
        let elsewhere = ServiceInstance {
            guid: Guid::from("si-other"),
            name: "cache".into(),
            space_guid: Guid::from("space-2"),
            bindable: true,
            kind: cc_core::ServiceInstanceKind::UserProvided {
                credentials: json!({}),
                syslog_drain_url: None,
            },
        };
        w.store.put_service_instance(elsewhere.clone());
        let binding = ServiceBinding::new(w.app.guid.clone(), elsewhere.guid.clone(), json!({}));
        let err = w.store.validate_service_binding(&binding).await.unwrap_err();
        assert!(err
            .validation()
            .is_some_and(|e| e.has(&["service_instance"], ValidationKind::SpaceMismatch)));

        let local = ServiceInstance {
            guid: Guid::from("si-local"),
            space_guid: w.app.space_guid.clone(),
            ..elsewhere
        };
        w.store.put_service_instance(local.clone());
        let existing = ServiceBinding::new(w.app.guid.clone(), local.guid.clone(), json!({}));
        w.store.put_service_binding(existing);
        let again = ServiceBinding::new(w.app.guid.clone(), local.guid.clone(), json!({}));
        let err = w.store.validate_service_binding(&again).await.unwrap_err();
        assert!(err
            .validation()
            .is_some_and(|e| e.has(&SERVICE_BINDING_KEY, ValidationKind::Unique)));
    }

    #[tokio::test]
    async fn listing_filters_by_space_and_paginates() {
        let w = world();
        let other_app = App {
            guid: Guid::from("app-2"),
            name: "other".into(),
            space_guid: Guid::from("space-2"),
        };
        w.store.put_app(other_app.clone());
        for i in 0..3 {
            w.store.put_route_mapping(RouteMapping::new(
                w.app.guid.clone(),
                w.route.guid.clone(),
                format!("type-{i}"),
                None,
            ));
        }
        w.store.put_route_mapping(RouteMapping::new(
            other_app.guid.clone(),
            w.route.guid.clone(),
            "web",
            None,
        ));

        let filter = RouteMappingFilter {
            app_guid: None,
            space_guids: Some(vec![w.app.space_guid.clone()]),
        };
        let page = w
            .store
            .list_route_mappings(&filter, Pagination::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total_results, 3);
        assert_eq!(page.resources.len(), 2);

        let page = w
            .store
            .list_route_mappings(&filter, Pagination::new(2, 2))
            .await
            .unwrap();
        assert_eq!(page.resources.len(), 1);

        let all = w
            .store
            .list_route_mappings(&RouteMappingFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(all.total_results, 4);
    }

    #[tokio::test]
    async fn space_roles_are_per_user() {
        let w = world();
        w.store.put_space_role(SpaceRole {
            user_guid: Guid::from("alice"),
            space_guid: w.app.space_guid.clone(),
            role: SpaceRoleKind::Developer,
        });
        assert_eq!(w.store.space_roles_for(&Guid::from("alice")).await.unwrap().len(), 1);
        assert!(w.store.space_roles_for(&Guid::from("bob")).await.unwrap().is_empty());
    }

    #[test]
    fn fixtures_load_from_json() {
        let fixtures: Fixtures = serde_json::from_value(json!({
            "apps": [{"guid": "a", "name": "app", "space_guid": "s"}],
            "routes": [{"guid": "r", "host": "h", "path": "", "space_guid": "s"}]
        }))
        .unwrap();
        let store = MemoryStore::with_fixtures(fixtures);
        let tables = store.inner.tables.lock();
        assert!(tables.apps.contains_key(&Guid::from("a")));
        assert!(tables.routes.contains_key(&Guid::from("r")));
    }
}
