//! # cc-store: Persistence and Transactions
//!
//! A [`Store`] exposes committed reads and opens [`StoreTransaction`]s for
//! writes. Two backends implement it:
//!
//! - [`MemoryStore`]: tables behind a `parking_lot::Mutex`, used for
//!   development (no `DATABASE_URL`) and tests. Supports fixture seeding and
//!   fault injection.
//! - [`PgStore`]: Postgres via SQLx, schema in `migrations/`.
//!
//! ## Transactions
//!
//! `Store::begin()` returns a boxed transaction handle. Writes are staged on
//! the handle and become visible only on [`StoreTransaction::commit`].
//! Dropping the handle without committing discards every staged write.
//!
//! ## Uniqueness
//!
//! Uniqueness is checked when a write is staged *and* again at commit, so
//! two transactions racing on the same key produce exactly one commit. Both
//! checks report the same [`cc_core::ValidationErrors`] field set
//! ([`ROUTE_MAPPING_KEY`], [`SERVICE_BINDING_KEY`]).

pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use cc_core::{
    App, AuditEvent, Guid, Process, ProcessRouteMapping, Route, RouteMapping, ServiceBinding,
    ServiceInstance, Space, SpaceRole,
};
use serde::{Deserialize, Serialize};

pub use error::StoreError;
pub use memory::{Fixtures, MemoryStore, WriteTarget};
pub use postgres::{init_pool, PgStore};

/// Field set reported for a duplicate route mapping.
pub const ROUTE_MAPPING_KEY: [&str; 3] = ["app_guid", "route_guid", "process_type"];

/// Field set reported for a duplicate service binding.
pub const SERVICE_BINDING_KEY: [&str; 2] = ["app_guid", "service_instance_guid"];

/// Field set reported for a duplicate legacy process mapping.
pub const PROCESS_ROUTE_MAPPING_KEY: [&str; 2] = ["process_guid", "route_guid"];

pub const DEFAULT_PER_PAGE: u32 = 50;
pub const MAX_PER_PAGE: u32 = 5000;

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// A page of results plus the unpaginated total.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub total_results: u64,
    pub resources: Vec<T>,
}

impl<T> Page<T> {
    pub fn total_pages(&self, per_page: u32) -> u64 {
        if per_page == 0 {
            return 0;
        }
        self.total_results.div_ceil(u64::from(per_page))
    }
}

/// Route-mapping listing filter. `space_guids: None` means unrestricted.
#[derive(Debug, Clone, Default)]
pub struct RouteMappingFilter {
    pub app_guid: Option<Guid>,
    pub space_guids: Option<Vec<Guid>>,
}

/// Service-binding listing filter. Spaces are those of the bound app.
#[derive(Debug, Clone, Default)]
pub struct ServiceBindingFilter {
    pub app_guid: Option<Guid>,
    pub service_instance_guid: Option<Guid>,
    pub space_guids: Option<Vec<Guid>>,
}

/// Row counts used for gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub route_mappings: u64,
    pub service_bindings: u64,
}

/// Committed reads and transaction factory.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Open a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_space(&self, guid: &Guid) -> Result<Option<Space>, StoreError>;
    async fn find_app(&self, guid: &Guid) -> Result<Option<App>, StoreError>;
    async fn find_route(&self, guid: &Guid) -> Result<Option<Route>, StoreError>;

    /// The app's process of the given type, if one exists.
    async fn find_process(
        &self,
        app_guid: &Guid,
        process_type: &str,
    ) -> Result<Option<Process>, StoreError>;

    async fn find_service_instance(
        &self,
        guid: &Guid,
    ) -> Result<Option<ServiceInstance>, StoreError>;

    async fn space_roles_for(&self, user_guid: &Guid) -> Result<Vec<SpaceRole>, StoreError>;

    async fn find_route_mapping(&self, guid: &Guid) -> Result<Option<RouteMapping>, StoreError>;

    async fn list_route_mappings(
        &self,
        filter: &RouteMappingFilter,
        pagination: Pagination,
    ) -> Result<Page<RouteMapping>, StoreError>;

    async fn find_service_binding(
        &self,
        guid: &Guid,
    ) -> Result<Option<ServiceBinding>, StoreError>;

    async fn list_service_bindings(
        &self,
        filter: &ServiceBindingFilter,
        pagination: Pagination,
    ) -> Result<Page<ServiceBinding>, StoreError>;

    /// Number of association rows that block deleting the binding.
    async fn count_binding_associations(&self, binding_guid: &Guid) -> Result<u64, StoreError>;

    /// Run the model rules plus reference, same-space and uniqueness checks
    /// against committed state without writing anything.
    async fn validate_service_binding(&self, binding: &ServiceBinding) -> Result<(), StoreError>;

    async fn resource_counts(&self) -> Result<ResourceCounts, StoreError>;
}

/// Staged writes against a [`Store`].
#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert_route_mapping(&mut self, mapping: &RouteMapping) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] if the mapping does not exist.
    async fn delete_route_mapping(&mut self, guid: &Guid) -> Result<(), StoreError>;

    async fn insert_process_route_mapping(
        &mut self,
        mapping: &ProcessRouteMapping,
    ) -> Result<(), StoreError>;

    /// Remove legacy rows for the pair, returning how many were removed.
    async fn delete_process_route_mappings(
        &mut self,
        process_guid: &Guid,
        route_guid: &Guid,
    ) -> Result<u64, StoreError>;

    async fn insert_service_binding(&mut self, binding: &ServiceBinding)
        -> Result<(), StoreError>;

    /// Fails with [`StoreError::HasDependents`] while associations remain.
    async fn delete_service_binding(&mut self, guid: &Guid) -> Result<(), StoreError>;

    async fn delete_binding_associations(&mut self, binding_guid: &Guid)
        -> Result<u64, StoreError>;

    async fn insert_audit_event(&mut self, event: &AuditEvent) -> Result<(), StoreError>;

    /// Publish every staged write atomically.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_offset_is_one_based() {
        assert_eq!(Pagination::new(1, 50).offset(), 0);
        assert_eq!(Pagination::new(3, 10).offset(), 20);
        assert_eq!(Pagination::new(0, 10).offset(), 0);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<()> = Page {
            total_results: 101,
            resources: vec![],
        };
        assert_eq!(page.total_pages(50), 3);
        assert_eq!(page.total_pages(0), 0);
    }
}
