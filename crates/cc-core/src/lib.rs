//! # cc-core: Foundational Types for the Cloud Controller API
//!
//! Defines the identifiers, persisted records, and pure validation rules
//! shared by the storage layer (`cc-store`), the broker client
//! (`cc-broker-client`), and the HTTP layer (`cc-api`).
//!
//! ## Key Design Principles
//!
//! 1. **`Guid` newtype for every identifier.** Guids are opaque strings on
//!    the wire; the newtype keeps them from mixing with names and hosts.
//!
//! 2. **Model validation is pure.** `RouteMapping::validate()` and
//!    `ServiceBinding::validate()` report field-level failures as
//!    [`ValidationErrors`], the same shape the storage layer uses for
//!    uniqueness and reference violations. Callers classify failures by
//!    field set, never by message text.
//!
//! 3. **Explicit optionality.** A route mapping's process is an
//!    `Option<&Process>`; a service instance is either
//!    [`ServiceInstanceKind::Managed`] or [`ServiceInstanceKind::UserProvided`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `cc-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod identity;
pub mod model;
pub mod validation;

pub use identity::Guid;
pub use model::{
    App, AuditEvent, BindingAttributes, BrokerEndpoint, Organization, Process,
    ProcessRouteMapping, Route, RouteMapping, ServiceBinding, ServiceBindingAssociation,
    ServiceInstance, ServiceInstanceKind, Space, SpaceRole, SpaceRoleKind, DEFAULT_PROCESS_TYPE,
};
pub use validation::{ValidationErrors, ValidationKind};
