//! # Workflows
//!
//! Each workflow performs one mutation end to end: validation, broker calls
//! where needed, the storage transaction and its audit event. Workflows take
//! their collaborators by reference and the [`RequestContext`] explicitly;
//! handlers only translate HTTP in and out.
//!
//! - `route_mapping_create`: map an app's process type to a route.
//! - `route_mapping_delete`: remove a mapping and its legacy mirror.
//! - `service_binding_create`: broker bind plus persistence, with orphan
//!   mitigation when the second half fails.
//! - `service_binding_delete`: unbind and delete, inline or queued.
//!
//! [`RequestContext`]: crate::access::RequestContext

pub mod route_mapping_create;
pub mod route_mapping_delete;
pub mod service_binding_create;
pub mod service_binding_delete;

pub use route_mapping_create::{
    InvalidRouteMapping, RouteMappingCreate, RouteMappingCreateError, RouteMappingMessage,
};
pub use route_mapping_delete::RouteMappingDelete;
pub use service_binding_create::{
    BindPhase, ServiceBindingCreate, ServiceBindingCreateError, ServiceBindingRequest,
};
pub use service_binding_delete::{
    DeleteOptions, DeleteOutcome, ServiceBindingDelete, ServiceBindingDeleteError,
};
