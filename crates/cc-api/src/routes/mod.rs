//! # API Route Modules
//!
//! - `route_mappings`: v3 route mappings, top-level and nested under apps.
//! - `service_bindings`: v2 service bindings, including async and
//!   recursive deletion.

pub mod route_mappings;
pub mod service_bindings;
