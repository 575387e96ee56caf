//! # Data Model
//!
//! Persisted records for route mappings and service bindings, plus the
//! fixture aggregates they reference (organizations, spaces, apps,
//! processes, routes, service instances, space roles).
//!
//! ## Relationships
//!
//! ```text
//! Organization ──< Space ──< App ──< Process
//!                    │        │
//!                    │        ├──< RouteMapping >── Route
//!                    │        │        └── mirrors ──▶ ProcessRouteMapping (legacy)
//!                    │        │
//!                    │        └──< ServiceBinding >── ServiceInstance
//!                    │                   └──< ServiceBindingAssociation
//!                    └──< SpaceRole
//! ```
//!
//! Route mappings and service bindings are never updated in place; a
//! change is a delete followed by a create.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::Guid;
use crate::validation::{validate_max_length, validate_presence, ValidationErrors, ValidationKind};

/// Process type used when a caller does not name one.
pub const DEFAULT_PROCESS_TYPE: &str = "web";

const MAX_PROCESS_TYPE_LENGTH: usize = 255;
const MAX_GATEWAY_NAME_LENGTH: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub guid: Guid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub guid: Guid,
    pub name: String,
    pub organization_guid: Guid,
}

/// Application aggregate (the v3 app).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub guid: Guid,
    pub name: String,
    pub space_guid: Guid,
}

/// A concrete process of an app. At most one per (app, process type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub guid: Guid,
    pub app_guid: Guid,
    pub process_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub guid: Guid,
    pub host: String,
    pub path: String,
    pub space_guid: Guid,
}

/// Association of an app to a route for one process type.
///
/// Unique on `(app_guid, route_guid, process_type)`; `app_port` is not part
/// of the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMapping {
    pub guid: Guid,
    pub app_guid: Guid,
    pub route_guid: Guid,
    pub process_type: String,
    pub app_port: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl RouteMapping {
    /// Build an unsaved mapping with a fresh guid.
    pub fn new(
        app_guid: Guid,
        route_guid: Guid,
        process_type: impl Into<String>,
        app_port: Option<i32>,
    ) -> Self {
        Self {
            guid: Guid::generate(),
            app_guid,
            route_guid,
            process_type: process_type.into(),
            app_port,
            created_at: Utc::now(),
        }
    }

    /// Model-level validation. Reference existence and uniqueness are the
    /// storage layer's job.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.app_guid.is_blank() {
            errors.add(&["app"], ValidationKind::Presence);
        }
        if self.route_guid.is_blank() {
            errors.add(&["route"], ValidationKind::Presence);
        }
        validate_presence(&mut errors, "process_type", &self.process_type);
        validate_max_length(
            &mut errors,
            "process_type",
            &self.process_type,
            MAX_PROCESS_TYPE_LENGTH,
        );
        if let Some(port) = self.app_port {
            if !(1..=65535).contains(&port) {
                errors.add(&["app_port"], ValidationKind::Range);
            }
        }
        errors.into_result()
    }
}

/// Legacy per-process mirror of a [`RouteMapping`].
///
/// Has no identity of its own: it exists only alongside a primary mapping
/// and is created and removed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRouteMapping {
    pub process_guid: Guid,
    pub route_guid: Guid,
    pub app_port: Option<i32>,
}

/// Where a managed instance's broker lives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerEndpoint")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Managed instances have a broker-backed lifecycle; user-provided ones
/// are static credential bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceInstanceKind {
    Managed {
        broker: BrokerEndpoint,
        service_id: String,
        plan_id: String,
    },
    UserProvided {
        credentials: Value,
        syslog_drain_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub guid: Guid,
    pub name: String,
    pub space_guid: Guid,
    pub bindable: bool,
    pub kind: ServiceInstanceKind,
}

impl ServiceInstance {
    /// Whether bind/unbind calls for this instance reach a broker.
    pub fn is_managed(&self) -> bool {
        matches!(self.kind, ServiceInstanceKind::Managed { .. })
    }
}

/// Attributes a broker (or a user-provided instance) returns from a bind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingAttributes {
    #[serde(default)]
    pub credentials: Value,
    #[serde(default)]
    pub syslog_drain_url: Option<String>,
    #[serde(default)]
    pub gateway_data: Option<Value>,
}

/// Live association between an app and a service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub guid: Guid,
    pub app_guid: Guid,
    pub service_instance_guid: Guid,
    pub binding_options: Value,
    pub credentials: Value,
    pub syslog_drain_url: Option<String>,
    pub gateway_name: String,
    pub gateway_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ServiceBinding {
    /// Build a candidate binding with no broker attributes yet.
    pub fn new(app_guid: Guid, service_instance_guid: Guid, binding_options: Value) -> Self {
        Self {
            guid: Guid::generate(),
            app_guid,
            service_instance_guid,
            binding_options,
            credentials: Value::Object(Default::default()),
            syslog_drain_url: None,
            gateway_name: String::new(),
            gateway_data: None,
            created_at: Utc::now(),
        }
    }

    /// Merge broker-returned attributes into the binding.
    pub fn apply(&mut self, attributes: BindingAttributes) {
        if !attributes.credentials.is_null() {
            self.credentials = attributes.credentials;
        }
        self.syslog_drain_url = attributes.syslog_drain_url;
        self.gateway_data = attributes.gateway_data;
    }

    /// Model-level validation. Reference existence, same-space and
    /// uniqueness are checked by the storage layer.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.app_guid.is_blank() {
            errors.add(&["app"], ValidationKind::Presence);
        }
        if self.service_instance_guid.is_blank() {
            errors.add(&["service_instance"], ValidationKind::Presence);
        }
        if !self.binding_options.is_object() {
            errors.add(&["binding_options"], ValidationKind::Format);
        }
        validate_max_length(
            &mut errors,
            "gateway_name",
            &self.gateway_name,
            MAX_GATEWAY_NAME_LENGTH,
        );
        errors.into_result()
    }
}

/// A record that depends on a service binding and blocks its
/// non-recursive deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBindingAssociation {
    pub guid: Guid,
    pub service_binding_guid: Guid,
    pub relation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceRoleKind {
    Developer,
    Manager,
    Auditor,
}

impl SpaceRoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Manager => "manager",
            Self::Auditor => "auditor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "developer" => Some(Self::Developer),
            "manager" => Some(Self::Manager),
            "auditor" => Some(Self::Auditor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRole {
    pub user_guid: Guid,
    pub space_guid: Guid,
    pub role: SpaceRoleKind,
}

/// Immutable record of who performed which mutation on which entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub guid: Guid,
    pub event_type: String,
    pub actor: String,
    pub actor_type: String,
    pub actor_name: Option<String>,
    pub actee: Guid,
    pub actee_type: String,
    pub actee_name: String,
    pub space_guid: Guid,
    pub organization_guid: Guid,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}
