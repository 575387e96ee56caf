//! # Route Mapping Create
//!
//! Maps one process type of an app to a route. The primary mapping, its
//! legacy per-process mirror (only when the app already has a process of
//! that type) and the `audit.app.map-route` event are written in a single
//! transaction.
//!
//! Failure classification:
//!
//! | Cause | Result |
//! |---|---|
//! | app and route in different spaces | `InvalidRouteMapping`, no transaction opened |
//! | `(app, route, process_type)` already mapped | `InvalidRouteMapping` (duplicate) |
//! | any other validation failure | `InvalidRouteMapping` carrying its messages |
//! | storage or audit failure | `RouteMappingCreateError::Store`, nothing persisted |
//!
//! Duplicates are detected when the mapping is staged and again at commit,
//! so of two concurrent identical requests exactly one succeeds.

use cc_core::validation::same_space;
use cc_core::{
    App, Process, ProcessRouteMapping, Route, RouteMapping, ValidationKind, DEFAULT_PROCESS_TYPE,
};
use cc_store::{Store, StoreError, ROUTE_MAPPING_KEY};
use thiserror::Error;

use crate::access::RequestContext;
use crate::audit::EventRecorder;

pub const DUPLICATE_ROUTE_MAPPING: &str = "a duplicate route mapping already exists";
pub const ROUTE_SPACE_MISMATCH: &str = "the app and route must belong to the same space";

/// A mapping the caller can fix by changing the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidRouteMapping(pub String);

#[derive(Error, Debug)]
pub enum RouteMappingCreateError {
    #[error(transparent)]
    Invalid(#[from] InvalidRouteMapping),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RouteMappingCreateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(errors) if errors.has(&ROUTE_MAPPING_KEY, ValidationKind::Unique) => {
                Self::Invalid(InvalidRouteMapping(DUPLICATE_ROUTE_MAPPING.into()))
            }
            StoreError::Validation(errors) => Self::Invalid(InvalidRouteMapping(errors.to_string())),
            other => Self::Store(other),
        }
    }
}

/// Requested process type and port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMappingMessage {
    pub process_type: Option<String>,
    pub app_port: Option<i32>,
}

impl RouteMappingMessage {
    /// The requested type, `"web"` when absent.
    pub fn process_type(&self) -> &str {
        self.process_type.as_deref().unwrap_or(DEFAULT_PROCESS_TYPE)
    }
}

pub struct RouteMappingCreate<'a> {
    store: &'a dyn Store,
    events: &'a dyn EventRecorder,
    context: &'a RequestContext,
}

impl<'a> RouteMappingCreate<'a> {
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

    /// Create the mapping. `process` is the app's process of the requested
    /// type, if it exists yet.
    pub async fn add(
        &self,
        app: &App,
        route: &Route,
        process: Option<&Process>,
        message: &RouteMappingMessage,
    ) -> Result<RouteMapping, RouteMappingCreateError> {
        if !same_space(app, route) {
            return Err(InvalidRouteMapping(ROUTE_SPACE_MISMATCH.into()).into());
        }

        let mapping = RouteMapping::new(
            app.guid.clone(),
            route.guid.clone(),
            message.process_type(),
            message.app_port,
        );
        self.persist(app, route, process, &mapping).await?;

        tracing::info!(
            route_mapping = %mapping.guid,
            app = %app.guid,
            route = %route.guid,
            process_type = %mapping.process_type,
            "route mapped"
        );
        Ok(mapping)
    }

    async fn persist(
        &self,
        app: &App,
        route: &Route,
        process: Option<&Process>,
        mapping: &RouteMapping,
    ) -> Result<(), StoreError> {
        let mut tx = self.store.begin().await?;
        tx.insert_route_mapping(mapping).await?;
        if let Some(process) = process {
            tx.insert_process_route_mapping(&ProcessRouteMapping {
                process_guid: process.guid.clone(),
                route_guid: route.guid.clone(),
                app_port: mapping.app_port,
            })
            .await?;
        }
        self.events
            .record_map_route(tx.as_mut(), app, route, &self.context.actor, mapping)
            .await?;
        tx.commit().await
    }
}
