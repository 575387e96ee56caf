//! # v3 Route Mapping Routes
//!
//! - `POST   /v3/route_mappings`                        : map an app process to a route
//! - `GET    /v3/route_mappings`                        : list visible mappings
//! - `GET    /v3/route_mappings/{guid}`                 : show a mapping
//! - `DELETE /v3/route_mappings/{guid}`                 : unmap
//! - `GET    /v3/apps/{app_guid}/route_mappings`        : list an app's mappings
//! - `GET    /v3/apps/{app_guid}/route_mappings/{guid}` : show one of an app's mappings
//! - `DELETE /v3/apps/{app_guid}/route_mappings/{guid}` : unmap one of an app's mappings

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cc_core::{App, Guid, RouteMapping};
use cc_store::{RouteMappingFilter, StoreError};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::access::{Operation, RequestContext};
use crate::actions::{RouteMappingCreate, RouteMappingDelete, RouteMappingMessage};
use crate::error::ApiError;
use crate::extractors::{extract_query, extract_validated_json, PageQuery, Validate};
use crate::fetchers::{fetch_app, fetch_route_mapping, fetch_route_mapping_targets};
use crate::presenters::{route_mapping_path, RouteMappingList, RouteMappingResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v3/route_mappings",
            get(list_route_mappings).post(create_route_mapping),
        )
        .route(
            "/v3/route_mappings/{guid}",
            get(get_route_mapping).delete(delete_route_mapping),
        )
        .route("/v3/apps/{app_guid}/route_mappings", get(list_app_route_mappings))
        .route(
            "/v3/apps/{app_guid}/route_mappings/{guid}",
            get(get_app_route_mapping).delete(delete_app_route_mapping),
        )
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GuidRelationship {
    pub guid: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProcessRelationship {
    #[serde(rename = "type")]
    pub process_type: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RouteMappingRelationships {
    pub app: GuidRelationship,
    pub route: GuidRelationship,
    #[serde(default)]
    pub process: Option<ProcessRelationship>,
}

/// Body of `POST /v3/route_mappings`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateRouteMappingRequest {
    pub relationships: RouteMappingRelationships,
    /// Port the app listens on; platform default when absent.
    #[serde(default)]
    pub app_port: Option<i32>,
}

impl Validate for CreateRouteMappingRequest {
    fn validate(&self) -> Result<(), String> {
        if self.relationships.app.guid.trim().is_empty() {
            return Err("App guid must be present".into());
        }
        if self.relationships.route.guid.trim().is_empty() {
            return Err("Route guid must be present".into());
        }
        if let Some(process) = &self.relationships.process {
            if process.process_type.trim().is_empty() {
                return Err("Process type must be present".into());
            }
        }
        if let Some(port) = self.app_port {
            if !(1..=65535).contains(&port) {
                return Err("App port must be between 1 and 65535".into());
            }
        }
        Ok(())
    }
}

impl CreateRouteMappingRequest {
    fn message(&self) -> RouteMappingMessage {
        RouteMappingMessage {
            process_type: self
                .relationships
                .process
                .as_ref()
                .map(|p| p.process_type.clone()),
            app_port: self.app_port,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Map an app's process type to a route.
#[utoipa::path(
    post,
    path = "/v3/route_mappings",
    request_body = CreateRouteMappingRequest,
    responses(
        (status = 201, description = "Route mapping created", body = RouteMappingResponse),
        (status = 403, description = "Not authorized", body = crate::error::ErrorBody),
        (status = 404, description = "App or route not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid or duplicate mapping", body = crate::error::ErrorBody),
    ),
    tag = "route-mappings"
)]
async fn create_route_mapping(
    State(state): State<AppState>,
    context: RequestContext,
    body: Result<Json<CreateRouteMappingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    context.permissions.require_write_scope()?;
    let req = extract_validated_json(body)?;
    let message = req.message();

    let targets = fetch_route_mapping_targets(
        state.store.as_ref(),
        &context.permissions,
        &Guid::from(req.relationships.app.guid.as_str()),
        &Guid::from(req.relationships.route.guid.as_str()),
        message.process_type(),
    )
    .await?;
    context
        .permissions
        .validate_access(Operation::Create, &targets.app.space_guid)?;

    let mapping = RouteMappingCreate::new(state.store.as_ref(), state.events.as_ref(), &context)
        .add(&targets.app, &targets.route, targets.process.as_ref(), &message)
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, route_mapping_path(&mapping.guid))],
        Json(RouteMappingResponse::from(&mapping)),
    ))
}

/// List route mappings in spaces the actor can read.
#[utoipa::path(
    get,
    path = "/v3/route_mappings",
    params(PageQuery),
    responses(
        (status = 200, description = "Paginated route mappings", body = RouteMappingList),
        (status = 403, description = "Missing read scope", body = crate::error::ErrorBody),
    ),
    tag = "route-mappings"
)]
async fn list_route_mappings(
    State(state): State<AppState>,
    context: RequestContext,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<RouteMappingList>, ApiError> {
    context.permissions.require_read_scope()?;
    let pagination = extract_query(query)?.pagination()?;
    let filter = RouteMappingFilter {
        app_guid: None,
        space_guids: context.permissions.readable_spaces(),
    };
    let page = state.store.list_route_mappings(&filter, pagination).await?;
    Ok(Json(RouteMappingList::new("/v3/route_mappings", &page, pagination)))
}

/// List one app's route mappings.
#[utoipa::path(
    get,
    path = "/v3/apps/{app_guid}/route_mappings",
    params(
        ("app_guid" = String, Path, description = "App guid"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Paginated route mappings", body = RouteMappingList),
        (status = 404, description = "App not found", body = crate::error::ErrorBody),
    ),
    tag = "route-mappings"
)]
async fn list_app_route_mappings(
    State(state): State<AppState>,
    context: RequestContext,
    Path(app_guid): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<RouteMappingList>, ApiError> {
    let app = fetch_app(state.store.as_ref(), &context.permissions, &Guid::from(app_guid)).await?;
    let pagination = extract_query(query)?.pagination()?;
    let filter = RouteMappingFilter {
        app_guid: Some(app.guid.clone()),
        space_guids: None,
    };
    let page = state.store.list_route_mappings(&filter, pagination).await?;
    let base = format!("/v3/apps/{}/route_mappings", app.guid);
    Ok(Json(RouteMappingList::new(&base, &page, pagination)))
}

/// Show a route mapping.
#[utoipa::path(
    get,
    path = "/v3/route_mappings/{guid}",
    params(("guid" = String, Path, description = "Route mapping guid")),
    responses(
        (status = 200, description = "Route mapping", body = RouteMappingResponse),
        (status = 403, description = "Missing read scope", body = crate::error::ErrorBody),
        (status = 404, description = "Route mapping not found", body = crate::error::ErrorBody),
    ),
    tag = "route-mappings"
)]
async fn get_route_mapping(
    State(state): State<AppState>,
    context: RequestContext,
    Path(guid): Path<String>,
) -> Result<Json<RouteMappingResponse>, ApiError> {
    context.permissions.require_read_scope()?;
    let (mapping, _) =
        fetch_route_mapping(state.store.as_ref(), &context.permissions, &Guid::from(guid)).await?;
    Ok(Json(RouteMappingResponse::from(&mapping)))
}

/// Show one of an app's route mappings.
#[utoipa::path(
    get,
    path = "/v3/apps/{app_guid}/route_mappings/{guid}",
    params(
        ("app_guid" = String, Path, description = "App guid"),
        ("guid" = String, Path, description = "Route mapping guid")
    ),
    responses(
        (status = 200, description = "Route mapping", body = RouteMappingResponse),
        (status = 404, description = "App or route mapping not found", body = crate::error::ErrorBody),
    ),
    tag = "route-mappings"
)]
async fn get_app_route_mapping(
    State(state): State<AppState>,
    context: RequestContext,
    Path((app_guid, guid)): Path<(String, String)>,
) -> Result<Json<RouteMappingResponse>, ApiError> {
    let (mapping, _) = fetch_app_route_mapping(&state, &context, app_guid, guid).await?;
    Ok(Json(RouteMappingResponse::from(&mapping)))
}

/// Unmap a route.
#[utoipa::path(
    delete,
    path = "/v3/route_mappings/{guid}",
    params(("guid" = String, Path, description = "Route mapping guid")),
    responses(
        (status = 204, description = "Route mapping deleted"),
        (status = 403, description = "Not authorized", body = crate::error::ErrorBody),
        (status = 404, description = "Route mapping not found", body = crate::error::ErrorBody),
    ),
    tag = "route-mappings"
)]
async fn delete_route_mapping(
    State(state): State<AppState>,
    context: RequestContext,
    Path(guid): Path<String>,
) -> Result<StatusCode, ApiError> {
    context.permissions.require_write_scope()?;
    let (mapping, app) =
        fetch_route_mapping(state.store.as_ref(), &context.permissions, &Guid::from(guid)).await?;
    unmap(&state, &context, &app, &mapping).await
}

/// Unmap one of an app's routes.
#[utoipa::path(
    delete,
    path = "/v3/apps/{app_guid}/route_mappings/{guid}",
    params(
        ("app_guid" = String, Path, description = "App guid"),
        ("guid" = String, Path, description = "Route mapping guid")
    ),
    responses(
        (status = 204, description = "Route mapping deleted"),
        (status = 403, description = "Not authorized", body = crate::error::ErrorBody),
        (status = 404, description = "App or route mapping not found", body = crate::error::ErrorBody),
    ),
    tag = "route-mappings"
)]
async fn delete_app_route_mapping(
    State(state): State<AppState>,
    context: RequestContext,
    Path((app_guid, guid)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    context.permissions.require_write_scope()?;
    let (mapping, app) = fetch_app_route_mapping(&state, &context, app_guid, guid).await?;
    unmap(&state, &context, &app, &mapping).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// App first, then a mapping that must belong to it.
async fn fetch_app_route_mapping(
    state: &AppState,
    context: &RequestContext,
    app_guid: String,
    guid: String,
) -> Result<(RouteMapping, App), ApiError> {
    let app = fetch_app(state.store.as_ref(), &context.permissions, &Guid::from(app_guid)).await?;
    let (mapping, owner) =
        fetch_route_mapping(state.store.as_ref(), &context.permissions, &Guid::from(guid)).await?;
    if owner.guid != app.guid {
        return Err(ApiError::ResourceNotFound("Route mapping not found".into()));
    }
    Ok((mapping, app))
}

async fn unmap(
    state: &AppState,
    context: &RequestContext,
    app: &App,
    mapping: &RouteMapping,
) -> Result<StatusCode, ApiError> {
    context
        .permissions
        .validate_access(Operation::Delete, &app.space_guid)?;
    RouteMappingDelete::new(state.store.as_ref(), state.events.as_ref(), context)
        .delete(app, mapping)
        .await
        .map_err(|err| match err {
            StoreError::NotFound {
                resource: "route_mapping",
                ..
            } => ApiError::ResourceNotFound("Route mapping not found".into()),
            other => other.into(),
        })?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> CreateRouteMappingRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn message_defaults_process_type() {
        let req = request(serde_json::json!({
            "relationships": {"app": {"guid": "a"}, "route": {"guid": "r"}}
        }));
        assert!(req.validate().is_ok());
        assert_eq!(req.message().process_type(), "web");
        assert_eq!(req.message().app_port, None);
    }

    #[test]
    fn message_carries_process_and_port() {
        let req = request(serde_json::json!({
            "relationships": {
                "app": {"guid": "a"},
                "route": {"guid": "r"},
                "process": {"type": "worker"}
            },
            "app_port": 8080
        }));
        let message = req.message();
        assert_eq!(message.process_type(), "worker");
        assert_eq!(message.app_port, Some(8080));
    }

    #[test]
    fn validation_rejects_blank_and_out_of_range() {
        let blank = request(serde_json::json!({
            "relationships": {"app": {"guid": " "}, "route": {"guid": "r"}}
        }));
        assert_eq!(blank.validate().unwrap_err(), "App guid must be present");

        let port = request(serde_json::json!({
            "relationships": {"app": {"guid": "a"}, "route": {"guid": "r"}},
            "app_port": 0
        }));
        assert!(port.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<CreateRouteMappingRequest, _> = serde_json::from_value(serde_json::json!({
            "relationships": {"app": {"guid": "a"}, "route": {"guid": "r"}},
            "weight": 3
        }));
        assert!(result.is_err());
    }
}
