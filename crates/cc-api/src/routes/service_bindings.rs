//! # v2 Service Binding Routes
//!
//! - `POST   /v2/service_bindings`       : bind an app to a service instance
//! - `GET    /v2/service_bindings`       : list visible bindings
//! - `GET    /v2/service_bindings/{guid}`: show a binding
//! - `DELETE /v2/service_bindings/{guid}`: unbind, optionally `recursive` and `async`

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cc_core::Guid;
use cc_store::ServiceBindingFilter;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::access::RequestContext;
use crate::actions::{
    DeleteOptions, DeleteOutcome, ServiceBindingCreate, ServiceBindingDelete,
    ServiceBindingRequest,
};
use crate::error::ApiError;
use crate::extractors::{extract_query, extract_validated_json, PageQuery, Validate};
use crate::fetchers::fetch_service_binding;
use crate::presenters::{service_binding_path, ServiceBindingList, ServiceBindingResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v2/service_bindings",
            get(list_service_bindings).post(create_service_binding),
        )
        .route(
            "/v2/service_bindings/{guid}",
            get(get_service_binding).delete(delete_service_binding),
        )
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /v2/service_bindings`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateServiceBindingRequest {
    pub app_guid: String,
    pub service_instance_guid: String,
    /// Arbitrary broker parameters; `{}` when absent.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub binding_options: Option<serde_json::Value>,
}

impl Validate for CreateServiceBindingRequest {
    fn validate(&self) -> Result<(), String> {
        if self.app_guid.trim().is_empty() {
            return Err("app_guid must be present".into());
        }
        if self.service_instance_guid.trim().is_empty() {
            return Err("service_instance_guid must be present".into());
        }
        match &self.binding_options {
            None | Some(serde_json::Value::Object(_)) => Ok(()),
            Some(_) => Err("binding_options must be an object".into()),
        }
    }
}

impl From<CreateServiceBindingRequest> for ServiceBindingRequest {
    fn from(req: CreateServiceBindingRequest) -> Self {
        Self {
            app_guid: Guid::from(req.app_guid),
            service_instance_guid: Guid::from(req.service_instance_guid),
            binding_options: req
                .binding_options
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        }
    }
}

/// Filters and paging for `GET /v2/service_bindings`.
///
/// Paging fields are repeated here rather than flattened from [`PageQuery`];
/// flattened query structs lose numeric parsing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListServiceBindingsQuery {
    /// Only bindings of this app.
    pub app_guid: Option<String>,
    /// Only bindings of this service instance.
    pub service_instance_guid: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListServiceBindingsQuery {
    fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }

    /// Filter part of the query string, echoed into `prev_url`/`next_url`.
    fn filter_query(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        if let Some(app_guid) = &self.app_guid {
            serializer.append_pair("app_guid", app_guid);
        }
        if let Some(instance_guid) = &self.service_instance_guid {
            serializer.append_pair("service_instance_guid", instance_guid);
        }
        serializer.finish()
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteServiceBindingQuery {
    /// Also delete dependent associations.
    #[serde(default)]
    pub recursive: bool,
    /// Queue the deletion and return immediately.
    #[serde(default, rename = "async")]
    pub run_async: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Bind an app to a service instance.
#[utoipa::path(
    post,
    path = "/v2/service_bindings",
    request_body = CreateServiceBindingRequest,
    responses(
        (status = 201, description = "Service binding created", body = ServiceBindingResponse),
        (status = 400, description = "Unbindable service, taken, or invalid binding", body = crate::error::ErrorBody),
        (status = 403, description = "Not authorized", body = crate::error::ErrorBody),
        (status = 404, description = "App or service instance not found", body = crate::error::ErrorBody),
        (status = 502, description = "Service broker failure", body = crate::error::ErrorBody),
    ),
    tag = "service-bindings"
)]
async fn create_service_binding(
    State(state): State<AppState>,
    context: RequestContext,
    body: Result<Json<CreateServiceBindingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    context.permissions.require_write_scope()?;
    let req = extract_validated_json(body)?;

    let binding = ServiceBindingCreate::new(
        state.store.as_ref(),
        state.brokers.as_ref(),
        &state.locks,
        state.events.as_ref(),
        &context,
    )
    .create(req.into())
    .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, service_binding_path(&binding.guid))],
        Json(ServiceBindingResponse::from(&binding)),
    ))
}

/// List service bindings of apps in spaces the actor can read.
#[utoipa::path(
    get,
    path = "/v2/service_bindings",
    params(ListServiceBindingsQuery),
    responses(
        (status = 200, description = "Paginated service bindings", body = ServiceBindingList),
        (status = 403, description = "Missing read scope", body = crate::error::ErrorBody),
    ),
    tag = "service-bindings"
)]
async fn list_service_bindings(
    State(state): State<AppState>,
    context: RequestContext,
    query: Result<Query<ListServiceBindingsQuery>, QueryRejection>,
) -> Result<Json<ServiceBindingList>, ApiError> {
    context.permissions.require_read_scope()?;
    let query = extract_query(query)?;
    let pagination = query.page_query().pagination()?;
    let filter = ServiceBindingFilter {
        app_guid: query.app_guid.as_deref().map(Guid::from),
        service_instance_guid: query.service_instance_guid.as_deref().map(Guid::from),
        space_guids: context.permissions.readable_spaces(),
    };
    let page = state.store.list_service_bindings(&filter, pagination).await?;
    Ok(Json(ServiceBindingList::new(
        &query.filter_query(),
        &page,
        pagination,
    )))
}

/// Show a service binding.
#[utoipa::path(
    get,
    path = "/v2/service_bindings/{guid}",
    params(("guid" = String, Path, description = "Service binding guid")),
    responses(
        (status = 200, description = "Service binding", body = ServiceBindingResponse),
        (status = 404, description = "Service binding not found", body = crate::error::ErrorBody),
    ),
    tag = "service-bindings"
)]
async fn get_service_binding(
    State(state): State<AppState>,
    context: RequestContext,
    Path(guid): Path<String>,
) -> Result<Json<ServiceBindingResponse>, ApiError> {
    context.permissions.require_read_scope()?;
    let (binding, _) =
        fetch_service_binding(state.store.as_ref(), &context.permissions, &Guid::from(guid))
            .await?;
    Ok(Json(ServiceBindingResponse::from(&binding)))
}

/// Unbind and delete a service binding.
#[utoipa::path(
    delete,
    path = "/v2/service_bindings/{guid}",
    params(
        ("guid" = String, Path, description = "Service binding guid"),
        DeleteServiceBindingQuery
    ),
    responses(
        (status = 204, description = "Service binding deleted or deletion queued"),
        (status = 403, description = "Not authorized", body = crate::error::ErrorBody),
        (status = 404, description = "Service binding not found", body = crate::error::ErrorBody),
        (status = 422, description = "Associations exist and delete is not recursive", body = crate::error::ErrorBody),
        (status = 502, description = "Service broker failure", body = crate::error::ErrorBody),
    ),
    tag = "service-bindings"
)]
async fn delete_service_binding(
    State(state): State<AppState>,
    context: RequestContext,
    Path(guid): Path<String>,
    query: Result<Query<DeleteServiceBindingQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    context.permissions.require_write_scope()?;
    let query = extract_query(query)?;
    let options = DeleteOptions {
        recursive: query.recursive,
        run_async: query.run_async,
    };
    let outcome = ServiceBindingDelete::new(&state, &context)
        .delete(&Guid::from(guid), options)
        .await?;
    if let DeleteOutcome::Enqueued(job_guid) = outcome {
        tracing::info!(job_guid = %job_guid, "service binding deletion queued");
    }
    Ok(StatusCode::NO_CONTENT)
}
