//! # API Error Types
//!
//! [`ApiError`] is the single error type handlers return. It maps every
//! workflow failure to a status code and a machine-readable code and renders
//! the JSON body `{"error": {"code", "message", "details"?}}`.
//!
//! | Variant | Status | Code |
//! |---|---|---|
//! | `UnprocessableEntity` | 422 | `UnprocessableEntity` |
//! | `ResourceNotFound` | 404 | `ResourceNotFound` |
//! | `AppNotFound` | 404 | `AppNotFound` |
//! | `ServiceInstanceNotFound` | 404 | `ServiceInstanceNotFound` |
//! | `ServiceBindingNotFound` | 404 | `ServiceBindingNotFound` |
//! | `NotAuthorized` | 403 | `NotAuthorized` |
//! | `InvalidAuthToken` | 401 | `InvalidAuthToken` |
//! | `UnbindableService` | 400 | `UnbindableService` |
//! | `ServiceBindingAppServiceTaken` | 400 | `ServiceBindingAppServiceTaken` |
//! | `ServiceBindingInvalid` | 400 | `ServiceBindingInvalid` |
//! | `AssociationNotEmpty` | 422 | `AssociationNotEmpty` |
//! | `ServiceBroker` | 502 | `ServiceBrokerError` |
//! | `Internal` | 500 | `InternalError` |
//!
//! Internal and broker messages are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cc_broker_client::BrokerError;
use cc_core::Guid;
use cc_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::access::NotAuthorized;
use crate::actions::{
    RouteMappingCreateError, ServiceBindingCreateError, ServiceBindingDeleteError,
};
use crate::jobs::DeletionJobError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "ResourceNotFound").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Field-level messages, present only for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body or workflow input rejected (422).
    #[error("{0}")]
    UnprocessableEntity(String),

    /// Generic not-found, message names the resource, e.g. "App not found" (404).
    #[error("{0}")]
    ResourceNotFound(String),

    #[error("The app could not be found: {0}")]
    AppNotFound(Guid),

    #[error("The service instance could not be found: {0}")]
    ServiceInstanceNotFound(Guid),

    #[error("The service binding could not be found: {0}")]
    ServiceBindingNotFound(Guid),

    /// Authenticated, but not allowed to perform this action (403).
    #[error("You are not authorized to perform the requested action")]
    NotAuthorized,

    /// Missing or invalid bearer token (401).
    #[error("{0}")]
    InvalidAuthToken(String),

    #[error("The service instance doesn't support binding.")]
    UnbindableService,

    /// Message carries `"<app_guid> <service_instance_guid>"`.
    #[error("The app space binding to service is taken: {0}")]
    ServiceBindingAppServiceTaken(String),

    #[error("The service binding is invalid: {}", .0.join(", "))]
    ServiceBindingInvalid(Vec<String>),

    /// Dependent records block a non-recursive delete (422).
    #[error("{0}")]
    AssociationNotEmpty(String),

    /// The service broker failed or was unreachable (502).
    #[error("service broker error: {0}")]
    ServiceBroker(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Return the HTTP status code and machine-readable error code for this error.
    pub(crate) fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::UnprocessableEntity(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UnprocessableEntity")
            }
            Self::ResourceNotFound(_) => (StatusCode::NOT_FOUND, "ResourceNotFound"),
            Self::AppNotFound(_) => (StatusCode::NOT_FOUND, "AppNotFound"),
            Self::ServiceInstanceNotFound(_) => (StatusCode::NOT_FOUND, "ServiceInstanceNotFound"),
            Self::ServiceBindingNotFound(_) => (StatusCode::NOT_FOUND, "ServiceBindingNotFound"),
            Self::NotAuthorized => (StatusCode::FORBIDDEN, "NotAuthorized"),
            Self::InvalidAuthToken(_) => (StatusCode::UNAUTHORIZED, "InvalidAuthToken"),
            Self::UnbindableService => (StatusCode::BAD_REQUEST, "UnbindableService"),
            Self::ServiceBindingAppServiceTaken(_) => {
                (StatusCode::BAD_REQUEST, "ServiceBindingAppServiceTaken")
            }
            Self::ServiceBindingInvalid(_) => (StatusCode::BAD_REQUEST, "ServiceBindingInvalid"),
            Self::AssociationNotEmpty(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "AssociationNotEmpty")
            }
            Self::ServiceBroker(_) => (StatusCode::BAD_GATEWAY, "ServiceBrokerError"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal/broker error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::ServiceBroker(_) => "The service broker could not complete the request".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceBroker(_) => tracing::error!(error = %self, "service broker failure"),
            _ => {}
        }

        let details = match &self {
            Self::ServiceBindingInvalid(messages) => Some(serde_json::json!(messages)),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Storage failures that reach the boundary unclassified are internal.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self::ServiceBroker(err.to_string())
    }
}

impl From<NotAuthorized> for ApiError {
    fn from(_: NotAuthorized) -> Self {
        Self::NotAuthorized
    }
}

impl From<RouteMappingCreateError> for ApiError {
    fn from(err: RouteMappingCreateError) -> Self {
        match err {
            RouteMappingCreateError::Invalid(invalid) => Self::UnprocessableEntity(invalid.0),
            RouteMappingCreateError::Store(e) => e.into(),
        }
    }
}

impl From<ServiceBindingCreateError> for ApiError {
    fn from(err: ServiceBindingCreateError) -> Self {
        use ServiceBindingCreateError as E;
        match err {
            E::ServiceInstanceNotFound(guid) => Self::ServiceInstanceNotFound(guid),
            E::UnbindableService => Self::UnbindableService,
            E::AppNotFound(guid) => Self::AppNotFound(guid),
            E::NotAuthorized => Self::NotAuthorized,
            E::AppServiceTaken {
                app_guid,
                service_instance_guid,
            } => Self::ServiceBindingAppServiceTaken(format!("{app_guid} {service_instance_guid}")),
            E::Invalid(messages) => Self::ServiceBindingInvalid(messages),
            E::Broker(e) => e.into(),
            E::Store(e) => e.into(),
        }
    }
}

fn association_not_empty(guid: &Guid) -> ApiError {
    ApiError::AssociationNotEmpty(format!(
        "Please delete the service binding associations for service binding {guid}, or delete recursively."
    ))
}

impl From<ServiceBindingDeleteError> for ApiError {
    fn from(err: ServiceBindingDeleteError) -> Self {
        use ServiceBindingDeleteError as E;
        match err {
            E::NotFound(guid) => Self::ServiceBindingNotFound(guid),
            E::NotAuthorized => Self::NotAuthorized,
            E::AssociationNotEmpty { guid, .. } => association_not_empty(&guid),
            // An association created between the check and the delete.
            E::Job(DeletionJobError::Store(StoreError::HasDependents { guid, .. })) => {
                association_not_empty(&guid)
            }
            E::Job(DeletionJobError::Broker(e)) | E::Broker(e) => e.into(),
            E::Job(DeletionJobError::Store(e)) | E::Store(e) => e.into(),
            E::Queue(e) => Self::Internal(e.to_string()),
        }
    }
}
