//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the gateway bearer token scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Gateway bearer token. Set via CC_AUTH_TOKEN env var; caller identity travels in X-User-Guid and X-Scopes.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cloud Controller API",
        version = "0.1.0",
        description = "Route mappings (v3) and service bindings (v2).\n\nAuthentication: Bearer token via `Authorization: Bearer <token>` header plus gateway identity headers. Health probes (`/health/*`) and `/metrics` are unauthenticated."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Route mappings ──────────────────────────────────────────────
        crate::routes::route_mappings::create_route_mapping,
        crate::routes::route_mappings::list_route_mappings,
        crate::routes::route_mappings::get_route_mapping,
        crate::routes::route_mappings::delete_route_mapping,
        crate::routes::route_mappings::list_app_route_mappings,
        crate::routes::route_mappings::get_app_route_mapping,
        crate::routes::route_mappings::delete_app_route_mapping,
        // ── Service bindings ────────────────────────────────────────────
        crate::routes::service_bindings::create_service_binding,
        crate::routes::service_bindings::list_service_bindings,
        crate::routes::service_bindings::get_service_binding,
        crate::routes::service_bindings::delete_service_binding,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::presenters::Link,
            crate::presenters::PaginationInfo,
            // ── Route mapping DTOs ──────────────────────────────────────
            crate::routes::route_mappings::CreateRouteMappingRequest,
            crate::routes::route_mappings::RouteMappingRelationships,
            crate::routes::route_mappings::GuidRelationship,
            crate::routes::route_mappings::ProcessRelationship,
            crate::presenters::RouteMappingResponse,
            crate::presenters::RouteMappingLinks,
            crate::presenters::RouteMappingList,
            // ── Service binding DTOs ────────────────────────────────────
            crate::routes::service_bindings::CreateServiceBindingRequest,
            crate::presenters::V2Metadata,
            crate::presenters::ServiceBindingEntity,
            crate::presenters::ServiceBindingResponse,
            crate::presenters::ServiceBindingList,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "route-mappings", description = "Map app processes to routes"),
        (name = "service-bindings", description = "Bind apps to service instances through their brokers"),
    )
)]
pub struct ApiDoc;

/// Router serving the OpenAPI document.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/v3/route_mappings",
            "/v3/route_mappings/{guid}",
            "/v3/apps/{app_guid}/route_mappings",
            "/v3/apps/{app_guid}/route_mappings/{guid}",
            "/v2/service_bindings",
            "/v2/service_bindings/{guid}",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }

    #[test]
    fn bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
