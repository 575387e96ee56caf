//! # cc-api: Cloud Controller API Services
//!
//! Route mappings connect an app's process type to an HTTP route; service
//! bindings connect an app to a service instance through its broker. Both
//! are transactional workflows with audit events, and binding deletion can
//! run in a background job.
//!
//! ## API Surface
//!
//! | Prefix | Module | Domain |
//! |---|---|---|
//! | `/v3/route_mappings/*` | [`routes::route_mappings`] | Route mappings |
//! | `/v3/apps/{guid}/route_mappings/*` | [`routes::route_mappings`] | Route mappings of one app |
//! | `/v2/service_bindings/*` | [`routes::service_bindings`] | Service bindings |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros and served at `/openapi.json`.

pub mod access;
pub mod actions;
pub mod audit;
pub mod auth;
pub mod error;
pub mod extractors;
pub mod fetchers;
pub mod jobs;
pub mod locks;
pub mod middleware;
pub mod openapi;
pub mod presenters;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();
    let metrics_on = state.config.metrics_enabled;

    // Body size limit: 2 MiB.
    let mut api = Router::new()
        .merge(routes::route_mappings::router())
        .merge(routes::service_bindings::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", axum::routing::get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics: Prometheus scrape endpoint.
///
/// Domain gauges are refreshed from the store and job queue on each scrape.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    match state.store.resource_counts().await {
        Ok(counts) => {
            metrics
                .route_mappings_total()
                .set(i64::try_from(counts.route_mappings).unwrap_or(i64::MAX));
            metrics
                .service_bindings_total()
                .set(i64::try_from(counts.service_bindings).unwrap_or(i64::MAX));
        }
        Err(e) => tracing::warn!("failed to count resources for metrics: {e}"),
    }
    metrics
        .deletion_jobs_pending()
        .set(i64::try_from(state.jobs.pending()).unwrap_or(i64::MAX));

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.store.ping().await {
        tracing::warn!("Store health check failed: {e}");
        return (StatusCode::SERVICE_UNAVAILABLE, "store unreachable").into_response();
    }
    (StatusCode::OK, "ready").into_response()
}
