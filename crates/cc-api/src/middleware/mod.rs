//! # Middleware Stack
//!
//! - [`metrics`]: Prometheus request metrics.
//!
//! Bearer-token authentication lives in [`crate::auth`]; request tracing is
//! `tower_http::trace::TraceLayer`, applied in [`crate::app`].

pub mod metrics;
