//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor, plus the environment-driven [`AppConfig`].
//!
//! AppState holds handles only; every table lives behind the [`Store`]:
//! - **Store**: committed reads and transactions (Postgres or in-memory).
//! - **Broker clients**: one [`ServiceBrokerClient`](cc_broker_client::ServiceBrokerClient)
//!   per service instance, chosen by the [`ClientProvider`].
//! - **Event recorder**: audit events written inside workflow transactions.
//! - **Instance locks**: serialize broker operations per managed instance.
//! - **Job queue**: background service-binding deletions.

use std::sync::Arc;

use cc_broker_client::ClientProvider;
use cc_store::Store;
use thiserror::Error;

use crate::audit::{AuditEventRepository, EventRecorder};
use crate::jobs::JobQueue;
use crate::locks::InstanceLocks;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BROKER_TIMEOUT_SECS: u64 = 60;

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Runtime configuration.
///
/// | Variable | Default | Meaning |
/// |---|---|---|
/// | `CC_PORT` | 8080 | listen port |
/// | `CC_AUTH_TOKEN` | unset | gateway bearer token; auth disabled when unset |
/// | `DATABASE_URL` | unset | Postgres URL; in-memory store when unset |
/// | `CC_FIXTURES` | unset | JSON fixture file for the in-memory store |
/// | `CC_BROKER_TIMEOUT_SECS` | 60 | per-request broker timeout |
/// | `CC_METRICS_ENABLED` | true | mount `/metrics` and the metrics middleware |
/// | `CC_LOG_FORMAT` | text | `json` for structured logs |
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub auth_token: Option<String>,
    pub database_url: Option<String>,
    pub fixtures_path: Option<String>,
    pub broker_timeout_secs: u64,
    pub metrics_enabled: bool,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("fixtures_path", &self.fixtures_path)
            .field("broker_timeout_secs", &self.broker_timeout_secs)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            auth_token: None,
            database_url: None,
            fixtures_path: None,
            broker_timeout_secs: DEFAULT_BROKER_TIMEOUT_SECS,
            metrics_enabled: true,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let port = match non_empty("CC_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: "CC_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let broker_timeout_secs = match non_empty("CC_BROKER_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "CC_BROKER_TIMEOUT_SECS",
                        value,
                    })
                }
            },
            None => DEFAULT_BROKER_TIMEOUT_SECS,
        };

        let metrics_enabled = non_empty("CC_METRICS_ENABLED")
            .map(|v| v.trim().to_lowercase() != "false")
            .unwrap_or(true);

        let log_format = match non_empty("CC_LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "CC_LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            port,
            auth_token: non_empty("CC_AUTH_TOKEN"),
            database_url: non_empty("DATABASE_URL"),
            fixtures_path: non_empty("CC_FIXTURES"),
            broker_timeout_secs,
            metrics_enabled,
            log_format,
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub brokers: Arc<dyn ClientProvider>,
    pub events: Arc<dyn EventRecorder>,
    pub locks: InstanceLocks,
    pub jobs: JobQueue,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state with the default audit repository.
    ///
    /// Starts the deletion-job worker, so this must run inside a Tokio runtime.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        brokers: Arc<dyn ClientProvider>,
    ) -> Self {
        let events: Arc<dyn EventRecorder> = Arc::new(AuditEventRepository::new(store.clone()));
        Self {
            config: Arc::new(config),
            store,
            brokers,
            events,
            locks: InstanceLocks::new(),
            jobs: JobQueue::start(),
        }
    }

    /// Replace the event recorder.
    pub fn with_events(mut self, events: Arc<dyn EventRecorder>) -> Self {
        self.events = events;
        self
    }
}
