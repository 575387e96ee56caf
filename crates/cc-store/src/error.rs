//! Storage error types.

use cc_core::{Guid, ValidationErrors};
use thiserror::Error;

/// Errors from store reads, staged writes and commits.
///
/// Constraint violations from either backend surface as
/// [`StoreError::Validation`] keyed by the constraint's field set, so callers
/// classify failures the same way whether they were caught at insert time,
/// at commit time, or by a Postgres index.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A model rule or storage constraint rejected the write.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// The targeted record does not exist.
    #[error("{resource} {guid} not found")]
    NotFound { resource: &'static str, guid: Guid },

    /// The record cannot be removed while dependent rows reference it.
    #[error("{resource} {guid} still has dependent records")]
    HasDependents { resource: &'static str, guid: Guid },

    /// Connection, query or commit failure.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Validation errors carried by this error, if any.
    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for StoreError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
