//! # Validation Rules
//!
//! Field-level validation results and the pure invariant checks that run
//! before any write.
//!
//! [`ValidationErrors`] records failures keyed by the *set* of fields
//! involved. Single-field failures use a one-element set; compound
//! uniqueness failures list every column of the constraint, e.g.
//! `["app_guid", "route_guid", "process_type"]`. The storage layer reports
//! constraint violations in this same shape, so a caller can ask
//! `errors.on(&["app_guid", "route_guid", "process_type"])` and get the
//! same answer regardless of whether the failure came from model validation,
//! the in-memory backend, or a Postgres unique index.

use std::fmt;

use thiserror::Error;

use crate::model::{App, Route};

/// Kind of a single validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// A required value or referenced record is missing.
    Presence,
    /// The value collides with an existing row under a uniqueness constraint.
    Unique,
    /// The value exceeds the given maximum length.
    MaxLength(usize),
    /// A numeric value is outside its permitted range.
    Range,
    /// The value has the wrong shape (e.g. options that are not an object).
    Format,
    /// Two referenced records live in different spaces.
    SpaceMismatch,
}

impl ValidationKind {
    fn message(&self) -> String {
        match self {
            Self::Presence => "is not present".to_string(),
            Self::Unique => "is already taken".to_string(),
            Self::MaxLength(max) => format!("is longer than {max} characters"),
            Self::Range => "is not in range or set".to_string(),
            Self::Format => "is invalid".to_string(),
            Self::SpaceMismatch => "must belong to the same space".to_string(),
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence => f.write_str("presence"),
            Self::Unique => f.write_str("unique"),
            Self::MaxLength(_) => f.write_str("max_length"),
            Self::Range => f.write_str("range"),
            Self::Format => f.write_str("format"),
            Self::SpaceMismatch => f.write_str("space_mismatch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldError {
    fields: Vec<&'static str>,
    kind: ValidationKind,
}

/// Collected validation failures for one record.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", self.full_messages().join(", "))]
pub struct ValidationErrors {
    entries: Vec<FieldError>,
}

impl ValidationErrors {
    /// An empty error set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding a single failure.
    pub fn single(fields: &[&'static str], kind: ValidationKind) -> Self {
        let mut errors = Self::new();
        errors.add(fields, kind);
        errors
    }

    /// Record a failure on the given field set.
    pub fn add(&mut self, fields: &[&'static str], kind: ValidationKind) {
        self.entries.push(FieldError {
            fields: fields.to_vec(),
            kind,
        });
    }

    /// Kinds recorded on exactly this field set, or `None` if there are none.
    pub fn on(&self, fields: &[&str]) -> Option<Vec<ValidationKind>> {
        let kinds: Vec<ValidationKind> = self
            .entries
            .iter()
            .filter(|e| e.fields.as_slice() == fields)
            .map(|e| e.kind)
            .collect();
        if kinds.is_empty() {
            None
        } else {
            Some(kinds)
        }
    }

    /// Whether `kind` was recorded on exactly this field set.
    pub fn has(&self, fields: &[&str], kind: ValidationKind) -> bool {
        self.on(fields).is_some_and(|kinds| kinds.contains(&kind))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Human-readable messages, one per failure, e.g.
    /// `"app_guid, route_guid, process_type is already taken"`.
    pub fn full_messages(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{} {}", e.fields.join(", "), e.kind.message()))
            .collect()
    }

    /// Merge another error set into this one.
    pub fn extend(&mut self, other: ValidationErrors) {
        self.entries.extend(other.entries);
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Record a presence failure when `value` is blank.
pub fn validate_presence(errors: &mut ValidationErrors, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.add(&[field], ValidationKind::Presence);
    }
}

/// Record a max-length failure when `value` is longer than `max` characters.
pub fn validate_max_length(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    max: usize,
) {
    if value.chars().count() > max {
        errors.add(&[field], ValidationKind::MaxLength(max));
    }
}

/// An app can only be mapped to a route in its own space.
pub fn same_space(app: &App, route: &Route) -> bool {
    app.space_guid == route.space_guid
}
