//! # Resource Identifiers
//!
//! Every resource exposed by the API is addressed by a guid. Guids arrive
//! from clients as arbitrary strings (a lookup for `"bad-guid"` must yield
//! a clean 404, not a parse error), so `Guid` wraps a `String` rather than
//! a `Uuid`. Locally generated guids are UUID v4.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    /// Generate a fresh random guid.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the guid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the guid is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Consume the guid, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Guid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Guid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_guids_are_unique() {
        assert_ne!(Guid::generate(), Guid::generate());
    }

    #[test]
    fn arbitrary_strings_are_accepted() {
        let guid = Guid::from("bad-guid");
        assert_eq!(guid.as_str(), "bad-guid");
        assert_eq!(guid.to_string(), "bad-guid");
    }

    #[test]
    fn blank_detection() {
        assert!(Guid::from("  ").is_blank());
        assert!(!Guid::generate().is_blank());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Guid::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Guid::from("abc"));
    }
}
