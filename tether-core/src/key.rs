//! Flattened composite keys.
//!
//! An object's composite primary key is flattened into a single string by
//! joining its ordered component values with the type's separator. The flat
//! key is the identity of cache entries and dependency records within a
//! (type, application) pair.
//!
//! Flattening is deliberately one-directional: the separator is not
//! guaranteed to be unambiguous, so the ordered component values are always
//! re-derived from the source object (or carried alongside the flat key),
//! never parsed back out of it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Single-string encoding of an ordered composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatKey(String);

impl FlatKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FlatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FlatKey {
    fn from(s: String) -> Self {
        FlatKey(s)
    }
}

impl From<&str> for FlatKey {
    fn from(s: &str) -> Self {
        FlatKey(s.to_string())
    }
}

/// Flatten ordered key component values into a single string.
///
/// An empty separator is only allowed for single-component keys; joining
/// multiple components with nothing in between would be ambiguous.
pub fn flatten_key(values: &[String], separator: &str) -> Result<FlatKey, ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::KeyFlattening {
            reason: "no key component values".to_string(),
        });
    }
    if separator.is_empty() && values.len() > 1 {
        return Err(ValidationError::KeyFlattening {
            reason: format!(
                "empty separator with {} components is ambiguous",
                values.len()
            ),
        });
    }
    Ok(FlatKey(values.join(separator)))
}
