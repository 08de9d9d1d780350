//! Enum types shared across the Tether crates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// What to do with a cache entry whose expiry deadline has passed while it
/// still has unresolved dependencies.
///
/// The `Unknown` variant is the deserialization catch-all for values written
/// by other (possibly newer or misconfigured) agents sharing the store.
/// Housekeeping skips such rows with a logged warning instead of crashing;
/// the type-graph loader rejects `Unknown` outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryStrategy {
    /// Drop the entry and its now-orphaned dependency records.
    Expire,
    /// Keep the entry, re-arm its deadline and mark its dependencies for
    /// another round of requests.
    Request,
    /// Unrecognized persisted value.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ExpiryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryStrategy::Expire => write!(f, "EXPIRE"),
            ExpiryStrategy::Request => write!(f, "REQUEST"),
            ExpiryStrategy::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FromStr for ExpiryStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "EXPIRE" => Ok(ExpiryStrategy::Expire),
            "REQUEST" => Ok(ExpiryStrategy::Request),
            other => Err(ConfigError::InvalidValue {
                field: "expiry_strategy".to_string(),
                value: other.to_string(),
                reason: "expected EXPIRE or REQUEST".to_string(),
            }),
        }
    }
}

/// Kind of event an entry was received from, for event-sourced entries.
///
/// Objects delivered as query responses carry no event kind at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Add,
    Change,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Add => write!(f, "ADD"),
            EventKind::Change => write!(f, "CHANGE"),
            EventKind::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for EventKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ADD" => Ok(EventKind::Add),
            "CHANGE" => Ok(EventKind::Change),
            "DELETE" => Ok(EventKind::Delete),
            other => Err(ConfigError::InvalidValue {
                field: "event_kind".to_string(),
                value: other.to_string(),
                reason: "expected ADD, CHANGE or DELETE".to_string(),
            }),
        }
    }
}
