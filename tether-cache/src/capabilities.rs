//! Capabilities the host supplies to the cache engine.
//!
//! The engine never talks to the outside world directly: existence checks
//! against the downstream system, requests to remote zones and the resumption
//! of normal processing are all behind these traits, implemented by the
//! subscriber/agent layer that owns the wire protocol.

use async_trait::async_trait;

use tether_core::{EventKind, TetherResult};

/// Answers whether a referenced object already exists downstream.
///
/// Consulted once per newly discovered dependency; a dependency that is
/// already tracked in the store is never re-checked.
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// `key_values` holds the referenced object's ordered key component
    /// values; `payload` is the referencing object's serialized form, in
    /// case the decision needs more context than the key.
    async fn exists_in_target(
        &self,
        object_type: &str,
        key_values: &[String],
        payload: &str,
    ) -> TetherResult<bool>;
}

/// Issues a query for an outstanding object to the zone it should come from.
#[async_trait]
pub trait RequestChannel: Send + Sync {
    async fn issue_request(
        &self,
        object_type: &str,
        key_values: &[String],
        zone_id: &str,
    ) -> TetherResult<()>;
}

/// Hands a fully resolved payload back for normal processing.
#[async_trait]
pub trait ProcessingSink: Send + Sync {
    /// `event` is `Some` when the payload was originally delivered as an
    /// event, `None` for query responses.
    async fn resume(
        &self,
        payload: &str,
        zone_id: &str,
        event: Option<EventKind>,
    ) -> TetherResult<()>;
}
