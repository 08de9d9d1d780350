//! Error types for Tether operations

use thiserror::Error;

/// Configuration and type-graph load errors.
///
/// All of these are fatal: the owning process must refuse to start when the
/// type graph or settings cannot be loaded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Type graph is empty: at least one object type is required")]
    EmptyTypeGraph,

    #[error("Duplicate object type in graph: {name}")]
    DuplicateType { name: String },

    #[error("Invalid key layout for {type_name}: {reason}")]
    InvalidKeyLayout { type_name: String, reason: String },

    #[error("Dependency edge on {source_type} targets unknown type {target}")]
    UnknownEdgeTarget { source_type: String, target: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Argument validation errors.
///
/// Raised synchronously when a caller passes empty or unusable identifying
/// fields; the caller is responsible for fixing its input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required argument missing or empty: {field}")]
    RequiredArgument { field: String },

    #[error("Cannot flatten key: {reason}")]
    KeyFlattening { reason: String },

    #[error("Missing key component for {type_name} at path {path}")]
    MissingKeyComponent { type_name: String, path: String },
}

/// Persistence layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entry not found: {object_type} with key {flat_key}")]
    EntryNotFound {
        object_type: String,
        flat_key: String,
    },

    #[error("Entry already cached: {object_type} with key {flat_key}")]
    AlreadyExists {
        object_type: String,
        flat_key: String,
    },

    #[error("Dependency record not found: {object_type} with key {flat_key}")]
    RecordNotFound {
        object_type: String,
        flat_key: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Master error type for all Tether operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TetherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for Tether operations.
pub type TetherResult<T> = Result<T, TetherError>;

// =============================================================================
// TESTS
// =============================================================================
