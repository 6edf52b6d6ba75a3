//! Error types for the session factory.

use entity_mapping::MappingError;
use thiserror::Error;

/// Result type alias for session factory operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced while bootstrapping a factory or running a unit of work.
///
/// Bootstrap failures are fatal: nothing in this crate retries.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Missing or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A property had a value that could not be parsed
    #[error("Invalid value {value:?} for property {key}")]
    InvalidProperty { key: String, value: String },

    /// Live schema does not match the registered entities
    #[error("Schema error: {0}")]
    Schema(String),

    /// Connection verification did not finish in time
    #[error("Database verification timed out after {0}s")]
    VerificationTimeout(u64),

    /// Entity type was not added to the configuration
    #[error("Entity {0} is not registered with this session factory")]
    UnknownEntity(&'static str),

    /// Persisting an entity with application-assigned ids but no id set
    #[error("{entity} has no identifier and its identifiers are application-assigned")]
    MissingIdentifier { entity: &'static str },

    /// Updating or removing an entity that was never persisted
    #[error("{entity} has no identifier; persist it first")]
    Transient { entity: &'static str },

    /// A row with the same identifier already exists
    #[error("{entity} with id {id} already exists")]
    DuplicateIdentifier { entity: &'static str, id: i64 },

    /// No row with the given identifier
    #[error("{entity} with id {id} not found")]
    EntityNotFound { entity: &'static str, id: i64 },

    /// Row could not be mapped to or from an entity
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SessionError {
    /// True for errors raised before any connection was attempted
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidProperty { .. })
    }
}
