//! Error types for entity mapping.

use thiserror::Error;

/// Result type alias for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while converting between entities and column values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The hstore text could not be parsed
    #[error("malformed hstore at byte {position}: {reason}")]
    HstoreSyntax { position: usize, reason: &'static str },

    /// A NULL value was found where the mapped field cannot hold one
    #[error("hstore key {key:?} has a NULL value")]
    NullHstoreValue { key: String },

    /// The number of column values did not match the descriptor
    #[error("{entity} expects {expected} column values, got {found}")]
    ColumnCount {
        entity: &'static str,
        expected: usize,
        found: usize,
    },

    /// A column value had the wrong type for its mapping
    #[error("{entity}.{column} expects a {expected} value")]
    TypeMismatch {
        entity: &'static str,
        column: &'static str,
        expected: &'static str,
    },

    /// A non-nullable column was NULL
    #[error("{entity}.{column} is not nullable")]
    UnexpectedNull {
        entity: &'static str,
        column: &'static str,
    },
}
