//! Error types for SQL fragment construction.

use thiserror::Error;

/// Errors raised while assembling SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// An identifier contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A type name contains characters that cannot appear in a type spelling.
    #[error("Invalid type name: {0:?}")]
    InvalidTypeName(String),
}

/// Result type for SQL fragment construction.
pub type Result<T> = std::result::Result<T, SqlError>;
