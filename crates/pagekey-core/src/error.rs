//! Error types for pagekey.

use thiserror::Error;

use crate::identifier::IdentifierError;

/// Result type alias using pagekey's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pagekey operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifier could not be normalized
    #[error("Identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// A content migration step failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Storage layer rejected an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored content changed underneath an operation that read it earlier
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error means the requested page or key does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
