//! Store error types

use heritage_library_schemas::ResourceId;
use thiserror::Error;

/// Resource library error type
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Category or resource absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or ill-typed request fields, unsupported action or format
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request conflicts with stored state (e.g. a second video)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LibraryError {
    pub fn resource_not_found(category: &str, id: &ResourceId) -> Self {
        LibraryError::NotFound(format!("resource {} in category {}", id, category))
    }

    pub fn category_not_found(category: &str) -> Self {
        LibraryError::NotFound(format!("category {}", category))
    }
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, LibraryError>;
