//! Common error types for the workbench

use thiserror::Error;

/// Common result type for workbench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across workbench crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A sector within a vendor document failed to deserialize or map
    #[error("Sector parse error: {0}")]
    SectorParse(String),

    /// JSON (de)serialization error (wraps serde_json::Error)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
