//! Error types for lvb-results
//!
//! Defines module-specific error types using thiserror. Failures on the
//! orchestration surface are converted to logged flag changes before they
//! reach a caller; these errors travel only between internal layers.

use thiserror::Error;

/// Main error type for the results layer
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the shared workbench library
    #[error(transparent)]
    Common(#[from] lvb_common::Error),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Device connector failure
    #[error("Connector error: {0}")]
    Connector(String),

    /// A sector within a vendor document failed to deserialize or map
    #[error("Sector parse error: {0}")]
    SectorParse(String),

    /// Vendor document did not match the expected device schema
    #[error("Report parse error: {0}")]
    ReportParse(String),

    /// Operation invalid for the current state or device kind
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using lvb-results Error
pub type Result<T> = std::result::Result<T, Error>;
