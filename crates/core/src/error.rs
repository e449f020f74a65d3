//! Shared error model.

use thiserror::Error;

/// Result type used by Forge building blocks.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Failures shared across Forge crates.
///
/// Keep this focused on deterministic failures (validation, lookups,
/// conflicts). Startup configuration failures have their own types in the
/// crates that load configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForgeError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl ForgeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
