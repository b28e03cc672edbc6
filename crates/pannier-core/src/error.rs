//! Error types for pannier-core

use thiserror::Error;

/// Result type alias using pannier-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pannier-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote service rejected the entity content
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network unreachable, request timed out, or response malformed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local cache I/O failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Transport-class failures trigger the offline fallback path instead of
    /// failing the operation outright.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Validation-class failures are surfaced to the caller and never retried
    /// against the local cache.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidInput(_))
    }
}
