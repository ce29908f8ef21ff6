//! Error types for the parley core library.

use thiserror::Error;

/// Top-level error type for parley policy operations.
///
/// None of these are fatal to the host: configuration problems resolve to
/// defaults and a missing personality table disables personalities.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// The persisted personality table could not be found.
    #[error("Personality storage unavailable: {0}")]
    StorageUnavailable(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ParleyError>;
