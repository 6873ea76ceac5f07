//! Error types shared across ShotScope crates.

use std::path::PathBuf;

/// Top-level error type for ShotScope operations.
#[derive(Debug, thiserror::Error)]
pub enum ShotscopeError {
    #[error("Ingest error: {message}")]
    Ingest { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Calibration error: {message}")]
    Calibration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Playback error: {message}")]
    Playback { message: String },

    /// A control operation that is not valid in the current state.
    /// Nothing is mutated when this is returned.
    #[error("Rejected: {message}")]
    StateConflict { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ShotscopeError.
pub type ShotscopeResult<T> = Result<T, ShotscopeError>;

impl ShotscopeError {
    pub fn ingest(msg: impl Into<String>) -> Self {
        Self::Ingest {
            message: msg.into(),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn calibration(msg: impl Into<String>) -> Self {
        Self::Calibration {
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback {
            message: msg.into(),
        }
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Whether this error is a rejected control operation rather than a failure.
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, Self::StateConflict { .. })
    }
}
