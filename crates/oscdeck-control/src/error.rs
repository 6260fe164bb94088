//! Error types for the control-surface engine
use thiserror::Error;

/// Control-surface engine errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for control-surface operations
pub type Result<T> = std::result::Result<T, ControlError>;
