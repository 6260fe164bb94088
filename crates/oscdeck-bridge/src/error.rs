//! Error types for the relay bridge
use thiserror::Error;

/// Relay bridge errors
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Socket bind or I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
