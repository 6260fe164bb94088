//! Error types for the core crate
use thiserror::Error;

/// Core errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Inbound bytes rejected by the OSC parser
    #[error("OSC decode error ({len} bytes): {reason}")]
    DecodeError { len: usize, reason: String },

    /// Outbound message rejected by the OSC encoder
    #[error("OSC encode error for {address}: {reason}")]
    EncodeError { address: String, reason: String },

    /// Bundle wrapper with no content to unwrap
    #[error("OSC bundle is empty")]
    EmptyBundle,
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
