//! oscdeck Bridge - UDP/WebSocket relay and preset store
//!
//! The long-lived process sitting between the control surface and the
//! audio device: device feedback arriving on two UDP ports is broadcast to
//! every connected WebSocket surface client, surface commands are forwarded
//! to the device's two UDP ports, and surface layout presets are served
//! over a small HTTP API for the browser-based editor.
//!
//! ## Modules
//!
//! - [`relay`] - UDP listeners and the WebSocket fan-out
//! - [`presets`] - Preset file store and HTTP endpoints
//! - [`config`] - Bridge configuration
//! - [`error`] - Error types

/// Bridge configuration
pub mod config;
/// Error types
pub mod error;
/// Preset file store and HTTP endpoints
pub mod presets;
/// UDP listeners and the WebSocket fan-out
pub mod relay;

// Re-exports
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use presets::{BoundPresets, PresetServer, PresetStore};
pub use relay::{BoundRelay, RelayServer};
