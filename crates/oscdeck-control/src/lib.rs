//! oscdeck Control - Control-surface engine
//!
//! The client half of the system: a WebSocket transport to the relay
//! bridge, a declarative action registry, and the dynamic folder engine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oscdeck_core::StateCache;
//! use oscdeck_control::{
//!     ActionRegistry, RegistryConfig, SurfaceTransport, TransportConfig,
//! };
//!
//! # async fn start() {
//! let cache = StateCache::new();
//! let transport = Arc::new(SurfaceTransport::connect(
//!     TransportConfig::default(),
//!     cache.clone(),
//!     Arc::new(|_| true),
//! ));
//! let (registry, _events) =
//!     ActionRegistry::new(cache, transport.clone(), RegistryConfig::default());
//! # let _ = registry;
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - WebSocket client with automatic reconnect
//! - [`descriptor`] - Declarative button/dial descriptors
//! - [`registry`] - Descriptor registry and action dispatch
//! - [`folder`] - Dynamic folder engine
//! - [`error`] - Error types

/// Declarative button/dial descriptors
pub mod descriptor;
/// Error types
pub mod error;
/// Dynamic folder engine
pub mod folder;
/// Descriptor registry and action dispatch
pub mod registry;
/// WebSocket client transport
pub mod transport;

// Re-exports
pub use descriptor::{ActionConfig, ActionDescriptor, ActionKind, DisplayStyle, ParameterOption};
pub use error::{ControlError, Result};
pub use folder::{
    CatalogDocument, CatalogItem, DynamicFolder, FolderControl, FolderResponse, RotarySlot,
    PAGE_SIZE, ROTARY_SLOTS,
};
pub use registry::{
    burst_for, ActionRegistry, RegistryConfig, RegistryEvent, TickAcceleration,
};
pub use transport::{
    ConnectionState, OscSender, RelevanceFilter, SurfaceTransport, TransportConfig,
};
