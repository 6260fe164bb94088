//! oscdeck Core - Shared OSC building blocks
//!
//! Leaf crate shared by the relay bridge and the control-surface engine:
//! - **Codec**: OSC wire encoding/decoding, reduced to address + one scalar
//! - **Value**: the scalar argument model with widening accessors
//! - **Cache**: last-write-wins address/value map with change notification
//!
//! ## Quick Start
//!
//! ```rust
//! use oscdeck_core::{decode, encode, OscArg};
//!
//! let bytes = encode("/Track/1/Volume", &OscArg::Float(0.5)).unwrap();
//! let msg = decode(&bytes).unwrap();
//! assert_eq!(msg.address, "/Track/1/Volume");
//! ```
//!
//! ## Modules
//!
//! - [`codec`] - OSC wire codec
//! - [`value`] - Scalar argument model
//! - [`cache`] - State cache with subscriptions
//! - [`error`] - Error types

/// State cache with subscriptions
pub mod cache;
/// OSC wire codec
pub mod codec;
/// Error types
pub mod error;
/// Scalar argument model
pub mod value;

// Re-exports
pub use cache::{CachedValue, StateCache, StateChange, Subscription};
pub use codec::{decode, encode, DecodedMessage, EMPTY_ADDRESS};
pub use error::{CoreError, Result};
pub use value::OscArg;
