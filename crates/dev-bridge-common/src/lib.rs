//! Common types, errors, and configuration for dev-bridge.
//!
//! This crate provides shared functionality used across the dev-bridge workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for the dev server
//! - Hot-update payload and transformed-module wire types
//! - The fixed control-plane protocol constants

pub mod config;
pub mod error;
pub mod payload;
pub mod protocol;

pub use config::{BridgeConfig, EntryInput, EntrySection, ServerSection};
pub use error::BridgeError;
pub use payload::{EnvMap, HotPayload, TransformedModule};
