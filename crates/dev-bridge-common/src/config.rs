//! Configuration structures for the dev-bridge.
//!
//! This module defines the TOML configuration file structures:
//! - [`BridgeConfig`]: top-level configuration
//! - [`ServerSection`]: dev server and hot channel ports
//! - [`EntrySection`]: per-environment entrypoints
//!
//! When the configuration file changes on disk, the owning dev server is
//! restarted wholesale; there is no partial reconfiguration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Top-level configuration.
///
/// # Example
///
/// ```toml
/// root = "/srv/app"
///
/// [server]
/// bind_addr = "127.0.0.1:5173"
/// hmr_port = 5172
/// origin_port = 5170
///
/// [entry]
/// client = "src/client/main.ts"
/// edge_server = "src/edge-server/main.ts"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Project root path, injected into every remote runtime.
    #[serde(default = "defaults::root")]
    pub root: String,

    /// Dev server settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Per-environment entrypoints.
    #[serde(default)]
    pub entry: EntrySection,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            root: defaults::root(),
            server: ServerSection::default(),
            entry: EntrySection::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, BridgeError> {
        toml::from_str(content).map_err(|e| BridgeError::invalid_config(e.to_string()))
    }
}

/// Dev server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    /// Bind address for the dev server (control plane + proxy).
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,

    /// Port for the persistent-socket hot channel acceptor.
    #[serde(default = "defaults::hmr_port")]
    pub hmr_port: u16,

    /// Port the origin server listens on; exposed to the isolate as
    /// `UPSTREAM_PORT`.
    #[serde(default = "defaults::origin_port")]
    pub origin_port: u16,

    /// Request timeout in seconds for proxied requests.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown on SIGTERM/SIGINT.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            hmr_port: defaults::hmr_port(),
            origin_port: defaults::origin_port(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
        }
    }
}

/// Per-environment entrypoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntrySection {
    /// Browser client entrypoint.
    pub client: Option<EntryInput>,
    /// Service worker entrypoint.
    pub service_worker: Option<EntryInput>,
    /// Edge server entrypoint.
    pub edge_server: Option<EntryInput>,
    /// Origin server entrypoint.
    pub origin_server: Option<EntryInput>,
}

/// An entrypoint declaration.
///
/// Accepts the same shapes a bundler input does: a plain string, a
/// one-element list, or a one-entry named map. Anything else cannot be
/// resolved to a single entrypoint and is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntryInput {
    /// A single module id.
    Single(String),
    /// A list of module ids; must contain exactly one.
    List(Vec<String>),
    /// A named map of module ids; must contain exactly one entry.
    Map(BTreeMap<String, String>),
}

impl EntryInput {
    /// Resolve to the single entrypoint id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the declaration is empty or ambiguous.
    pub fn resolve(&self) -> Result<&str, BridgeError> {
        match self {
            Self::Single(id) => Ok(id),
            Self::List(ids) => match ids.as_slice() {
                [id] => Ok(id),
                [] => Err(BridgeError::invalid_config(
                    "could not determine entrypoint: list is empty",
                )),
                _ => Err(BridgeError::invalid_config(
                    "could not determine entrypoint: list has multiple entries",
                )),
            },
            Self::Map(entries) => {
                if entries.len() == 1 {
                    Ok(entries.values().next().map(String::as_str).unwrap_or(""))
                } else {
                    Err(BridgeError::invalid_config(
                        "could not determine entrypoint: map must have exactly one entry",
                    ))
                }
            }
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub fn root() -> String {
        ".".to_string()
    }

    pub fn bind_addr() -> String {
        "127.0.0.1:5173".to_string()
    }

    pub const fn hmr_port() -> u16 {
        5172
    }

    pub const fn origin_port() -> u16 {
        5170
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }
}
