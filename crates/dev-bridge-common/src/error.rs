//! Error types for the dev-bridge.
//!
//! This module defines the bridge-wide error hierarchy using `thiserror`.
//! The taxonomy mirrors how failures are handled at runtime:
//! - transport errors degrade hot-reload but never kill the dev session
//! - evaluation errors leave the previous handler serving
//! - handshake errors surface to the controller's caller for that call site

use std::io;

use thiserror::Error;

/// Top-level bridge errors.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A socket or RPC round trip failed.
    ///
    /// The affected channel is considered disconnected; hot-reload is
    /// degraded but the session keeps serving.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of the transport failure.
        reason: String,
    },

    /// Module code threw while being evaluated in the remote runtime.
    #[error("Evaluation of '{module_id}' failed: {reason}")]
    Evaluation {
        /// The module that was being evaluated.
        module_id: String,
        /// Description of the evaluation failure.
        reason: String,
    },

    /// A bootstrap or set-entrypoint call did not complete.
    #[error("Handshake failed: {reason}")]
    Handshake {
        /// Description of the handshake failure.
        reason: String,
    },

    /// The module graph could not resolve the requested id.
    #[error("Module not found: {module_id}")]
    ModuleNotFound {
        /// The identifier of the module that was not found.
        module_id: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A wire payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Create a new `Transport` error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a new `Evaluation` error.
    pub fn evaluation(module_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            module_id: module_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Handshake` error.
    pub fn handshake(reason: impl Into<String>) -> Self {
        Self::Handshake {
            reason: reason.into(),
        }
    }

    /// Create a new `ModuleNotFound` error.
    pub fn module_not_found(module_id: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module_id: module_id.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates the module was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound { .. })
    }

    /// Returns `true` if the dev session can keep serving its last-good
    /// state after this error.
    ///
    /// Transport and evaluation failures are logged and degraded, never
    /// fatal. Handshake and configuration failures surface to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Evaluation { .. } | Self::ModuleNotFound { .. }
        )
    }
}
