//! Module fetch transport seam.
//!
//! A remote runtime asks "give me the compiled code for module X" through
//! this trait. Two realizations live in `dev-bridge-host`: a direct HTTP
//! RPC to the dev server's fixed control path, and an intermediary binding
//! injected into a sandboxed isolate by its host.
//!
//! The transport gives no response-ordering guarantee relative to request
//! order; callers must not assume request N resolves before request N+1.

use async_trait::async_trait;

use dev_bridge_common::{BridgeError, TransformedModule};

/// Request/response channel to the module graph owner.
#[async_trait]
pub trait ModuleTransport: Send + Sync {
    /// Fetch the compiled source for `id`, resolved relative to `importer`.
    ///
    /// # Errors
    ///
    /// `ModuleNotFound` when the graph cannot resolve the id, `Transport`
    /// when the round trip itself fails.
    async fn fetch_module(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> Result<TransformedModule, BridgeError>;
}
