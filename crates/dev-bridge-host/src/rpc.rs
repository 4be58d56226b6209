//! Module fetch transport realizations.
//!
//! [`HttpModuleTransport`] is the direct-RPC variant: the runtime POSTs the
//! serialized argument tuple to the dev server's fixed control path.
//! [`BindingModuleTransport`] is the intermediary variant for runtimes that
//! cannot make outbound calls themselves: the host-injected service binding
//! performs the round trip on their behalf. The owner-side handler is the
//! same for both.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use dev_bridge_common::{protocol, BridgeError, TransformedModule};
use dev_bridge_core::ModuleTransport;

use crate::bindings::ModuleFetchBinding;

/// Serialize the `[id, importer]` argument tuple.
fn encode_args(id: &str, importer: Option<&str>) -> Vec<u8> {
    serde_json::json!([id, importer]).to_string().into_bytes()
}

/// Direct-RPC module transport over HTTP.
pub struct HttpModuleTransport {
    client: Client,
    rpc_url: String,
}

impl HttpModuleTransport {
    /// Create a transport against a dev server base URL
    /// (e.g. `http://127.0.0.1:5173`).
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("dev-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rpc_url: format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                protocol::MODULE_RPC_PATH
            ),
        }
    }

    /// Create with a custom HTTP client.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            rpc_url: format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                protocol::MODULE_RPC_PATH
            ),
        }
    }
}

#[async_trait]
impl ModuleTransport for HttpModuleTransport {
    async fn fetch_module(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> Result<TransformedModule, BridgeError> {
        debug!(module_id = %id, "fetching module over direct RPC");
        let response = self
            .client
            .post(&self.rpc_url)
            .header(protocol::RPC_TYPE_HEADER, protocol::RPC_TYPE_FETCH_MODULE)
            .body(encode_args(id, importer))
            .send()
            .await
            .map_err(|e| BridgeError::transport(format!("module RPC failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BridgeError::module_not_found(id));
        }
        if !status.is_success() {
            return Err(BridgeError::transport(format!(
                "module RPC returned status {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::transport(format!("module RPC body: {e}")))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Intermediary-RPC module transport over a host-injected binding.
pub struct BindingModuleTransport {
    binding: Arc<dyn ModuleFetchBinding>,
}

impl BindingModuleTransport {
    /// Wrap the injected service binding.
    pub fn new(binding: Arc<dyn ModuleFetchBinding>) -> Self {
        Self { binding }
    }
}

#[async_trait]
impl ModuleTransport for BindingModuleTransport {
    async fn fetch_module(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> Result<TransformedModule, BridgeError> {
        debug!(module_id = %id, "fetching module through service binding");
        let response = self.binding.dispatch(&encode_args(id, importer)).await;

        // a non-success status from the intermediary means the graph could
        // not resolve or evaluate the module
        if !response.is_success() {
            return Err(BridgeError::module_not_found(id));
        }
        Ok(serde_json::from_slice(&response.body)?)
    }
}
