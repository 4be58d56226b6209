//! Isolate lifecycle controller.
//!
//! The controller owns one isolate instance end to end: creation with its
//! static bindings, the bootstrap that establishes the hot channel, the
//! one-time entrypoint handshake, environment overlay merges, and request
//! proxying. The sequence is enforced by the API surface; a proxied
//! request cannot reach the isolate before the handshake has succeeded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use dev_bridge_common::{protocol, BridgeError, EnvMap, HotPayload};
use dev_bridge_core::{AppRequest, AppResponse};
use dev_bridge_host::{BindingResponse, Isolate, IsolateBindings, ModuleFetchBinding};

use crate::channel::{AttachedHotChannel, HotChannel};
use crate::graph::ModuleGraph;

/// Module-fetch service binding backed by the dev server's module graph.
///
/// Injected into an isolate so its runner can fetch modules without any
/// outbound network path of its own.
pub struct GraphBinding {
    graph: Arc<dyn ModuleGraph>,
}

impl GraphBinding {
    /// Bind the graph.
    pub fn new(graph: Arc<dyn ModuleGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl ModuleFetchBinding for GraphBinding {
    async fn dispatch(&self, body: &[u8]) -> BindingResponse {
        let Ok((id, importer)) = serde_json::from_slice::<(String, Option<String>)>(body) else {
            return BindingResponse::error(400, "malformed fetch-module arguments");
        };

        match self.graph.fetch_module(&id, importer.as_deref()).await {
            Ok(module) => match serde_json::to_vec(&module) {
                Ok(body) => BindingResponse::ok(body),
                Err(e) => BindingResponse::error(500, &e.to_string()),
            },
            Err(e) if e.is_not_found() => BindingResponse::error(404, &e.to_string()),
            Err(e) => {
                error!(module_id = %id, error = %e, "module fetch failed");
                BindingResponse::error(500, &e.to_string())
            }
        }
    }
}

/// Per-isolate-instance entrypoint handshake state. The single legal
/// transition is `Unset` → `Set`; only recreating the isolate resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntrypointGate {
    Unset,
    Set,
}

/// Controller for one isolate instance.
///
/// Dropped and rebuilt on dev-server restart; a new instance starts with
/// the gate unset and must redo the bootstrap and handshake.
pub struct IsolateController {
    isolate: Arc<Isolate>,
    entrypoint: String,
    hot_reload: bool,
    gate: tokio::sync::Mutex<EntrypointGate>,
    channel: Arc<AttachedHotChannel>,
    handshakes: AtomicU64,
}

impl IsolateController {
    /// Create the isolate from its static bindings.
    pub fn new(bindings: IsolateBindings, entrypoint: impl Into<String>) -> Self {
        Self {
            isolate: Isolate::new(bindings),
            entrypoint: entrypoint.into(),
            hot_reload: true,
            gate: tokio::sync::Mutex::new(EntrypointGate::Unset),
            channel: Arc::new(AttachedHotChannel::new()),
            handshakes: AtomicU64::new(0),
        }
    }

    /// Disable the hot channel bootstrap; the isolate still serves
    /// requests.
    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    /// The hot channel toward this isolate. Sends are silently lost until
    /// [`bootstrap`](Self::bootstrap) establishes the socket.
    pub fn hot_channel(&self) -> Arc<AttachedHotChannel> {
        self.channel.clone()
    }

    /// Returns `true` once the bootstrap produced an upgraded socket.
    pub fn hot_enabled(&self) -> bool {
        self.channel.connected()
    }

    /// Establish the hot channel socket.
    ///
    /// A bootstrap response without an upgraded socket degrades the
    /// instance to no hot reload; it is logged as a warning, never fatal.
    pub async fn bootstrap(&self) -> Result<(), BridgeError> {
        let mut req = AppRequest::new("GET", protocol::INIT_MODULE_RUNNER_PATH);
        if self.hot_reload {
            req = req.with_header("upgrade", "websocket");
        }

        let resp = self.isolate.dispatch_fetch(req).await;
        match resp.socket {
            Some(socket) => {
                self.channel.set_socket(socket);
                self.channel.listen().await?;
                debug!("isolate hot channel established");
            }
            None => {
                warn!(
                    status = resp.status,
                    "isolate bootstrap returned no socket; hot reload disabled"
                );
            }
        }
        Ok(())
    }

    /// Perform the one-time entrypoint handshake. Idempotent per isolate
    /// instance: once it has succeeded it is never re-sent.
    ///
    /// # Errors
    ///
    /// Returns `Handshake` when the isolate rejects the entrypoint; the
    /// gate stays unset so a later call retries.
    pub async fn ensure_entrypoint(&self) -> Result<(), BridgeError> {
        let mut gate = self.gate.lock().await;
        if *gate == EntrypointGate::Set {
            return Ok(());
        }

        self.handshakes.fetch_add(1, Ordering::SeqCst);
        let req = AppRequest::new("POST", protocol::SET_ENTRYPOINT_PATH)
            .with_header(protocol::ENTRYPOINT_HEADER, &self.entrypoint);
        let resp = self.isolate.dispatch_fetch(req).await;
        if !resp.is_success() {
            return Err(BridgeError::handshake(format!(
                "set-entrypoint for \"{}\" returned status {}",
                self.entrypoint, resp.status
            )));
        }

        info!(entrypoint = %self.entrypoint, "entrypoint set");
        *gate = EntrypointGate::Set;
        Ok(())
    }

    /// Proxy one external request into the isolate.
    ///
    /// Completes the entrypoint handshake first when it has not happened
    /// yet; the request body passes through with `accept-encoding`
    /// normalized to `identity` so the response stays decodable by the
    /// intermediary proxy layer.
    #[instrument(skip(self, req), fields(method = %req.method, path = %req.path))]
    pub async fn proxy(&self, mut req: AppRequest) -> Result<AppResponse, BridgeError> {
        self.ensure_entrypoint().await?;

        req.set_header("accept-encoding", "identity");
        let resp = self.isolate.dispatch_fetch(req).await;
        Ok(AppResponse {
            status: resp.status,
            headers: resp.headers,
            body: resp.body,
        })
    }

    /// Shallow-merge environment values into the isolate overlay.
    ///
    /// # Errors
    ///
    /// Returns `Handshake` when the isolate rejects the overlay.
    pub async fn set_envs(&self, overlay: &EnvMap) -> Result<(), BridgeError> {
        let body = serde_json::to_vec(overlay)?;
        let req = AppRequest::new("POST", protocol::SET_ENVS_PATH).with_body(body);
        let resp = self.isolate.dispatch_fetch(req).await;
        if !resp.is_success() {
            return Err(BridgeError::handshake(format!(
                "set-envs returned status {}",
                resp.status
            )));
        }
        Ok(())
    }

    /// Push a full reload into the isolate.
    pub fn send_full_reload(&self) {
        self.channel.send(&HotPayload::FullReload);
    }

    /// Tear the instance down, cancelling pending hot-channel work
    /// quietly.
    pub async fn close(&self) {
        self.channel.close().await;
        debug!("isolate controller closed");
    }

    #[cfg(test)]
    fn handshake_count(&self) -> u64 {
        self.handshakes.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for IsolateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolateController")
            .field("entrypoint", &self.entrypoint)
            .field("hot_enabled", &self.hot_enabled())
            .finish_non_exhaustive()
    }
}
