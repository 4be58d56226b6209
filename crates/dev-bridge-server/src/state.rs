//! Shared application state.
//!
//! [`DevState`] holds the resources every HTTP request handler needs:
//! the module graph, the attached isolate controller, the environment
//! registry, and the cross-build barrier.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use dev_bridge_common::{BridgeConfig, BridgeError};

use crate::barrier::FilenameBarrier;
use crate::controller::IsolateController;
use crate::environment::EnvironmentRegistry;
use crate::graph::ModuleGraph;

/// Shared state across all request handlers.
///
/// This struct is cloned for each request, so it uses `Arc` for shared data.
#[derive(Clone)]
pub struct DevState {
    inner: Arc<StateInner>,
}

struct StateInner {
    /// Project root, embedded in the dev entry script.
    root: String,

    /// Port the hot channel acceptor listens on.
    hmr_port: u16,

    /// Service worker entrypoint id, embedded in the dev entry script.
    entrypoint: Option<String>,

    /// Runner bootstrap code appended to the dev entry script.
    runner_bootstrap: String,

    /// The module graph behind the fetch-module RPC.
    graph: Arc<dyn ModuleGraph>,

    /// Controller of the isolate proxied requests land in, once attached.
    controller: Mutex<Option<Arc<IsolateController>>>,

    /// Registered execution environments.
    environments: EnvironmentRegistry,

    /// Cross-build filename barrier.
    barrier: Arc<FilenameBarrier>,

    /// Signalled when the configuration file changed on disk.
    restart: Notify,
}

impl DevState {
    /// Create state from a configuration and a module graph.
    ///
    /// # Errors
    ///
    /// Returns an error when a declared entrypoint cannot be resolved to
    /// a single module id.
    pub fn new(config: &BridgeConfig, graph: Arc<dyn ModuleGraph>) -> Result<Self, BridgeError> {
        let entrypoint = config
            .entry
            .service_worker
            .as_ref()
            .map(|input| input.resolve().map(str::to_string))
            .transpose()?;

        Ok(Self {
            inner: Arc::new(StateInner {
                root: config.root.clone(),
                hmr_port: config.server.hmr_port,
                entrypoint,
                runner_bootstrap: String::new(),
                graph,
                controller: Mutex::new(None),
                environments: EnvironmentRegistry::new(),
                barrier: Arc::new(FilenameBarrier::new()),
                restart: Notify::new(),
            }),
        })
    }

    /// Replace the runner bootstrap code served by the dev entry script.
    ///
    /// Only meaningful before the first request; intended for startup
    /// wiring.
    pub fn with_runner_bootstrap(mut self, code: impl Into<String>) -> Self {
        // state is not shared yet at construction time
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.runner_bootstrap = code.into();
        }
        self
    }

    /// Project root path.
    pub fn root(&self) -> &str {
        &self.inner.root
    }

    /// Hot channel port embedded in the dev entry script.
    pub fn hmr_port(&self) -> u16 {
        self.inner.hmr_port
    }

    /// Service worker entrypoint, when configured.
    pub fn entrypoint(&self) -> Option<&str> {
        self.inner.entrypoint.as_deref()
    }

    /// Runner bootstrap code.
    pub fn runner_bootstrap(&self) -> &str {
        &self.inner.runner_bootstrap
    }

    /// The module graph.
    pub fn graph(&self) -> &Arc<dyn ModuleGraph> {
        &self.inner.graph
    }

    /// Attach the controller proxied requests are forwarded to.
    pub fn set_controller(&self, controller: Arc<IsolateController>) {
        *self.inner.controller.lock() = Some(controller);
    }

    /// The attached controller, if any.
    pub fn controller(&self) -> Option<Arc<IsolateController>> {
        self.inner.controller.lock().clone()
    }

    /// Registered execution environments.
    pub fn environments(&self) -> &EnvironmentRegistry {
        &self.inner.environments
    }

    /// Cross-build filename barrier.
    pub fn barrier(&self) -> &Arc<FilenameBarrier> {
        &self.inner.barrier
    }

    /// Request a wholesale dev-server restart.
    pub fn request_restart(&self) {
        self.inner.restart.notify_waiters();
    }

    /// Resolves when a restart has been requested.
    pub async fn restart_requested(&self) {
        self.inner.restart.notified().await;
    }
}

impl std::fmt::Debug for DevState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevState")
            .field("root", &self.inner.root)
            .field("entrypoint", &self.inner.entrypoint)
            .field("has_controller", &self.controller().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use dev_bridge_common::config::EntryInput;

    use crate::graph::MemoryModuleGraph;

    fn state_with(config: &BridgeConfig) -> Result<DevState, BridgeError> {
        DevState::new(config, Arc::new(MemoryModuleGraph::new()))
    }

    #[test]
    fn test_entrypoint_resolved_from_config() {
        let mut config = BridgeConfig::default();
        config.entry.service_worker = Some(EntryInput::Single("/sw/main.ts".into()));

        let state = state_with(&config).unwrap();
        assert_eq!(state.entrypoint(), Some("/sw/main.ts"));
    }

    #[test]
    fn test_ambiguous_entrypoint_is_an_error() {
        let mut config = BridgeConfig::default();
        config.entry.service_worker = Some(EntryInput::List(vec!["a".into(), "b".into()]));
        assert!(state_with(&config).is_err());
    }

    #[tokio::test]
    async fn test_restart_signal() {
        let state = state_with(&BridgeConfig::default()).unwrap();
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.restart_requested().await })
        };
        // let the waiter register before signalling
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        state.request_restart();
        waiter.await.unwrap();
    }
}
