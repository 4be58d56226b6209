//! HTTP server implementation.
//!
//! [`DevServer`] runs the control plane and proxy until shutdown, and is
//! rebuilt wholesale when a restart is requested (a configuration file
//! change). Hot channels attached to the server are activated before the
//! listener starts accepting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use dev_bridge_common::{BridgeError, ServerSection};

use crate::channel::HotChannel;
use crate::router::build_router;
use crate::state::DevState;
use crate::ws_channel::WsHotChannel;

/// Why a server run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// Shutdown signal received.
    Shutdown,
    /// A restart was requested; the caller should rebuild and run again.
    Restart,
}

/// The dev server.
pub struct DevServer {
    state: DevState,
    config: ServerSection,
    hot_channel: Option<Arc<WsHotChannel>>,
}

impl DevServer {
    /// Create a server over prepared state.
    pub fn new(state: DevState, config: ServerSection) -> Self {
        Self {
            state,
            config,
            hot_channel: None,
        }
    }

    /// Attach the persistent-socket hot channel; it starts accepting when
    /// the server runs.
    pub fn with_hot_channel(mut self, channel: Arc<WsHotChannel>) -> Self {
        self.hot_channel = Some(channel);
        self
    }

    /// The shared state.
    pub fn state(&self) -> &DevState {
        &self.state
    }

    /// Run the server until shutdown or a restart request.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the address.
    pub async fn run(self) -> Result<RunExit, BridgeError> {
        if let Some(channel) = &self.hot_channel {
            channel.listen().await?;
        }

        let app = build_router(
            self.state.clone(),
            Duration::from_secs(self.config.request_timeout_secs),
        );
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| BridgeError::invalid_config(format!("Failed to bind: {e}")))?;
        info!(addr = %self.config.bind_addr, "Starting dev server");

        let restarting = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let shutdown = {
            let state = self.state.clone();
            let restarting = restarting.clone();
            let graceful = self.config.graceful_shutdown;
            async move {
                tokio::select! {
                    () = state.restart_requested() => {
                        info!("Restart requested");
                        restarting.store(true, std::sync::atomic::Ordering::SeqCst);
                    }
                    () = shutdown_signal(), if graceful => {}
                }
            }
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| BridgeError::transport(format!("Server error: {e}")))?;

        if let Some(channel) = &self.hot_channel {
            channel.close().await;
        }
        if let Some(controller) = self.state.controller() {
            controller.close().await;
        }

        if restarting.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(RunExit::Restart)
        } else {
            info!("Server shutdown complete");
            Ok(RunExit::Shutdown)
        }
    }

    /// Start the server on an ephemeral port and return a handle for
    /// testing.
    pub async fn start_test(state: DevState) -> Result<TestHandle, BridgeError> {
        let app = build_router(state.clone(), Duration::from_secs(30));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| BridgeError::invalid_config(format!("Failed to bind: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| BridgeError::invalid_config(format!("Failed to get addr: {e}")))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(TestHandle {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }
}

/// Handle for a test server instance.
pub struct TestHandle {
    addr: SocketAddr,
    state: DevState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestHandle {
    /// The address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The shared state.
    pub fn state(&self) -> &DevState {
        &self.state
    }

    /// Shut the server down gracefully.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    use dev_bridge_common::BridgeConfig;

    use crate::graph::MemoryModuleGraph;

    fn test_state() -> DevState {
        DevState::new(
            &BridgeConfig::default(),
            Arc::new(MemoryModuleGraph::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_test_serves_health() {
        let handle = DevServer::start_test(test_state()).await.unwrap();

        let stream = tokio::net::TcpStream::connect(handle.addr()).await;
        assert!(stream.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_http_transport_round_trip() {
        use dev_bridge_common::TransformedModule;
        use dev_bridge_core::ModuleTransport;
        use dev_bridge_host::HttpModuleTransport;

        let graph = Arc::new(MemoryModuleGraph::new());
        graph.insert(
            TransformedModule::new("/main.ts", "export default 1")
                .with_dependencies(["/dep.ts".to_string()]),
        );
        let state = DevState::new(&BridgeConfig::default(), graph).unwrap();
        let handle = DevServer::start_test(state).await.unwrap();

        let transport = HttpModuleTransport::new(&handle.url());
        let module = transport
            .fetch_module("/main.ts", Some("/importer.ts"))
            .await
            .unwrap();
        assert_eq!(module.id, "/main.ts");
        assert_eq!(module.code, "export default 1");
        assert_eq!(module.dependencies, vec!["/dep.ts".to_string()]);

        let err = transport.fetch_module("/missing.ts", None).await.unwrap_err();
        assert!(err.is_not_found());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_request_ends_run() {
        let state = test_state();
        let mut config = ServerSection::default();
        config.bind_addr = "127.0.0.1:0".to_string();

        let server = DevServer::new(state.clone(), config);
        let run = tokio::spawn(server.run());

        // let the listener come up before requesting the restart
        tokio::time::sleep(Duration::from_millis(50)).await;
        state.request_restart();

        let exit = run.await.unwrap().unwrap();
        assert_eq!(exit, RunExit::Restart);
    }
}
