//! Dev-bridge CLI entry point.
//!
//! Runs the dev server control plane: the module-fetch RPC, the dev entry
//! script, the hot channel acceptor, and the isolate proxy. When the
//! configuration file changes on disk the server is restarted wholesale.
//!
//! The binary carries no code evaluator, so it never constructs an
//! isolate itself; proxied application requests answer 502 until an
//! embedding host builds an [`dev_bridge_server::IsolateController`] over
//! its runtime and attaches it with [`DevState::set_controller`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dev_bridge_common::BridgeConfig;
use dev_bridge_server::{
    Consumer, DevServer, DevState, DirModuleGraph, Environment, RunExit, WsHotChannel,
};

#[derive(Parser, Debug)]
#[command(name = "dev-bridge", version, about = "Remote module execution bridge dev server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "dev-bridge.toml")]
    config: PathBuf,

    /// Override the bind address from the configuration file.
    #[arg(short, long, env = "BIND_ADDR")]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dev_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting dev-bridge");

    loop {
        let mut config = load_config(&cli.config)?;
        if let Some(bind) = cli.bind {
            config.server.bind_addr = bind.to_string();
        }
        info!(
            bind_addr = %config.server.bind_addr,
            hmr_port = config.server.hmr_port,
            root = %config.root,
            "Configuration loaded"
        );

        let graph = Arc::new(DirModuleGraph::new(config.root.clone()));
        let state = DevState::new(&config, graph)?;

        state
            .environments()
            .register(Environment::new("client", Consumer::Client, true))?;
        state
            .environments()
            .register(Environment::new("service-worker", Consumer::Server, true))?;

        let hmr_addr: SocketAddr = format!("127.0.0.1:{}", config.server.hmr_port)
            .parse()
            .context("Invalid hot channel address")?;
        let hot_channel = Arc::new(WsHotChannel::new(hmr_addr));
        state
            .environments()
            .attach_channel("client", hot_channel.clone())?;

        info!("No isolate controller attached; the proxy answers 502 until an embedder attaches one");

        let watcher = spawn_config_watcher(cli.config.clone(), state.clone());

        let server = DevServer::new(state, config.server.clone()).with_hot_channel(hot_channel);
        let exit = server.run().await?;
        watcher.abort();

        match exit {
            RunExit::Restart => {
                info!("Configuration changed; restarting dev server");
            }
            RunExit::Shutdown => break,
        }
    }

    Ok(())
}

/// Load the configuration file, falling back to defaults when it does not
/// exist.
fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    if path.exists() {
        BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    } else {
        info!(path = %path.display(), "No configuration file found; using defaults");
        Ok(BridgeConfig::default())
    }
}

/// Poll the configuration file and request a restart when it changes.
fn spawn_config_watcher(path: PathBuf, state: DevState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = modified_at(&path).await;
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        interval.tick().await;
        loop {
            interval.tick().await;
            let current = modified_at(&path).await;
            if current != last {
                last = current;
                state.request_restart();
                return;
            }
        }
    })
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
