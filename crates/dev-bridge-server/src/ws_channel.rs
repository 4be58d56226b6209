//! Persistent-socket hot channel.
//!
//! The owner runs a WebSocket acceptor; every accepted connection is an
//! independent peer with its own listener registry seeded from a baseline.
//! Channel-level `on`/`off` mutate the baseline and every current peer, so
//! registration behaves globally while dispatch stays peer-scoped.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dev_bridge_common::{BridgeError, HotPayload};

use crate::channel::{HotChannel, HotListener, ListenerRegistry};

struct Peer {
    outbound: mpsc::UnboundedSender<String>,
    registry: Arc<Mutex<ListenerRegistry>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Hot channel bound to a TCP acceptor speaking WebSocket frames.
pub struct WsHotChannel {
    bind_addr: SocketAddr,
    local_addr: Mutex<Option<SocketAddr>>,
    baseline: Arc<Mutex<ListenerRegistry>>,
    peers: Arc<DashMap<Uuid, Peer>>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl WsHotChannel {
    /// Create a channel that will accept on `bind_addr` once listening.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            local_addr: Mutex::new(None),
            baseline: Arc::new(Mutex::new(ListenerRegistry::new())),
            peers: Arc::new(DashMap::new()),
            acceptor: Mutex::new(None),
        }
    }

    /// The bound address, available after `listen` (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    async fn accept_loop(listener: TcpListener, peers: Arc<DashMap<Uuid, Peer>>, baseline: Arc<Mutex<ListenerRegistry>>) {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "hot channel accept failed");
                    continue;
                }
            };
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(%remote, error = %e, "hot channel handshake failed");
                    continue;
                }
            };
            debug!(%remote, "hot channel peer connected");

            let id = Uuid::new_v4();
            let (mut sink, mut stream) = ws.split();
            let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
            // each peer gets its own registry, seeded from the baseline
            let registry = Arc::new(Mutex::new(baseline.lock().clone()));

            let writer = tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
            });

            let peer_registry = registry.clone();
            let reader_peers = peers.clone();
            let reader = tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    let Ok(Message::Text(frame)) = message else {
                        continue;
                    };
                    match HotPayload::decode(frame.as_ref()) {
                        Ok(HotPayload::Custom { event, data }) => {
                            let listeners = peer_registry.lock().listeners_for(&event);
                            for listener in &listeners {
                                listener(&data);
                            }
                        }
                        Ok(other) => {
                            debug!(payload = ?other, "ignoring non-custom inbound payload");
                        }
                        Err(e) => warn!(error = %e, "dropping malformed hot frame"),
                    }
                }
                debug!(peer = %id, "hot channel peer disconnected");
                reader_peers.remove(&id);
            });

            peers.insert(
                id,
                Peer {
                    outbound,
                    registry,
                    reader,
                    writer,
                },
            );
        }
    }
}

#[async_trait]
impl HotChannel for WsHotChannel {
    fn send(&self, payload: &HotPayload) {
        let frame = payload.encode();
        for peer in self.peers.iter() {
            let _ = peer.outbound.send(frame.clone());
        }
    }

    fn on(&self, event: &str, listener: &HotListener) {
        self.baseline.lock().add(event, listener);
        for peer in self.peers.iter() {
            peer.registry.lock().add(event, listener);
        }
    }

    fn off(&self, event: &str, listener: &HotListener) {
        self.baseline.lock().remove(event, listener);
        for peer in self.peers.iter() {
            peer.registry.lock().remove(event, listener);
        }
    }

    async fn listen(&self) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(local_addr);
        info!(addr = %local_addr, "hot channel listening");

        let peers = self.peers.clone();
        let baseline = self.baseline.clone();
        let acceptor = tokio::spawn(Self::accept_loop(listener, peers, baseline));
        if let Some(previous) = self.acceptor.lock().replace(acceptor) {
            previous.abort();
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(acceptor) = self.acceptor.lock().take() {
            acceptor.abort();
        }
        self.peers.retain(|_, peer| {
            peer.reader.abort();
            peer.writer.abort();
            false
        });
        *self.local_addr.lock() = None;
    }
}

impl std::fmt::Debug for WsHotChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsHotChannel")
            .field("bind_addr", &self.bind_addr)
            .field("peers", &self.peers.len())
            .finish_non_exhaustive()
    }
}
