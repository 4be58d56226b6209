//! Named-event hot channels.
//!
//! A hot channel pushes update notifications from the module graph owner
//! into a remote runtime and fans inbound custom events out to listeners.
//! Two realizations share the [`HotChannel`] contract:
//!
//! - [`crate::WsHotChannel`]: a WebSocket acceptor, one peer per accepted
//!   connection
//! - [`AttachedHotChannel`]: a single already-accepted socket end handed
//!   over out of band by the isolate bootstrap
//!
//! Listener registration has set semantics keyed by `Arc` identity, and
//! each peer dispatches only to its own registry so listener state never
//! leaks across connections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use dev_bridge_common::{BridgeError, HotPayload};
use dev_bridge_host::SocketEnd;

/// A callback invoked with the `data` of a matching custom event.
pub type HotListener = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Event-name → listener set, with `Arc` identity deciding membership.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<HotListener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Registering the same `Arc` twice is a no-op.
    pub fn add(&mut self, event: &str, listener: &HotListener) {
        let entry = self.listeners.entry(event.to_string()).or_default();
        if !entry.iter().any(|l| Arc::ptr_eq(l, listener)) {
            entry.push(listener.clone());
        }
    }

    /// Unregister a listener by `Arc` identity.
    pub fn remove(&mut self, event: &str, listener: &HotListener) {
        if let Some(entry) = self.listeners.get_mut(event) {
            entry.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    /// Snapshot the listeners registered for `event`.
    ///
    /// Callbacks must be invoked on the snapshot with the registry lock
    /// released; a listener may re-enter `on`/`off` on the same channel.
    pub fn listeners_for(&self, event: &str) -> Vec<HotListener> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    /// Number of listeners registered for `event`.
    pub fn len(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Bidirectional named-event pub/sub toward remote runtimes.
///
/// `send` before `listen` (or before any peer connects) is a silent
/// no-op; the dev loop is best-effort. `close` must be safe to call on a
/// channel that was never opened.
#[async_trait]
pub trait HotChannel: Send + Sync {
    /// Push a payload to every connected peer.
    fn send(&self, payload: &HotPayload);

    /// Register a listener for a named custom event.
    fn on(&self, event: &str, listener: &HotListener);

    /// Unregister a listener. Subsequent deliveries are guaranteed to
    /// skip it; a message already mid-dispatch may still land.
    fn off(&self, event: &str, listener: &HotListener);

    /// Activate the channel: bind the acceptor, or mark an
    /// already-accepted connection live.
    async fn listen(&self) -> Result<(), BridgeError>;

    /// Disconnect all peers and release the underlying connection.
    async fn close(&self);
}

/// Hot channel over a single socket end handed over by the isolate
/// bootstrap upgrade. There is no acceptor loop; `listen` attaches a
/// reader to the socket installed with [`AttachedHotChannel::set_socket`].
pub struct AttachedHotChannel {
    registry: Arc<Mutex<ListenerRegistry>>,
    socket: Mutex<Option<Arc<SocketEnd>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl AttachedHotChannel {
    /// Create a channel with no socket attached yet.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(ListenerRegistry::new())),
            socket: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Install the accepted socket end. Replaces any previous one.
    pub fn set_socket(&self, socket: SocketEnd) {
        *self.socket.lock() = Some(Arc::new(socket));
    }

    /// Returns `true` once a socket end has been installed.
    pub fn connected(&self) -> bool {
        self.socket.lock().is_some()
    }
}

impl Default for AttachedHotChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HotChannel for AttachedHotChannel {
    fn send(&self, payload: &HotPayload) {
        // no socket yet: the payload is lost, by contract
        if let Some(socket) = self.socket.lock().as_ref() {
            socket.send_frame(payload.encode());
        }
    }

    fn on(&self, event: &str, listener: &HotListener) {
        self.registry.lock().add(event, listener);
    }

    fn off(&self, event: &str, listener: &HotListener) {
        self.registry.lock().remove(event, listener);
    }

    async fn listen(&self) -> Result<(), BridgeError> {
        let Some(socket) = self.socket.lock().clone() else {
            return Err(BridgeError::transport(
                "cannot listen before a socket end is attached",
            ));
        };

        let registry = self.registry.clone();
        let reader = tokio::spawn(async move {
            loop {
                let Some(frame) = socket.recv_frame().await else {
                    debug!("hot channel peer disconnected");
                    return;
                };
                match HotPayload::decode(&frame) {
                    Ok(HotPayload::Custom { event, data }) => {
                        let listeners = registry.lock().listeners_for(&event);
                        for listener in &listeners {
                            listener(&data);
                        }
                    }
                    Ok(other) => debug!(payload = ?other, "ignoring non-custom inbound payload"),
                    Err(e) => warn!(error = %e, "dropping malformed hot frame"),
                }
            }
        });

        if let Some(previous) = self.reader.lock().replace(reader) {
            previous.abort();
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        *self.socket.lock() = None;
    }
}

impl std::fmt::Debug for AttachedHotChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedHotChannel")
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}
