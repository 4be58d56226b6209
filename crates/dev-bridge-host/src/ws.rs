//! WebSocket client hot connection.
//!
//! Runners that live out of process (a native stand-in for the
//! service-worker host) connect back to the dev server's hot channel
//! acceptor with this connection. Frames are one JSON document per
//! message; malformed frames are dropped without closing the connection.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use dev_bridge_common::{BridgeError, HotPayload};
use dev_bridge_core::HotConnection;

/// A hot-update connection over a client WebSocket.
pub struct WsHotConnection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<HotPayload>>,
}

impl WsHotConnection {
    /// Connect to a hot channel acceptor, e.g. `ws://127.0.0.1:5172`.
    ///
    /// # Errors
    ///
    /// Returns `Transport` when the WebSocket handshake fails.
    pub async fn connect(url: &str) -> Result<Self, BridgeError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| BridgeError::transport(format!("hot channel connect failed: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    debug!("hot channel writer closed");
                    return;
                }
            }
        });

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let Ok(Message::Text(frame)) = message else {
                    continue;
                };
                match HotPayload::decode(frame.as_ref()) {
                    Ok(payload) => {
                        if inbound_tx.send(payload).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping malformed hot frame"),
                }
            }
            debug!("hot channel reader closed");
        });

        Ok(Self {
            outbound,
            inbound: tokio::sync::Mutex::new(inbound),
        })
    }
}

#[async_trait]
impl HotConnection for WsHotConnection {
    async fn recv(&self) -> Option<HotPayload> {
        self.inbound.lock().await.recv().await
    }

    fn send(&self, payload: &HotPayload) {
        // best-effort: lost once the writer task is gone
        let _ = self.outbound.send(payload.encode());
    }
}

impl std::fmt::Debug for WsHotConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsHotConnection").finish_non_exhaustive()
    }
}
