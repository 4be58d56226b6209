//! In-process socket pair.
//!
//! The isolate and its controller live in the same process but share no
//! state; the bootstrap upgrade hands the controller one end of a paired
//! socket, the isolate keeps the other. Frames are one JSON text document
//! per message and are delivered in send order.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use dev_bridge_common::HotPayload;
use dev_bridge_core::HotConnection;

/// One end of an in-process socket pair.
pub struct SocketEnd {
    tx: mpsc::UnboundedSender<String>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

/// Create a connected pair of socket ends.
pub fn socket_pair() -> (SocketEnd, SocketEnd) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        SocketEnd {
            tx: a_tx,
            rx: tokio::sync::Mutex::new(a_rx),
        },
        SocketEnd {
            tx: b_tx,
            rx: tokio::sync::Mutex::new(b_rx),
        },
    )
}

impl SocketEnd {
    /// Send one text frame. Returns `false` once the peer end is gone.
    pub fn send_frame(&self, frame: String) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Receive the next text frame, or `None` once the peer end is gone.
    pub async fn recv_frame(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

impl std::fmt::Debug for SocketEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketEnd").finish_non_exhaustive()
    }
}

#[async_trait]
impl HotConnection for SocketEnd {
    async fn recv(&self) -> Option<HotPayload> {
        loop {
            let frame = self.recv_frame().await?;
            match HotPayload::decode(&frame) {
                Ok(payload) => return Some(payload),
                // malformed frames are dropped, the connection survives
                Err(e) => warn!(error = %e, "dropping malformed hot frame"),
            }
        }
    }

    fn send(&self, payload: &HotPayload) {
        let _ = self.send_frame(payload.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_in_order() {
        let (a, b) = socket_pair();
        assert!(a.send_frame("one".into()));
        assert!(a.send_frame("two".into()));

        assert_eq!(b.recv_frame().await.as_deref(), Some("one"));
        assert_eq!(b.recv_frame().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_both_directions() {
        let (a, b) = socket_pair();
        a.send_frame("ping".into());
        b.send_frame("pong".into());
        assert_eq!(b.recv_frame().await.as_deref(), Some("ping"));
        assert_eq!(a.recv_frame().await.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_recv_none_after_peer_dropped() {
        let (a, b) = socket_pair();
        drop(a);
        assert!(b.recv_frame().await.is_none());
        assert!(!b.send_frame("lost".into()));
    }

    #[tokio::test]
    async fn test_hot_connection_skips_malformed_frames() {
        let (a, b) = socket_pair();
        a.send_frame("{not json".into());
        a.send_frame(HotPayload::FullReload.encode());

        assert_eq!(b.recv().await, Some(HotPayload::FullReload));
    }
}
