//! Entrypoint handler lifecycle.
//!
//! [`HandlerSlot`] holds the current request handler and its lifecycle
//! state; [`RunnerHarness`] wires a [`ModuleRunner`] and a hot-update
//! connection to it. Requests keep being served by the previous handler
//! while a re-import is in flight, and a failed re-import never tears the
//! handler down.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use dev_bridge_common::{BridgeError, HotPayload};

use crate::handler::RequestHandler;
use crate::runner::ModuleRunner;

/// Lifecycle state of the handler slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No handler yet; arriving requests are dropped until the first
    /// resolution lands.
    Uninitialized,
    /// A handler is installed and serving.
    Ready,
    /// A full-reload arrived and a re-import is in flight; the old handler
    /// still serves.
    Revalidating,
}

struct SlotInner {
    state: SlotState,
    handler: Option<Arc<dyn RequestHandler>>,
    /// Epoch of the newest `set_handler` invocation issued.
    issued: u64,
}

/// The current request handler plus its lifecycle state machine.
///
/// Stale resolutions are sequence-gated: an invocation's result installs
/// only if no newer invocation has been issued since, so whichever
/// invocation was issued last wins regardless of completion order.
pub struct HandlerSlot {
    inner: Mutex<SlotInner>,
}

impl HandlerSlot {
    /// Create an empty, uninitialized slot.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                state: SlotState::Uninitialized,
                handler: None,
                issued: 0,
            }),
        }
    }

    /// The handler currently serving, if any.
    pub fn current(&self) -> Option<Arc<dyn RequestHandler>> {
        self.inner.lock().handler.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SlotState {
        self.inner.lock().state
    }

    /// Issue a new resolution epoch, transitioning Ready → Revalidating.
    pub(crate) fn begin(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.issued += 1;
        if inner.state == SlotState::Ready {
            inner.state = SlotState::Revalidating;
        }
        inner.issued
    }

    /// Install a resolved handler; a no-op when a newer epoch was issued.
    ///
    /// Returns `true` if the handler was installed.
    pub(crate) fn install(&self, epoch: u64, handler: Arc<dyn RequestHandler>) -> bool {
        let mut inner = self.inner.lock();
        if epoch != inner.issued {
            // stale resolution; the newer in-flight invocation wins
            return false;
        }
        inner.handler = Some(handler);
        inner.state = SlotState::Ready;
        true
    }

    /// Record a failed resolution; the prior handler and state survive.
    pub(crate) fn fail(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if epoch != inner.issued {
            return;
        }
        inner.state = if inner.handler.is_some() {
            SlotState::Ready
        } else {
            SlotState::Uninitialized
        };
    }
}

impl Default for HandlerSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound hot-update connection as seen by a remote runtime.
///
/// Realizations: the in-process socket end handed over by the isolate
/// bootstrap, and a WebSocket client connection (`dev-bridge-host`).
#[async_trait]
pub trait HotConnection: Send + Sync {
    /// Receive the next payload, or `None` once disconnected.
    async fn recv(&self) -> Option<HotPayload>;

    /// Best-effort send back to the owner; lost when disconnected.
    fn send(&self, payload: &HotPayload);
}

/// Drives the entrypoint handler from hot updates.
pub struct RunnerHarness {
    runner: Arc<ModuleRunner>,
    entrypoint: String,
    slot: Arc<HandlerSlot>,
}

impl RunnerHarness {
    /// Create a harness re-importing `entrypoint` through `runner`.
    pub fn new(runner: Arc<ModuleRunner>, entrypoint: impl Into<String>) -> Self {
        Self {
            runner,
            entrypoint: entrypoint.into(),
            slot: Arc::new(HandlerSlot::new()),
        }
    }

    /// The slot serving requests.
    pub fn slot(&self) -> Arc<HandlerSlot> {
        self.slot.clone()
    }

    /// The handler currently serving, if any.
    pub fn handler(&self) -> Option<Arc<dyn RequestHandler>> {
        self.slot.current()
    }

    /// Import the entrypoint and swap its default export in as the new
    /// handler.
    ///
    /// While this is in flight the previous handler keeps serving; on
    /// failure the previous handler stays installed and the error is
    /// logged ("no update this round").
    pub async fn set_handler(&self) -> Result<(), BridgeError> {
        let epoch = self.slot.begin();
        let result = self.runner.import(&self.entrypoint).await.and_then(|ns| {
            ns.default_handler().ok_or_else(|| {
                BridgeError::evaluation(
                    &self.entrypoint,
                    "entrypoint has no default handler export",
                )
            })
        });

        match result {
            Ok(handler) => {
                if self.slot.install(epoch, handler) {
                    debug!(entrypoint = %self.entrypoint, "handler installed");
                } else {
                    debug!(entrypoint = %self.entrypoint, "stale handler resolution discarded");
                }
                Ok(())
            }
            Err(e) => {
                warn!(entrypoint = %self.entrypoint, error = %e, "set_handler failed, keeping previous handler");
                self.slot.fail(epoch);
                Err(e)
            }
        }
    }

    /// Eagerly resolve the handler on a host activation signal instead of
    /// waiting for the first use.
    pub async fn activate(&self) {
        let _ = self.set_handler().await;
    }

    /// React to one hot payload.
    ///
    /// A `full-reload` clears the module cache and schedules exactly one
    /// re-import, awaited before the payload is considered handled so
    /// buffered application events observe the new entrypoint.
    pub async fn on_hot_payload(&self, payload: &HotPayload) {
        if matches!(payload, HotPayload::FullReload) {
            self.runner.clear_cache();
            let _ = self.set_handler().await;
        }
    }

    /// Pump a hot connection until it disconnects, forwarding every payload
    /// to `forward` after bridge-level handling.
    pub async fn run<C, F>(&self, connection: C, forward: F)
    where
        C: HotConnection,
        F: Fn(HotPayload) + Send + Sync,
    {
        while let Some(payload) = connection.recv().await {
            self.on_hot_payload(&payload).await;
            forward(payload);
        }
        debug!(entrypoint = %self.entrypoint, "hot connection closed");
    }
}
