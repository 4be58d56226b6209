//! Sandboxed isolate and host-injected capabilities for dev-bridge.
//!
//! This crate provides the remote-runtime side of the bridge:
//! - [`Isolate`]: a sandboxed runtime reachable only through
//!   `dispatch_fetch`, speaking the fixed bootstrap/control protocol
//! - [`IsolateBindings`]: the capabilities a host grants an isolate
//!   (root path, code evaluation, module fetch), kept structurally apart
//!   from the environment application code observes
//! - [`SocketEnd`] pairs from [`socket_pair`]: the in-process socket used
//!   by the bootstrap upgrade to establish the hot channel
//! - Module fetch transports: [`HttpModuleTransport`] (direct RPC to the
//!   dev server) and [`BindingModuleTransport`] (through the injected
//!   service binding)
//! - [`WsHotConnection`]: WebSocket client hot connection for runners that
//!   live out of process

pub mod bindings;
pub mod isolate;
pub mod rpc;
pub mod socket;
pub mod ws;

pub use bindings::{BindingResponse, IsolateBindings, ModuleFetchBinding};
pub use isolate::{HotForward, Isolate, IsolateResponse};
pub use rpc::{BindingModuleTransport, HttpModuleTransport};
pub use socket::{socket_pair, SocketEnd};
pub use ws::WsHotConnection;
