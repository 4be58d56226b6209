//! Dev server control plane for dev-bridge.
//!
//! This crate is the module-graph owner's half of the bridge:
//!
//! - [`HotChannel`] realizations: [`WsHotChannel`] (socket acceptor, one
//!   peer per connection) and [`AttachedHotChannel`] (a single socket end
//!   handed over by the isolate bootstrap)
//! - [`IsolateController`]: isolate creation, bootstrap, the one-time
//!   entrypoint handshake, environment overlay, and request proxying
//! - [`FilenameBarrier`]: cross-build synchronization on output filenames
//! - [`EnvironmentRegistry`]: named execution targets and client reload
//!   fan-out
//! - [`DevServer`] + [`build_router`]: the HTTP control plane (module
//!   fetch RPC, dev entry script, proxy fallback)

pub mod barrier;
pub mod channel;
pub mod controller;
pub mod environment;
pub mod graph;
pub mod router;
pub mod server;
pub mod state;
pub mod ws_channel;

pub use barrier::{substitute_placeholder, FilenameBarrier};
pub use channel::{AttachedHotChannel, HotChannel, HotListener, ListenerRegistry};
pub use controller::{GraphBinding, IsolateController};
pub use environment::{Consumer, Environment, EnvironmentRegistry};
pub use graph::{DirModuleGraph, MemoryModuleGraph, ModuleGraph};
pub use router::build_router;
pub use server::{DevServer, RunExit, TestHandle};
pub use state::DevState;
pub use ws_channel::WsHotChannel;
