//! Remote module evaluator for dev-bridge.
//!
//! This crate runs inside a remote runtime and drives on-demand module
//! execution against the module graph owned by the dev server:
//!
//! - [`ModuleRunner`]: fetches, evaluates, and caches modules
//! - [`ModuleNamespace`]: frozen export namespace of an evaluated module
//! - [`HandlerSlot`] / [`RunnerHarness`]: the entrypoint handler lifecycle
//!   (uninitialized → ready → revalidating) driven by hot updates
//! - [`ModuleTransport`] / [`CodeEvaluator`]: the seams the hosting
//!   environment fills in (how to reach the module graph, how to turn
//!   compiled source into exports)
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                  ModuleTransport                      │
//! │  (fetch compiled source for a module id)              │
//! └───────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌───────────────────────────────────────────────────────┐
//! │                   ModuleRunner                        │
//! │  cache: id → frozen ModuleNamespace                   │
//! │  recursive dependency import, evaluate once           │
//! └───────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌───────────────────────────────────────────────────────┐
//! │              RunnerHarness + HandlerSlot              │
//! │  full-reload → clear cache → re-import entrypoint     │
//! │  old handler serves until the new one lands           │
//! └───────────────────────────────────────────────────────┘
//! ```

pub mod evaluator;
pub mod handler;
pub mod harness;
pub mod namespace;
pub mod runner;
pub mod transport;

pub use evaluator::CodeEvaluator;
pub use handler::{handler_fn, AppRequest, AppResponse, FnHandler, RequestHandler};
pub use harness::{HandlerSlot, HotConnection, RunnerHarness, SlotState};
pub use namespace::{ModuleExports, ModuleNamespace, ModuleValue};
pub use runner::ModuleRunner;
pub use transport::ModuleTransport;
