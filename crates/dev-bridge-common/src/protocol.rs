//! Fixed control-plane protocol constants.
//!
//! Paths and headers are fixed strings by contract, not configurable.
//! The isolate side and the controller side both resolve them from here
//! so the two halves cannot drift.

/// Bootstrap path: `GET` with an upgrade establishes the hot channel socket.
pub const INIT_MODULE_RUNNER_PATH: &str = "/__init-module-runner";

/// One-time entrypoint handshake path.
pub const SET_ENTRYPOINT_PATH: &str = "/__set-entrypoint";

/// Environment overlay merge path (`POST`, JSON body).
pub const SET_ENVS_PATH: &str = "/__set-envs";

/// Module-fetch RPC path on the dev server, accepting `[id, importer]`.
pub const MODULE_RPC_PATH: &str = "/__bridge_rpc";

/// Dev entry script path, returning the evaluator bootstrap document.
pub const DEV_ENTRY_PATH: &str = "/__bridge_entry.js";

/// Header identifying the RPC call kind on [`MODULE_RPC_PATH`].
pub const RPC_TYPE_HEADER: &str = "x-bridge-rpc-type";

/// RPC kind value for a module fetch.
pub const RPC_TYPE_FETCH_MODULE: &str = "fetchModule";

/// Header carrying the entrypoint id on [`SET_ENTRYPOINT_PATH`].
pub const ENTRYPOINT_HEADER: &str = "x-bridge-entrypoint";

/// Content type for module code returned by the RPC and entry script paths.
pub const MODULE_CONTENT_TYPE: &str = "application/javascript";
