//! Capabilities a host grants an isolate.
//!
//! Internal control bindings (root path, code evaluation, module fetch)
//! are typed fields here, not entries in the environment map, so they can
//! never leak into the environment application code observes. The reserved
//! names are still filtered defensively in case a project declares one.

use std::sync::Arc;

use async_trait::async_trait;

use dev_bridge_common::EnvMap;
use dev_bridge_core::CodeEvaluator;

/// Environment names reserved for the bridge integration. Application
/// code never sees these keys even if a project declares them.
pub const RESERVED_BINDINGS: &[&str] = &["ROOT", "EVAL", "FETCH_MODULE"];

/// Response from the module-fetch service binding.
#[derive(Debug, Clone)]
pub struct BindingResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body (JSON-serialized fetch result on success).
    pub body: Vec<u8>,
}

impl BindingResponse {
    /// Successful response carrying a body.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Error response with a status and message body.
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: message.as_bytes().to_vec(),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Host-provided service binding performing the module-fetch round trip on
/// the isolate's behalf.
///
/// The isolate cannot reach the dev server directly; its host injects this
/// capability, whose implementation forwards `[id, importer]` to the module
/// graph and serializes the result back.
#[async_trait]
pub trait ModuleFetchBinding: Send + Sync {
    /// Dispatch one fetch-module call with a JSON `[id, importer]` body.
    async fn dispatch(&self, body: &[u8]) -> BindingResponse;
}

/// The static capability set an isolate is created with.
pub struct IsolateBindings {
    /// Project root path.
    pub root: String,
    /// "Evaluate code string with a given identifier" capability.
    pub evaluator: Arc<dyn CodeEvaluator>,
    /// Module-fetch service binding.
    pub fetch_module: Arc<dyn ModuleFetchBinding>,
    /// Project-declared static environment values, visible to application
    /// code.
    pub static_env: EnvMap,
}

impl IsolateBindings {
    /// Create a binding set with an empty static environment.
    pub fn new(
        root: impl Into<String>,
        evaluator: Arc<dyn CodeEvaluator>,
        fetch_module: Arc<dyn ModuleFetchBinding>,
    ) -> Self {
        Self {
            root: root.into(),
            evaluator,
            fetch_module,
            static_env: EnvMap::new(),
        }
    }

    /// Attach project-declared static environment values.
    pub fn with_static_env(mut self, env: EnvMap) -> Self {
        self.static_env = env;
        self
    }

    /// The environment application code observes, before the runtime
    /// overlay is merged: the static values minus reserved binding names.
    pub fn app_env(&self) -> EnvMap {
        self.static_env
            .iter()
            .filter(|(name, _)| !RESERVED_BINDINGS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl std::fmt::Debug for IsolateBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolateBindings")
            .field("root", &self.root)
            .field("static_env_keys", &self.static_env.len())
            .finish_non_exhaustive()
    }
}
