//! Code evaluation seam.
//!
//! Turning fetched source text into live exports is a capability the
//! hosting environment injects (an "evaluate string as code" binding in a
//! sandboxed isolate, an ES module evaluator in a service worker). The
//! runner itself never interprets code.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use dev_bridge_common::{BridgeError, TransformedModule};

use crate::namespace::{ModuleExports, ModuleNamespace};

/// Host-provided "evaluate code with a given identifier" capability.
#[async_trait]
pub trait CodeEvaluator: Send + Sync {
    /// Evaluate one module body into a private export scope.
    ///
    /// `deps` maps every dependency id of the module to its already-frozen
    /// namespace; the evaluator resolves import bindings against it. The
    /// returned scope is published (frozen) by the caller.
    ///
    /// # Errors
    ///
    /// A thrown error during evaluation surfaces as `Evaluation` and is
    /// treated by the runner as "no update this round".
    async fn evaluate(
        &self,
        module: &TransformedModule,
        deps: &HashMap<String, Arc<ModuleNamespace>>,
    ) -> Result<ModuleExports, BridgeError>;
}
