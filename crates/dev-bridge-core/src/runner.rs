//! Module runner: fetch, evaluate, cache.
//!
//! The runner owns the per-runtime module cache. Each module is fetched
//! through the transport and evaluated exactly once per cache lifetime;
//! a full-reload clears the cache so the next import starts from scratch.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use dev_bridge_common::BridgeError;

use crate::evaluator::CodeEvaluator;
use crate::namespace::ModuleNamespace;
use crate::transport::ModuleTransport;

type ImportFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<ModuleNamespace>, BridgeError>> + Send + 'a>>;

/// Fetches, evaluates, and caches modules inside a remote runtime.
///
/// The runner is the sole owner of its cache; no other component mutates
/// it. It is cheap to share behind an `Arc`.
pub struct ModuleRunner {
    root: String,
    transport: Arc<dyn ModuleTransport>,
    evaluator: Arc<dyn CodeEvaluator>,
    cache: DashMap<String, Arc<ModuleNamespace>>,
    // ids currently being evaluated; a dependency edge back into this set
    // is a cycle and is dropped rather than awaited
    in_flight: Mutex<HashSet<String>>,
}

impl ModuleRunner {
    /// Create a runner over a transport and an evaluation capability.
    pub fn new(
        root: impl Into<String>,
        transport: Arc<dyn ModuleTransport>,
        evaluator: Arc<dyn CodeEvaluator>,
    ) -> Self {
        Self {
            root: root.into(),
            transport,
            evaluator,
            cache: DashMap::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Project root this runner was created for.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Import a module by id, evaluating it and its dependencies on first
    /// use and reusing the frozen namespace afterwards.
    #[instrument(skip(self), fields(module_id = %id))]
    pub async fn import(&self, id: &str) -> Result<Arc<ModuleNamespace>, BridgeError> {
        self.import_inner(id.to_string(), None).await
    }

    fn import_inner(&self, id: String, importer: Option<String>) -> ImportFuture<'_> {
        Box::pin(async move {
            if let Some(cached) = self.cache.get(&id) {
                return Ok(cached.clone());
            }

            {
                let mut in_flight = self.in_flight.lock();
                if !in_flight.insert(id.clone()) {
                    return Err(BridgeError::evaluation(
                        &id,
                        "circular import while module is still evaluating",
                    ));
                }
            }

            let result = self.fetch_and_evaluate(&id, importer.as_deref()).await;
            self.in_flight.lock().remove(&id);

            let namespace = result?;
            debug!(module_id = %id, "module evaluated and cached");
            self.cache.insert(id, namespace.clone());
            Ok(namespace)
        })
    }

    async fn fetch_and_evaluate(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> Result<Arc<ModuleNamespace>, BridgeError> {
        let module = self.transport.fetch_module(id, importer).await?;

        let mut deps: HashMap<String, Arc<ModuleNamespace>> = HashMap::new();
        for dep in &module.dependencies {
            // a dependency that is still evaluating means a cycle; the
            // importing module sees that binding as absent, matching a
            // half-initialized cycle
            if self.in_flight.lock().contains(dep) {
                debug!(module_id = %id, dep = %dep, "dropping circular import edge");
                continue;
            }
            let namespace = self.import_inner(dep.clone(), Some(id.to_string())).await?;
            deps.insert(dep.clone(), namespace);
        }

        let exports = self.evaluator.evaluate(&module, &deps).await?;
        Ok(Arc::new(ModuleNamespace::freeze(exports)))
    }

    /// Drop every cached module. The next import re-fetches from the graph.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Returns `true` if `id` has been evaluated in this cache lifetime.
    pub fn is_cached(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    /// Number of cached modules.
    pub fn cached_modules(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for ModuleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRunner")
            .field("root", &self.root)
            .field("cached_modules", &self.cache.len())
            .finish_non_exhaustive()
    }
}
