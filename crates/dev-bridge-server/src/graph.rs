//! Module graph boundary.
//!
//! The on-demand compiler that resolves a module id to transformed code is
//! an external collaborator with a single operation. The dev server only
//! forwards fetch calls to it; two small realizations are provided for
//! serving plain files and for tests.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use dev_bridge_common::{BridgeError, TransformedModule};

/// The single operation the dev server requires from a module compiler.
#[async_trait]
pub trait ModuleGraph: Send + Sync {
    /// Resolve and transform one module.
    ///
    /// # Errors
    ///
    /// Returns `ModuleNotFound` when the id does not resolve, or an
    /// `Evaluation` error when the transform fails.
    async fn fetch_module(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> Result<TransformedModule, BridgeError>;
}

/// In-memory graph backed by a module table. Used by tests and embedders
/// that precompute their modules.
#[derive(Default)]
pub struct MemoryModuleGraph {
    modules: DashMap<String, TransformedModule>,
}

impl MemoryModuleGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a module.
    pub fn insert(&self, module: TransformedModule) {
        self.modules.insert(module.id.clone(), module);
    }

    /// Remove a module by id.
    pub fn remove(&self, id: &str) {
        self.modules.remove(id);
    }
}

#[async_trait]
impl ModuleGraph for MemoryModuleGraph {
    async fn fetch_module(
        &self,
        id: &str,
        _importer: Option<&str>,
    ) -> Result<TransformedModule, BridgeError> {
        self.modules
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| BridgeError::module_not_found(id))
    }
}

/// Graph serving files under a root directory verbatim, with no transform
/// and no dependency tracking.
pub struct DirModuleGraph {
    root: PathBuf,
}

impl DirModuleGraph {
    /// Serve modules from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve_path(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id.trim_start_matches('/'));
        // ids may not escape the root
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl ModuleGraph for DirModuleGraph {
    async fn fetch_module(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> Result<TransformedModule, BridgeError> {
        let Some(path) = self.resolve_path(id) else {
            return Err(BridgeError::module_not_found(id));
        };
        debug!(module_id = %id, importer, path = %path.display(), "reading module");

        match tokio::fs::read_to_string(&path).await {
            Ok(code) => Ok(TransformedModule::new(id, code)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BridgeError::module_not_found(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}
