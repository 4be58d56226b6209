//! Module export namespaces.
//!
//! Evaluation writes exports into a private [`ModuleExports`] scope; the
//! runner then publishes them via a single copy into a read-only
//! [`ModuleNamespace`]. Importers only ever see the frozen container, which
//! matches the immutable contract module exports have once evaluated.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::handler::RequestHandler;

/// One exported value.
#[derive(Clone)]
pub enum ModuleValue {
    /// Plain data export.
    Json(Value),
    /// A request handler export (typically the default export of a server
    /// entrypoint).
    Handler(Arc<dyn RequestHandler>),
}

impl ModuleValue {
    /// The JSON payload, if this is a data export.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Handler(_) => None,
        }
    }

    /// The handler, if this is a handler export.
    pub fn as_handler(&self) -> Option<Arc<dyn RequestHandler>> {
        match self {
            Self::Handler(handler) => Some(handler.clone()),
            Self::Json(_) => None,
        }
    }
}

impl std::fmt::Debug for ModuleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// Mutable export scope an evaluator writes into.
///
/// This is the only mutable view of a module's exports; it is consumed by
/// [`ModuleNamespace::freeze`] and never escapes evaluation.
#[derive(Debug, Default)]
pub struct ModuleExports {
    entries: HashMap<String, ModuleValue>,
}

impl ModuleExports {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a value under a name.
    pub fn insert(&mut self, name: impl Into<String>, value: ModuleValue) {
        self.entries.insert(name.into(), value);
    }

    /// Export the default binding.
    pub fn set_default(&mut self, value: ModuleValue) {
        self.insert("default", value);
    }

    /// Number of exported bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been exported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The frozen export namespace of an evaluated module.
///
/// Constructed once from a [`ModuleExports`] scope and never mutated; the
/// type deliberately exposes no write access.
#[derive(Debug)]
pub struct ModuleNamespace {
    entries: HashMap<String, ModuleValue>,
}

impl ModuleNamespace {
    /// Publish a private export scope as an immutable namespace.
    pub fn freeze(exports: ModuleExports) -> Self {
        Self {
            entries: exports.entries,
        }
    }

    /// Look up an export by name.
    pub fn get(&self, name: &str) -> Option<&ModuleValue> {
        self.entries.get(name)
    }

    /// The default export, if present.
    pub fn default_export(&self) -> Option<&ModuleValue> {
        self.get("default")
    }

    /// The default export as a request handler.
    pub fn default_handler(&self) -> Option<Arc<dyn RequestHandler>> {
        self.default_export().and_then(ModuleValue::as_handler)
    }

    /// Names of all exports, in no particular order.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
