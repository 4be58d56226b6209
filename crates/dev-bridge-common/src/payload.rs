//! Hot-update payload and transformed-module wire types.
//!
//! Socket frames are one JSON document per message, no batching, no
//! compression. Payload delivery preserves send order within one channel
//! connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment overlay map, merged on top of statically-bound variables.
pub type EnvMap = serde_json::Map<String, Value>;

/// The compiled body of one source module plus the ids it depends on.
///
/// Produced by the module graph on every fetch; the remote side caches it,
/// the bridge core does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedModule {
    /// Module id as known to the module graph.
    pub id: String,
    /// Compiled source text.
    pub code: String,
    /// Static and dynamic dependency ids.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TransformedModule {
    /// Create a module with no dependencies.
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            dependencies: Vec::new(),
        }
    }

    /// Attach dependency ids.
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }
}

/// A hot-update notification.
///
/// `Custom` and `FullReload` are interpreted by the bridge; any other
/// update kind passes through opaquely as `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum HotPayload {
    /// Application-level named event.
    Custom {
        /// Event name listeners are keyed by.
        event: String,
        /// Event payload.
        data: Value,
    },
    /// Discard all cached modules and re-import the entrypoint.
    FullReload,
    /// Unrecognized update kind, forwarded untouched.
    Other(Value),
}

impl HotPayload {
    /// Build a custom event payload.
    pub fn custom(event: impl Into<String>, data: Value) -> Self {
        Self::Custom {
            event: event.into(),
            data,
        }
    }

    /// Event name for listener lookup, if this payload carries one.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Custom { event, .. } => Some(event),
            _ => None,
        }
    }

    /// Interpret a JSON document as a payload.
    pub fn from_json(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("full-reload") => Self::FullReload,
            Some("custom") => {
                let event = value
                    .get("event")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                Self::Custom { event, data }
            }
            _ => Self::Other(value),
        }
    }

    /// Render the payload back to its JSON document form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::FullReload => serde_json::json!({ "type": "full-reload" }),
            Self::Custom { event, data } => serde_json::json!({
                "type": "custom",
                "event": event,
                "data": data,
            }),
            Self::Other(value) => value.clone(),
        }
    }

    /// Decode one socket frame.
    ///
    /// # Errors
    ///
    /// Returns the parse error so callers can drop malformed frames.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(frame)?;
        Ok(Self::from_json(value))
    }

    /// Encode the payload as one socket frame.
    pub fn encode(&self) -> String {
        self.to_json().to_string()
    }
}

impl Serialize for HotPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HotPayload {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(value))
    }
}
