//! Named execution environments.
//!
//! Each environment is a named execution target owning at most one live
//! dev runtime. The registry tracks them and fans a full-reload out from a
//! server environment to every client environment's hot channel, so a
//! server-side source change also refreshes connected browsers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use dev_bridge_common::{BridgeError, HotPayload};

use crate::channel::HotChannel;

/// Which side of the bridge consumes an environment's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    /// Runs on the developer machine or in an isolate.
    Server,
    /// Runs in the browser.
    Client,
}

/// A named execution target.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Environment name, unique within a registry.
    pub name: String,
    /// Consumer side.
    pub consumer: Consumer,
    /// Whether the target offers web-platform APIs.
    pub web_compatible: bool,
}

impl Environment {
    /// Define an environment.
    pub fn new(name: impl Into<String>, consumer: Consumer, web_compatible: bool) -> Self {
        Self {
            name: name.into(),
            consumer,
            web_compatible,
        }
    }
}

struct Registered {
    environment: Environment,
    channel: Option<Arc<dyn HotChannel>>,
}

/// Registry of environments configured for one dev server.
#[derive(Default)]
pub struct EnvironmentRegistry {
    entries: Mutex<HashMap<String, Registered>>,
}

impl EnvironmentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an environment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the name is already taken.
    pub fn register(&self, environment: Environment) -> Result<(), BridgeError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&environment.name) {
            return Err(BridgeError::invalid_config(format!(
                "environment \"{}\" registered twice",
                environment.name
            )));
        }
        info!(name = %environment.name, consumer = ?environment.consumer, "environment registered");
        entries.insert(
            environment.name.clone(),
            Registered {
                environment,
                channel: None,
            },
        );
        Ok(())
    }

    /// Attach the live hot channel of an environment's runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the environment is unknown.
    pub fn attach_channel(
        &self,
        name: &str,
        channel: Arc<dyn HotChannel>,
    ) -> Result<(), BridgeError> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(name) else {
            return Err(BridgeError::invalid_config(format!(
                "unknown environment \"{name}\""
            )));
        };
        entry.channel = Some(channel);
        Ok(())
    }

    /// Look up an environment by name.
    pub fn get(&self, name: &str) -> Option<Environment> {
        self.entries
            .lock()
            .get(name)
            .map(|entry| entry.environment.clone())
    }

    /// Names of all registered environments.
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Fan a full-reload out to every client environment when a source
    /// change lands in a server environment. Returns the number of client
    /// channels notified.
    pub fn propagate_hot_update(&self, origin: &str) -> usize {
        let entries = self.entries.lock();
        let from_server = entries
            .get(origin)
            .is_some_and(|entry| entry.environment.consumer == Consumer::Server);
        if !from_server {
            return 0;
        }

        let mut notified = 0;
        for entry in entries.values() {
            if entry.environment.consumer != Consumer::Client {
                continue;
            }
            if let Some(channel) = &entry.channel {
                channel.send(&HotPayload::FullReload);
                notified += 1;
            }
        }
        debug!(origin, notified, "propagated full reload to clients");
        notified
    }
}

impl std::fmt::Debug for EnvironmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentRegistry")
            .field("names", &self.names())
            .finish()
    }
}
