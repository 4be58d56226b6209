//! Cross-build filename barrier.
//!
//! One build unit must embed the final output filename of a different,
//! concurrently-building unit. Consumers `wait` on a key; the producer
//! `resolve`s it exactly once when its build finishes, releasing every
//! waiter with the same value. Later waits return immediately. The barrier
//! does not detect a producer that never resolves; callers own their
//! timeouts.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use dev_bridge_common::BridgeError;

enum Slot {
    Resolved(String),
    Pending(Vec<oneshot::Sender<String>>),
}

/// A keyed resolve-once barrier for build output filenames.
#[derive(Default)]
pub struct FilenameBarrier {
    slots: Mutex<HashMap<String, Slot>>,
}

impl FilenameBarrier {
    /// Create an empty barrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `key` to resolve. Returns immediately when it already has.
    pub async fn wait(&self, key: &str) -> String {
        let rx = {
            let mut slots = self.slots.lock();
            match slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::Pending(Vec::new()))
            {
                Slot::Resolved(value) => return value.clone(),
                Slot::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };
        // the sender stays alive in the slot table until resolve consumes it
        rx.await.unwrap_or_default()
    }

    /// Resolve `key` with its final value, releasing every waiter.
    ///
    /// # Errors
    ///
    /// Returns an error when `key` was already resolved; the original value
    /// is kept.
    pub fn resolve(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        let waiters = {
            let mut slots = self.slots.lock();
            if matches!(slots.get(key), Some(Slot::Resolved(_))) {
                return Err(BridgeError::invalid_config(format!(
                    "output name for \"{key}\" resolved twice"
                )));
            }
            match slots.insert(key.to_string(), Slot::Resolved(value.to_string())) {
                Some(Slot::Pending(waiters)) => waiters,
                _ => Vec::new(),
            }
        };

        debug!(key, value, waiters = waiters.len(), "filename resolved");
        for tx in waiters {
            let _ = tx.send(value.to_string());
        }
        Ok(())
    }

    /// Returns `true` once `key` has resolved.
    pub fn is_resolved(&self, key: &str) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Resolved(_)))
    }
}

impl std::fmt::Debug for FilenameBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilenameBarrier")
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

/// Replace every occurrence of a placeholder token with the resolved
/// filename. Used by the finalize step of a build that embedded the token
/// before the name was known.
pub fn substitute_placeholder(source: &str, placeholder: &str, filename: &str) -> String {
    source.replace(placeholder, filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_two_concurrent_waiters_release_with_same_value() {
        let barrier = Arc::new(FilenameBarrier::new());

        let a = tokio::spawn({
            let barrier = barrier.clone();
            async move { barrier.wait("sw-filename").await }
        });
        let b = tokio::spawn({
            let barrier = barrier.clone();
            async move { barrier.wait("sw-filename").await }
        });
        // let both waiters register before resolving
        tokio::time::sleep(Duration::from_millis(10)).await;

        barrier.resolve("sw-filename", "v1").unwrap();
        assert_eq!(a.await.unwrap(), "v1");
        assert_eq!(b.await.unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_wait_after_resolve_returns_immediately() {
        let barrier = FilenameBarrier::new();
        barrier.resolve("key", "v1").unwrap();
        assert_eq!(barrier.wait("key").await, "v1");
        assert!(barrier.is_resolved("key"));
    }

    #[tokio::test]
    async fn test_second_resolve_is_a_hard_error() {
        let barrier = FilenameBarrier::new();
        barrier.resolve("key", "first").unwrap();
        assert!(barrier.resolve("key", "second").is_err());
        // the original value wins
        assert_eq!(barrier.wait("key").await, "first");
    }

    #[tokio::test]
    async fn test_unresolved_wait_stays_pending() {
        let barrier = Arc::new(FilenameBarrier::new());
        let pending = tokio::spawn({
            let barrier = barrier.clone();
            async move { barrier.wait("never").await }
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(50), pending).await;
        assert!(timed_out.is_err());
    }

    #[tokio::test]
    async fn test_client_finalize_embeds_service_worker_filename() {
        let barrier = Arc::new(FilenameBarrier::new());

        let finalize = tokio::spawn({
            let barrier = barrier.clone();
            async move {
                let filename = barrier.wait("sw-filename").await;
                substitute_placeholder(
                    "navigator.serviceWorker.register(\"__SW_FILENAME__\"); // __SW_FILENAME__",
                    "__SW_FILENAME__",
                    &filename,
                )
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        barrier.resolve("sw-filename", "sw/main-abc123.js").unwrap();
        let output = finalize.await.unwrap();
        assert_eq!(
            output,
            "navigator.serviceWorker.register(\"sw/main-abc123.js\"); // sw/main-abc123.js"
        );
    }
}
