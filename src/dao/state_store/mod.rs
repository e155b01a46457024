pub mod memory;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::dao::storage::StorageResult;

pub use self::memory::MemoryStore;

/// Abstraction over the shared real-time key-path store every client observes.
///
/// Paths are slash-delimited (`rooms/AB23/players/p1`). The store only offers
/// single-path consistency: there is no atomicity across paths and no ordering
/// guarantee between writes issued by different clients to different paths.
pub trait StateStore: Send + Sync {
    /// Read the value at `path`, `None` when nothing is stored there.
    fn read(&self, path: &str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Replace the value at `path`. Writing `null` removes it.
    fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StorageResult<()>>;
    /// Merge `fields` into the object at `path` without touching siblings.
    ///
    /// Keys may themselves be relative slash-delimited paths, which lets a
    /// single update touch nested children (`{"game/status": "ranking"}`).
    fn update(&self, path: &str, fields: Map<String, Value>)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the value at `path` and everything below it.
    fn delete(&self, path: &str) -> BoxFuture<'static, StorageResult<()>>;
    /// Observe `path`: the current snapshot is delivered first, then one
    /// snapshot per mutation touching the path. Absent values arrive as `None`.
    fn subscribe(&self, path: &str) -> BoxFuture<'static, StorageResult<Subscription>>;
    /// Atomically add `delta` to the integer at `path` (absent counts as zero)
    /// and return the new value.
    fn increment(&self, path: &str, delta: i64) -> BoxFuture<'static, StorageResult<i64>>;
    /// Write `new` only when the current value equals `expected`.
    ///
    /// Returns `false` without mutating anything when the values differ.
    fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<Value>,
        new: Value,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Live subscription to a store path. Dropping the handle unsubscribes.
pub struct Subscription {
    path: String,
    receiver: mpsc::UnboundedReceiver<Option<Value>>,
    cancel: Option<CancelFn>,
}

impl Subscription {
    /// Wrap a snapshot receiver together with the hook that detaches it from the store.
    pub fn new(
        path: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Option<Value>>,
        cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            receiver,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Path this subscription observes.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next snapshot. Returns `None` once the store side is gone.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.receiver.recv().await
    }

    /// Explicitly stop receiving snapshots.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
