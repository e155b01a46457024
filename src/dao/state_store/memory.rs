//! In-process [`StateStore`] backed by a JSON tree.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::dao::{
    paths::{is_prefix, segments},
    storage::{StorageError, StorageResult},
};

use super::{StateStore, Subscription};

/// Shared in-memory store. Cloning yields another handle onto the same tree.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    root: RwLock<Value>,
    subscribers: DashMap<u64, Subscriber>,
    next_id: AtomicU64,
    available: AtomicBool,
}

struct Subscriber {
    path: Vec<String>,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                root: RwLock::new(Value::Object(Map::new())),
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Toggle availability. While unavailable every operation fails, which
    /// mimics a lost connection to a remote store.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl Inner {
    fn ensure_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::offline("memory store switched offline"))
        }
    }

    /// Push the current snapshot to every subscriber whose path overlaps a mutated path.
    fn notify(&self, root: &Value, mutated: &[Vec<&str>]) {
        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            let sub_path: Vec<&str> = entry.path.iter().map(String::as_str).collect();
            let touched = mutated
                .iter()
                .any(|path| is_prefix(&sub_path, path) || is_prefix(path, &sub_path));
            if !touched {
                continue;
            }
            let snapshot = get_at(root, &sub_path).cloned();
            if entry.tx.send(snapshot).is_err() {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
        }
    }
}

impl StateStore for MemoryStore {
    fn read(&self, path: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let inner = self.inner.clone();
        let path = path.to_owned();
        Box::pin(async move {
            inner.ensure_available()?;
            let root = inner.root.read().await;
            Ok(get_at(&root, &segments(&path)).cloned())
        })
    }

    fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let path = path.to_owned();
        Box::pin(async move {
            inner.ensure_available()?;
            let segs = segments(&path);
            let mut root = inner.root.write().await;
            set_at(&mut root, &segs, value);
            inner.notify(&root, &[segs]);
            debug!(%path, "store write");
            Ok(())
        })
    }

    fn update(
        &self,
        path: &str,
        fields: Map<String, Value>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let path = path.to_owned();
        Box::pin(async move {
            inner.ensure_available()?;
            let mut root = inner.root.write().await;
            let mut full_paths = Vec::with_capacity(fields.len());
            for (key, value) in fields {
                let full_path = format!("{path}/{key}");
                set_at(&mut root, &segments(&full_path), value);
                full_paths.push(full_path);
            }
            let mutated: Vec<Vec<&str>> = full_paths.iter().map(|p| segments(p)).collect();
            inner.notify(&root, &mutated);
            debug!(%path, "store update");
            Ok(())
        })
    }

    fn delete(&self, path: &str) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let path = path.to_owned();
        Box::pin(async move {
            inner.ensure_available()?;
            let segs = segments(&path);
            let mut root = inner.root.write().await;
            remove_at(&mut root, &segs);
            inner.notify(&root, &[segs]);
            Ok(())
        })
    }

    fn subscribe(&self, path: &str) -> BoxFuture<'static, StorageResult<Subscription>> {
        let inner = self.inner.clone();
        let path = path.to_owned();
        Box::pin(async move {
            inner.ensure_available()?;
            let (tx, rx) = mpsc::unbounded_channel();
            let id = inner.next_id.fetch_add(1, Ordering::Relaxed);

            // Holding the read lock keeps writers out until the first snapshot is queued.
            let root = inner.root.read().await;
            let _ = tx.send(get_at(&root, &segments(&path)).cloned());
            inner.subscribers.insert(
                id,
                Subscriber {
                    path: segments(&path).into_iter().map(str::to_owned).collect(),
                    tx,
                },
            );
            drop(root);

            let registry = inner.clone();
            Ok(Subscription::new(path, rx, move || {
                registry.subscribers.remove(&id);
            }))
        })
    }

    fn increment(&self, path: &str, delta: i64) -> BoxFuture<'static, StorageResult<i64>> {
        let inner = self.inner.clone();
        let path = path.to_owned();
        Box::pin(async move {
            inner.ensure_available()?;
            let segs = segments(&path);
            let mut root = inner.root.write().await;
            let current = match get_at(&root, &segs) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| StorageError::UnexpectedValue {
                    path: path.clone(),
                    reason: format!("cannot increment non-integer value {value}"),
                })?,
            };
            let next = current + delta;
            set_at(&mut root, &segs, Value::from(next));
            inner.notify(&root, &[segs]);
            Ok(next)
        })
    }

    fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<Value>,
        new: Value,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        let path = path.to_owned();
        Box::pin(async move {
            inner.ensure_available()?;
            let segs = segments(&path);
            let mut root = inner.root.write().await;
            if get_at(&root, &segs) != expected.as_ref() {
                debug!(%path, "compare-and-swap lost");
                return Ok(false);
            }
            set_at(&mut root, &segs, new);
            inner.notify(&root, &[segs]);
            Ok(true)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_available() })
    }
}

fn get_at<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    segs.iter()
        .try_fold(root, |node, seg| node.as_object()?.get(*seg))
}

fn set_at(root: &mut Value, segs: &[&str], value: Value) {
    if value.is_null() {
        remove_at(root, segs);
        return;
    }
    let Some((last, parents)) = segs.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for seg in parents {
        node = ensure_object(node)
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.to_string(), value);
}

fn remove_at(node: &mut Value, segs: &[&str]) {
    let Some((first, rest)) = segs.split_first() else {
        *node = Value::Object(Map::new());
        return;
    };
    let Some(map) = node.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.shift_remove(*first);
        return;
    }
    if let Some(child) = map.get_mut(*first) {
        remove_at(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            map.shift_remove(*first);
        }
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}
