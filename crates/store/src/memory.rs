//! In-process store with the same feed semantics as the Realtime Database.
//!
//! `set` behaves like a REST `PUT` (full overwrite) and `update` like a
//! `PATCH` (partial update). Every open feed keeps its own [`Mirror`], so
//! child and value events are derived exactly as for the remote store.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::feed::{self, Feed, FeedKind, FeedSender};
use crate::mirror::{Mirror, WriteOp, last_segment, prune, set_at, split_path, value_at};
use crate::DataStore;

struct Listener {
    path: Vec<String>,
    mirror: Mirror,
    tx: FeedSender,
}

#[derive(Default)]
struct Inner {
    root: Value,
    listeners: Vec<Listener>,
    read_failure: Option<String>,
    subscription_failure: Option<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree without emitting any events.
    pub fn with_data(data: Value) -> Self {
        let store = Self::new();
        store.lock().root = prune(data);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Overwrite the node at `path`.
    pub fn set(&self, path: &str, value: Value) {
        self.write(WriteOp::Put, path, value);
    }

    /// Merge `children` into the node at `path`.
    pub fn update(&self, path: &str, children: Map<String, Value>) {
        self.write(WriteOp::Patch, path, Value::Object(children));
    }

    /// Make every later point read fail.
    pub fn fail_reads(&self, reason: impl Into<String>) {
        self.lock().read_failure = Some(reason.into());
    }

    /// Make every later subscription fail immediately.
    pub fn fail_subscriptions(&self, reason: impl Into<String>) {
        self.lock().subscription_failure = Some(reason.into());
    }

    /// Number of feeds still held open by a receiver.
    pub fn open_feeds(&self) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|l| !l.tx.is_closed());
        inner.listeners.len()
    }

    /// Number of open feeds of `kind` on `path`.
    pub fn open_feeds_on(&self, path: &str, kind: FeedKind) -> usize {
        let segments: Vec<String> = split_path(path).into_iter().map(String::from).collect();
        let inner = self.lock();
        inner
            .listeners
            .iter()
            .filter(|l| !l.tx.is_closed() && l.path == segments && l.mirror.kind() == kind)
            .count()
    }

    fn write(&self, op: WriteOp, path: &str, data: Value) {
        let segments = split_path(path);
        let data = match op {
            WriteOp::Put => prune(data),
            WriteOp::Patch => data,
        };
        let mut inner = self.lock();

        match op {
            WriteOp::Put => set_at(&mut inner.root, &segments, data.clone()),
            WriteOp::Patch => {
                if let Value::Object(children) = &data {
                    for (k, v) in children {
                        let mut child_path = segments.clone();
                        child_path.push(k.as_str());
                        set_at(&mut inner.root, &child_path, prune(v.clone()));
                    }
                }
            }
        }

        let Inner {
            root, listeners, ..
        } = &mut *inner;
        listeners.retain(|l| !l.tx.is_closed());

        for listener in listeners.iter_mut() {
            let listening: Vec<&str> = listener.path.iter().map(String::as_str).collect();
            let snapshots = if segments.starts_with(&listening) {
                // Write at or below the feed's location: forward it relative.
                let relative = segments[listening.len()..].join("/");
                listener.mirror.apply(op, &relative, data.clone())
            } else if listening.starts_with(&segments) {
                // Write above the feed's location: resend the current subtree.
                let current = value_at(root, &listening).cloned().unwrap_or(Value::Null);
                listener.mirror.apply(WriteOp::Put, "/", current)
            } else {
                continue;
            };
            for snapshot in snapshots {
                let _ = listener.tx.send(Ok(snapshot));
            }
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.lock();
        if let Some(reason) = &inner.read_failure {
            return Err(StoreError::Http {
                status: 503,
                body: reason.clone(),
            });
        }
        Ok(value_at(&inner.root, &split_path(path)).cloned())
    }

    fn subscribe(&self, path: &str, kind: FeedKind) -> Feed {
        let mut inner = self.lock();
        if let Some(reason) = &inner.subscription_failure {
            return feed::failed(StoreError::Cancelled(reason.clone()));
        }

        let segments = split_path(path);
        let (tx, rx) = feed::channel();
        let mut mirror = Mirror::new(kind, last_segment(path));
        let current = value_at(&inner.root, &segments).cloned().unwrap_or(Value::Null);
        for snapshot in mirror.apply(WriteOp::Put, "/", current) {
            let _ = tx.send(Ok(snapshot));
        }

        inner.listeners.push(Listener {
            path: segments.into_iter().map(String::from).collect(),
            mirror,
            tx,
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(feed: &mut Feed) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        while let Ok(item) = feed.try_recv() {
            let snapshot = item.unwrap();
            out.push((snapshot.key, snapshot.value));
        }
        out
    }

    #[tokio::test]
    async fn test_read_returns_subtree_or_none() {
        let store = MemoryStore::with_data(json!({"games": {"kalyan": {"2026-10-14": {"number": "45"}}}}));
        assert_eq!(
            store.read("games/kalyan/2026-10-14").await.unwrap(),
            Some(json!({"number": "45"}))
        );
        assert_eq!(store.read("games/milan").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_feeds_follow_writes() {
        let store = MemoryStore::with_data(json!({"games": {"kalyan": {"2026-10-13": {"number": "10"}}}}));
        let mut added = store.subscribe("games", FeedKind::ChildAdded);
        let mut changed = store.subscribe("games/kalyan", FeedKind::ChildChanged);
        let mut value = store.subscribe("games/kalyan", FeedKind::Value);

        assert_eq!(drain(&mut added).len(), 1);
        assert!(drain(&mut changed).is_empty());
        assert_eq!(drain(&mut value).len(), 1);

        store.set("games/kalyan/2026-10-13/number", json!("11"));
        assert_eq!(
            drain(&mut changed),
            vec![("2026-10-13".to_string(), json!({"number": "11"}))]
        );
        assert_eq!(drain(&mut value).len(), 1);
        assert!(drain(&mut added).is_empty());

        store.set("games/milan", json!({"2026-10-14": {"number": "3"}}));
        assert_eq!(drain(&mut added)[0].0, "milan");
        assert!(drain(&mut changed).is_empty());
        assert!(drain(&mut value).is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_above_feed_location() {
        let store = MemoryStore::with_data(json!({"games": {"kalyan": {"2026-10-14": {"number": "45"}}}}));
        let mut value = store.subscribe("games/kalyan", FeedKind::Value);
        drain(&mut value);

        store.set("games", json!({"kalyan": {"2026-10-14": {"number": "45"}}, "milan": {"x": 1}}));
        assert!(drain(&mut value).is_empty());

        store.set("games", json!({"kalyan": {"2026-10-14": {"number": "46"}}}));
        assert_eq!(
            drain(&mut value),
            vec![("kalyan".to_string(), json!({"2026-10-14": {"number": "46"}}))]
        );
    }

    #[tokio::test]
    async fn test_update_with_null_member_deletes() {
        let store = MemoryStore::with_data(json!({"games": {"kalyan": {
            "2026-10-13": {"number": "10"},
            "2026-10-14": {"number": "45"},
        }}}));
        let mut value = store.subscribe("games/kalyan", FeedKind::Value);
        drain(&mut value);

        let mut children = Map::new();
        children.insert("2026-10-14".to_string(), Value::Null);
        store.update("games/kalyan", children);

        assert_eq!(store.read("games/kalyan/2026-10-14").await.unwrap(), None);
        assert_eq!(
            drain(&mut value),
            vec![("kalyan".to_string(), json!({"2026-10-13": {"number": "10"}}))]
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.fail_subscriptions("permission_denied");
        let mut feed = store.subscribe("games", FeedKind::ChildAdded);
        assert!(matches!(feed.recv().await, Some(Err(StoreError::Cancelled(_)))));
        assert!(feed.recv().await.is_none());

        store.fail_reads("offline");
        assert!(store.read("subscriptions").await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_feeds_are_released() {
        let store = MemoryStore::new();
        let feed = store.subscribe("games/kalyan", FeedKind::Value);
        assert_eq!(store.open_feeds(), 1);
        assert_eq!(store.open_feeds_on("games/kalyan", FeedKind::Value), 1);
        drop(feed);
        assert_eq!(store.open_feeds(), 0);
    }
}
