//! Local mirror of a subscribed subtree.
//!
//! The database streams raw `put`/`patch` writes relative to the subscribed
//! location. The mirror applies them to a local JSON tree and derives the
//! higher-level feed events by diffing direct children before and after each
//! write. Absence is represented by `null`: empty objects are pruned, and
//! writing `null` deletes.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::feed::{FeedKind, Snapshot};

/// A raw write as delivered by the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Replace the node at the path.
    Put,
    /// Merge the given children into the node at the path.
    Patch,
}

pub struct Mirror {
    kind: FeedKind,
    key: String,
    root: Value,
    loaded: bool,
}

impl Mirror {
    pub fn new(kind: FeedKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            root: Value::Null,
            loaded: false,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Apply a write at `path` (relative to the mirrored location) and return
    /// the snapshots this mirror's feed kind should deliver.
    pub fn apply(&mut self, op: WriteOp, path: &str, data: Value) -> Vec<Snapshot> {
        let segments = split_path(path);
        // Patch members are pruned one by one so a `null` member still deletes.
        let data = match op {
            WriteOp::Put => prune(data),
            WriteOp::Patch => data,
        };

        let affected: BTreeSet<String> = match segments.first() {
            Some(first) => BTreeSet::from([first.to_string()]),
            None => {
                let mut keys = object_keys(&data);
                if op == WriteOp::Put {
                    keys.extend(object_keys(&self.root));
                }
                keys
            }
        };

        let before: Vec<(String, Option<Value>)> = affected
            .into_iter()
            .map(|k| {
                let old = self.root.get(&k).cloned();
                (k, old)
            })
            .collect();
        let old_root = (self.kind == FeedKind::Value).then(|| self.root.clone());

        match op {
            WriteOp::Put => set_at(&mut self.root, &segments, data),
            WriteOp::Patch => {
                if let Value::Object(children) = data {
                    for (k, v) in children {
                        let mut child_path = segments.clone();
                        child_path.push(&k);
                        set_at(&mut self.root, &child_path, prune(v));
                    }
                }
            }
        }

        let first_load = !self.loaded;
        self.loaded = true;

        match self.kind {
            FeedKind::Value => {
                if first_load || old_root.as_ref() != Some(&self.root) {
                    vec![Snapshot {
                        key: self.key.clone(),
                        value: self.root.clone(),
                    }]
                } else {
                    Vec::new()
                }
            }
            FeedKind::ChildAdded | FeedKind::ChildChanged => before
                .into_iter()
                .filter_map(|(key, old)| {
                    let new = self.root.get(&key)?;
                    let emit = match (self.kind, old) {
                        (FeedKind::ChildAdded, None) => true,
                        (FeedKind::ChildChanged, Some(old)) => &old != new,
                        _ => false,
                    };
                    emit.then(|| Snapshot {
                        key,
                        value: new.clone(),
                    })
                })
                .collect(),
        }
    }
}

/// Split a `/`-separated path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join two paths with exactly one `/` between them.
pub fn join_path(base: &str, child: &str) -> String {
    let base = base.trim_matches('/');
    let child = child.trim_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, child),
    }
}

/// Last segment of a path, empty for the root.
pub fn last_segment(path: &str) -> String {
    split_path(path).last().map(|s| s.to_string()).unwrap_or_default()
}

/// Borrow the node at `segments`, if any.
pub fn value_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.get(*segment)?;
    }
    (!node.is_null()).then_some(node)
}

/// Replace the node at `segments` with `data`, creating parents as needed and
/// pruning parents left empty.
pub fn set_at(node: &mut Value, segments: &[&str], data: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = data;
        return;
    };
    if data.is_null() && !node.is_object() {
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
        if child.is_null() {
            map.remove(*first);
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

/// Drop `null` members and empty objects, matching how the database stores data.
pub fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

fn object_keys(value: &Value) -> BTreeSet<String> {
    value
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}
