//! In-memory remote store.
//!
//! Behaves like a realtime JSON database: lists are stored as index-keyed
//! objects and read back as lists, `null` deletes, empty objects vanish,
//! and every write is pushed to subscribers (`put` for single-path writes,
//! `patch` at the root for multi-path updates).

use super::RemoteStore;
use crate::error::{EngineError, EngineResult};
use crate::event::{path_segments, RemoteEvent};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// One write accepted by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Single-path write.
    Set {
        /// Path written.
        path: String,
        /// Value written; `null` for deletions.
        value: Value,
    },
    /// Multi-path update.
    Update(Map<String, Value>),
}

impl StoreWrite {
    /// Returns true if the write touched `path` or anything below it.
    pub fn touches(&self, path: &str) -> bool {
        let within = |written: &str| {
            let written = written.trim_matches('/');
            written == path || written.starts_with(&format!("{path}/"))
        };
        match self {
            StoreWrite::Set { path: written, .. } => within(written),
            StoreWrite::Update(changes) => changes.keys().any(|key| within(key)),
        }
    }
}

/// A remote store held in memory.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    root: RwLock<Value>,
    subscribers: RwLock<Vec<Sender<RemoteEvent>>>,
    writes: RwLock<Vec<StoreWrite>>,
    offline: AtomicBool,
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `root`.
    pub fn with_root(root: Value) -> Self {
        let store = Self::new();
        *store.root.write() = stored_form(root);
        store
    }

    /// Returns the whole tree as a client would read it.
    pub fn snapshot(&self) -> Value {
        read_form(&self.root.read())
    }

    /// Returns every write accepted so far.
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.writes.read().clone()
    }

    /// Makes every call fail, as if the store were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn check_online(&self, path: &str) -> EngineResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(EngineError::remote(path, "store unreachable"));
        }
        Ok(())
    }

    fn emit(&self, event: RemoteEvent) {
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn get(&self, path: &str) -> EngineResult<Option<Value>> {
        self.check_online(path)?;
        let root = self.root.read();
        let mut node = &*root;
        for segment in path_segments(path) {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok((!node.is_null()).then(|| read_form(node)))
    }

    fn set(&self, path: &str, value: Value) -> EngineResult<()> {
        self.check_online(path)?;
        let value = stored_form(value);
        {
            let mut root = self.root.write();
            write_at(&mut root, &path_segments(path), value.clone());
        }
        self.writes.write().push(StoreWrite::Set {
            path: path.to_string(),
            value: value.clone(),
        });
        self.emit(RemoteEvent::put(event_path(path), Some(read_form(&value))));
        Ok(())
    }

    fn update(&self, changes: Map<String, Value>) -> EngineResult<()> {
        self.check_online("/")?;
        if changes.is_empty() {
            return Ok(());
        }
        {
            let mut root = self.root.write();
            for (path, value) in &changes {
                write_at(&mut root, &path_segments(path), stored_form(value.clone()));
            }
        }
        self.writes.write().push(StoreWrite::Update(changes.clone()));
        self.emit(RemoteEvent::patch("/", changes));
        Ok(())
    }

    fn delete(&self, path: &str) -> EngineResult<()> {
        self.set(path, Value::Null)
    }

    fn subscribe(&self) -> EngineResult<Receiver<RemoteEvent>> {
        self.check_online("/")?;
        let (tx, rx) = mpsc::channel();
        let initial = RemoteEvent::put("/", Some(self.snapshot()));
        // A fresh receiver is alive, so the first send cannot fail.
        let _ = tx.send(initial);
        self.subscribers.write().push(tx);
        Ok(rx)
    }

    fn unsubscribe(&self) {
        self.subscribers.write().clear();
    }
}

fn event_path(path: &str) -> String {
    format!("/{}", path_segments(path).join("/"))
}

fn write_at(root: &mut Value, segments: &[&str], value: Value) {
    match segments.split_last() {
        None => *root = value,
        Some((last, parents)) => {
            let mut node = &mut *root;
            for segment in parents {
                node = child_mut(node, segment);
            }
            if value.is_null() {
                if let Value::Object(children) = node {
                    children.remove(*last);
                }
            } else {
                *child_mut(node, last) = value;
            }
        }
    }
    prune(root);
}

fn child_mut<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    &mut node[key]
}

// Drops nulls and empty objects; returns true if nothing is left.
fn prune(value: &mut Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(children) => {
            children.retain(|_, child| !prune(child));
            if children.is_empty() {
                *value = Value::Null;
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

// Lists become index-keyed objects.
fn stored_form(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let children: Map<String, Value> = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), stored_form(item)))
                .collect();
            let mut value = Value::Object(children);
            prune(&mut value);
            value
        }
        Value::Object(children) => {
            let children: Map<String, Value> = children
                .into_iter()
                .map(|(key, child)| (key, stored_form(child)))
                .collect();
            let mut value = Value::Object(children);
            prune(&mut value);
            value
        }
        other => other,
    }
}

// Objects keyed 0..n come back as lists.
fn read_form(value: &Value) -> Value {
    match value {
        Value::Object(children) => {
            let is_list = !children.is_empty()
                && (0..children.len()).all(|i| children.contains_key(&i.to_string()));
            if is_list {
                Value::Array(
                    (0..children.len())
                        .map(|i| children.get(&i.to_string()).map_or(Value::Null, read_form))
                        .collect(),
                )
            } else {
                Value::Object(
                    children
                        .iter()
                        .map(|(key, child)| (key.clone(), read_form(child)))
                        .collect(),
                )
            }
        }
        other => other.clone(),
    }
}
