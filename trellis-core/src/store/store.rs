//! Reactive Store
//!
//! A `ReactiveStore` wraps one module's config table: a nested plain-data
//! tree keyed at the root by vid. Every committed mutation is turned into a
//! minimal [`Patch`] and published on the store's [`ChangeBus`] before the
//! mutating call returns.
//!
//! # Mutation API
//!
//! Producers call explicit operations (`set`, `delete`, the sequence
//! mutators) rather than relying on transparent interception; the store is
//! the source of truth for what counts as a committed edit. Reads are plain
//! snapshots and never notify.
//!
//! # Sequence reconciliation
//!
//! A bulk sequence mutation (`pop`, `shift`, `unshift`, `splice`) is not
//! reported as one opaque change. The store compares the pre-mutation
//! snapshot against the new sequence by membership, in index order, and
//! derives exactly |old length − new length| granular per-element
//! notifications. Removing the middle element of `[a, b, c]` therefore
//! emits a single delete for index 1, never three notifications and never
//! one for `a` or `c`. Length-preserving operations (`reverse`, `sort_by`,
//! balanced `splice`) emit nothing: element identity is unchanged and
//! consumers that care about order replace the sequence wholesale.
//!
//! # Ignore rule
//!
//! A predicate supplied at construction exempts matching paths from
//! notification entirely, for every operate kind. This keeps fields mutable
//! without triggering recompilation (per-frame transform writes from a
//! control layer, for example).
//!
//! # Concurrency
//!
//! Synchronous and single-threaded. Notification is delivered inline before
//! the mutating call returns; re-entrant mutations from inside a subscriber
//! are queued by the bus and delivered before the outermost call returns.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use super::arena::{Arena, NodeData, NodeId};
use super::patch::{IgnoreRule, Operate, Patch, Path};
use crate::bus::ChangeBus;
use crate::error::{Error, Result};

struct StoreInner {
    arena: Arena,
    ignore: Option<IgnoreRule>,
}

/// One module's config table with change tracking.
///
/// Cloning the handle shares the underlying tree and bus.
#[derive(Clone)]
pub struct ReactiveStore {
    inner: Rc<RefCell<StoreInner>>,
    bus: ChangeBus,
}

impl ReactiveStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an empty store with an ignore rule.
    ///
    /// The rule receives the full key sequence (container path plus key) of
    /// every would-be patch; returning `true` suppresses the notification.
    pub fn with_ignore(rule: impl Fn(&[String]) -> bool + 'static) -> Self {
        Self::build(Some(Box::new(rule)))
    }

    fn build(ignore: Option<IgnoreRule>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                arena: Arena::new(),
                ignore,
            })),
            bus: ChangeBus::new(),
        }
    }

    /// The bus this store publishes on.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Snapshot the value at a path. An empty path snapshots the whole
    /// table.
    pub fn get(&self, path: &[&str]) -> Option<Value> {
        let inner = self.inner.borrow();
        let id = inner.arena.resolve(path)?;
        inner.arena.snapshot(id)
    }

    /// Whether a container holds the given key.
    pub fn contains(&self, path: &[&str], key: &str) -> bool {
        let inner = self.inner.borrow();
        inner
            .arena
            .resolve(path)
            .and_then(|id| inner.arena.child(id, key))
            .is_some()
    }

    /// Number of entries in the container at a path.
    pub fn len(&self, path: &[&str]) -> Option<usize> {
        let inner = self.inner.borrow();
        match inner.arena.data(inner.arena.resolve(path)?)? {
            NodeData::Object(children) => Some(children.len()),
            NodeData::Sequence(children) => Some(children.len()),
            NodeData::Leaf(_) => None,
        }
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.len(&[]).unwrap_or(0) == 0
    }

    /// Write a value under `key` in the container at `path`.
    ///
    /// A previously absent key emits an add; an existing key is replaced
    /// and emits a set. On a sequence container the key is a decimal index;
    /// writing one past the end appends.
    pub fn set(&self, path: &[&str], key: &str, value: Value) -> Result<()> {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            let container = inner
                .arena
                .resolve(path)
                .ok_or_else(|| Error::PathNotFound(join(path)))?;

            let operate = match inner.arena.data(container) {
                Some(NodeData::Object(_)) => {
                    let existing = inner.arena.child(container, key);
                    if let Some(old) = existing {
                        inner.arena.free_tree(old);
                    }
                    let child = inner
                        .arena
                        .insert_tree(Some((container, key.to_string())), &value);
                    if let Some(NodeData::Object(children)) = inner.arena.data_mut(container) {
                        children.insert(key.to_string(), child);
                    }
                    if existing.is_some() {
                        Operate::Set
                    } else {
                        Operate::Add
                    }
                }
                Some(NodeData::Sequence(children)) => {
                    let len = children.len();
                    let index: usize = key
                        .parse()
                        .map_err(|_| Error::PathNotFound(join_key(path, key)))?;
                    match index.cmp(&len) {
                        Ordering::Less => {
                            let old = inner.arena.child(container, key);
                            if let Some(old) = old {
                                inner.arena.free_tree(old);
                            }
                            let child = inner
                                .arena
                                .insert_tree(Some((container, key.to_string())), &value);
                            if let Some(NodeData::Sequence(children)) =
                                inner.arena.data_mut(container)
                            {
                                children[index] = child;
                            }
                            Operate::Set
                        }
                        Ordering::Equal => {
                            let child = inner
                                .arena
                                .insert_tree(Some((container, key.to_string())), &value);
                            if let Some(NodeData::Sequence(children)) =
                                inner.arena.data_mut(container)
                            {
                                children.push(child);
                            }
                            Operate::Add
                        }
                        Ordering::Greater => {
                            return Err(Error::PathNotFound(join_key(path, key)));
                        }
                    }
                }
                _ => return Err(Error::NotAContainer(join(path))),
            };

            inner.make_patch(container, operate, key, value)
        };
        self.publish_all(pending);
        Ok(())
    }

    /// Remove `key` from the object container at `path`, returning the old
    /// value.
    ///
    /// Per-element deletion on sequences is unsupported: index semantics
    /// after an element removal are only well defined through the bulk
    /// mutators (`pop`, `shift`, `splice`), which reconcile into granular
    /// notifications. Aiming this at a sequence returns
    /// [`Error::NotAContainer`].
    pub fn delete(&self, path: &[&str], key: &str) -> Result<Value> {
        let (old, pending) = {
            let mut inner = self.inner.borrow_mut();
            let container = inner
                .arena
                .resolve(path)
                .ok_or_else(|| Error::PathNotFound(join(path)))?;
            match inner.arena.data(container) {
                Some(NodeData::Object(_)) => {}
                _ => return Err(Error::NotAContainer(join(path))),
            }

            let child = inner
                .arena
                .child(container, key)
                .ok_or_else(|| Error::PathNotFound(join_key(path, key)))?;
            let old = inner
                .arena
                .snapshot(child)
                .ok_or_else(|| Error::PathNotFound(join_key(path, key)))?;
            inner.arena.free_tree(child);
            if let Some(NodeData::Object(children)) = inner.arena.data_mut(container) {
                children.shift_remove(key);
            }

            let pending = inner.make_patch(container, Operate::Delete, key, old.clone());
            (old, pending)
        };
        self.publish_all(pending);
        Ok(old)
    }

    /// Append a value to the sequence at `path`. Emits a single add keyed
    /// by the new index.
    pub fn push(&self, path: &[&str], value: Value) -> Result<()> {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            let seq = inner.require_sequence(path)?;
            let index = inner.sequence_len(seq);
            let child = inner
                .arena
                .insert_tree(Some((seq, index.to_string())), &value);
            if let Some(NodeData::Sequence(children)) = inner.arena.data_mut(seq) {
                children.push(child);
            }
            inner.make_patch(seq, Operate::Add, &index.to_string(), value)
        };
        self.publish_all(pending);
        Ok(())
    }

    /// Remove the last element of the sequence at `path`.
    pub fn pop(&self, path: &[&str]) -> Result<Option<Value>> {
        let (removed, pending) = {
            let mut inner = self.inner.borrow_mut();
            let seq = inner.require_sequence(path)?;
            let old = inner.sequence_values(seq);
            if old.is_empty() {
                return Ok(None);
            }

            let child = match inner.arena.data_mut(seq) {
                Some(NodeData::Sequence(children)) => children.pop(),
                _ => None,
            };
            if let Some(child) = child {
                inner.arena.free_tree(child);
            }
            let removed = old[old.len() - 1].clone();
            let pending = inner.reconcile(seq, &old);
            (removed, pending)
        };
        self.publish_all(pending);
        Ok(Some(removed))
    }

    /// Remove the first element of the sequence at `path`.
    pub fn shift(&self, path: &[&str]) -> Result<Option<Value>> {
        let (removed, pending) = {
            let mut inner = self.inner.borrow_mut();
            let seq = inner.require_sequence(path)?;
            let old = inner.sequence_values(seq);
            if old.is_empty() {
                return Ok(None);
            }

            let child = match inner.arena.data_mut(seq) {
                Some(NodeData::Sequence(children)) if !children.is_empty() => {
                    Some(children.remove(0))
                }
                _ => None,
            };
            if let Some(child) = child {
                inner.arena.free_tree(child);
            }
            inner.arena.retag_sequence(seq);
            let removed = old[0].clone();
            let pending = inner.reconcile(seq, &old);
            (removed, pending)
        };
        self.publish_all(pending);
        Ok(Some(removed))
    }

    /// Insert a value at the front of the sequence at `path`.
    pub fn unshift(&self, path: &[&str], value: Value) -> Result<()> {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            let seq = inner.require_sequence(path)?;
            let old = inner.sequence_values(seq);

            let child = inner.arena.insert_tree(Some((seq, "0".to_string())), &value);
            if let Some(NodeData::Sequence(children)) = inner.arena.data_mut(seq) {
                children.insert(0, child);
            }
            inner.arena.retag_sequence(seq);
            inner.reconcile(seq, &old)
        };
        self.publish_all(pending);
        Ok(())
    }

    /// Remove `delete_count` elements starting at `start` and insert
    /// `items` in their place, returning the removed values. Out-of-range
    /// arguments are clamped.
    pub fn splice(
        &self,
        path: &[&str],
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let (removed, pending) = {
            let mut inner = self.inner.borrow_mut();
            let seq = inner.require_sequence(path)?;
            let old = inner.sequence_values(seq);

            let start = start.min(old.len());
            let delete_count = delete_count.min(old.len() - start);

            let detached: Vec<NodeId> =
                if let Some(NodeData::Sequence(children)) = inner.arena.data_mut(seq) {
                    children.drain(start..start + delete_count).collect()
                } else {
                    Vec::new()
                };
            for child in detached {
                inner.arena.free_tree(child);
            }
            for (offset, item) in items.iter().enumerate() {
                let child = inner
                    .arena
                    .insert_tree(Some((seq, (start + offset).to_string())), item);
                if let Some(NodeData::Sequence(children)) = inner.arena.data_mut(seq) {
                    children.insert(start + offset, child);
                }
            }
            inner.arena.retag_sequence(seq);

            let removed = old[start..start + delete_count].to_vec();
            let pending = inner.reconcile(seq, &old);
            (removed, pending)
        };
        self.publish_all(pending);
        Ok(removed)
    }

    /// Reverse the sequence at `path` in place.
    ///
    /// Element identity is unchanged, so no notification is emitted;
    /// consumers that need reorder notifications replace the sequence
    /// wholesale.
    pub fn reverse(&self, path: &[&str]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.require_sequence(path)?;
        if let Some(NodeData::Sequence(children)) = inner.arena.data_mut(seq) {
            children.reverse();
        }
        inner.arena.retag_sequence(seq);
        Ok(())
    }

    /// Sort the sequence at `path` by comparing element snapshots.
    ///
    /// Like [`reverse`](Self::reverse), emits no notification.
    pub fn sort_by(
        &self,
        path: &[&str],
        mut compare: impl FnMut(&Value, &Value) -> Ordering,
    ) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.require_sequence(path)?;

        let children: Vec<NodeId> = match inner.arena.data(seq) {
            Some(NodeData::Sequence(children)) => children.clone(),
            _ => return Err(Error::NotAContainer(join(path))),
        };
        let mut keyed: Vec<(NodeId, Value)> = children
            .into_iter()
            .filter_map(|child| inner.arena.snapshot(child).map(|value| (child, value)))
            .collect();
        keyed.sort_by(|a, b| compare(&a.1, &b.1));

        if let Some(NodeData::Sequence(children)) = inner.arena.data_mut(seq) {
            *children = keyed.into_iter().map(|(child, _)| child).collect();
        }
        inner.arena.retag_sequence(seq);
        Ok(())
    }

    fn publish_all(&self, pending: Vec<Patch>) {
        for patch in pending {
            debug!(
                operate = ?patch.operate,
                path = %patch.path.join("/"),
                key = %patch.key,
                "store patch"
            );
            self.bus.publish(patch);
        }
    }
}

impl Default for ReactiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    fn require_sequence(&self, path: &[&str]) -> Result<NodeId> {
        let id = self
            .arena
            .resolve(path)
            .ok_or_else(|| Error::PathNotFound(join(path)))?;
        match self.arena.data(id) {
            Some(NodeData::Sequence(_)) => Ok(id),
            _ => Err(Error::NotAContainer(join(path))),
        }
    }

    fn sequence_len(&self, seq: NodeId) -> usize {
        match self.arena.data(seq) {
            Some(NodeData::Sequence(children)) => children.len(),
            _ => 0,
        }
    }

    fn sequence_values(&self, seq: NodeId) -> Vec<Value> {
        match self.arena.data(seq) {
            Some(NodeData::Sequence(children)) => children
                .iter()
                .filter_map(|child| self.arena.snapshot(*child))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn is_ignored(&self, path: &Path, key: &str) -> bool {
        let Some(rule) = &self.ignore else {
            return false;
        };
        let mut full: Vec<String> = path.to_vec();
        full.push(key.to_string());
        rule(&full)
    }

    /// Build the patch for one mutation, or nothing if the path is ignored.
    fn make_patch(&self, container: NodeId, operate: Operate, key: &str, value: Value) -> Vec<Patch> {
        let path = self.arena.path_of(container);
        if self.is_ignored(&path, key) {
            return Vec::new();
        }
        vec![Patch {
            operate,
            path,
            key: key.to_string(),
            value,
        }]
    }

    /// Derive granular notifications from one bulk sequence mutation.
    ///
    /// Compares the cached pre-mutation values against the current sequence
    /// by membership, in index order. The side with fewer retained elements
    /// decides whether this is a bulk add or a bulk delete; the longer side
    /// is walked and each element absent from the shorter side becomes one
    /// notification, until |old length − new length| have been produced.
    ///
    /// TODO: membership misfires when a sequence holds duplicate scalars;
    /// switch the comparison to a positional diff if such configs appear.
    fn reconcile(&self, seq: NodeId, old: &[Value]) -> Vec<Patch> {
        let new = self.sequence_values(seq);
        let delta = old.len().abs_diff(new.len());
        if delta == 0 {
            return Vec::new();
        }

        let (operate, longer, shorter) = if old.len() >= new.len() {
            (Operate::Delete, old, new.as_slice())
        } else {
            (Operate::Add, new.as_slice(), old)
        };

        let path = self.arena.path_of(seq);
        let mut patches = Vec::new();
        for (index, member) in longer.iter().enumerate() {
            if shorter.contains(member) {
                continue;
            }
            let key = index.to_string();
            if !self.is_ignored(&path, &key) {
                patches.push(Patch {
                    operate,
                    path: path.clone(),
                    key,
                    value: member.clone(),
                });
            }
            if patches.len() == delta {
                break;
            }
        }
        patches
    }
}

fn join(path: &[&str]) -> String {
    path.join("/")
}

fn join_key(path: &[&str], key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", join(path), key)
    }
}
