//! Instance Maps and Cross-Reference Resolution
//!
//! Every compiler owns one [`InstanceMap`]: `vid → runtime object`, plus the
//! inverse `target id → vid` kept as a non-owning index used only for
//! lookup, never for lifetime control. Maps are shared between compilers as
//! explicit handles at wiring time; there is no implicit global state.
//!
//! # Cross references
//!
//! When a config field holds a vid belonging to a foreign module, the owning
//! processor resolves it at construct/update time through a [`LinkSet`]: the
//! set of foreign maps this compiler was linked against. Resolution fails
//! soft — if the foreign vid is absent (its producer not yet compiled), a
//! warning is logged and the field stays at its default. Lifecycle ordering
//! minimizes this hazard for initial loads; for references created at
//! runtime, callers re-cover or re-compile once the dependency exists.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::warn;

use super::target::Target;

/// Unique identity of one constructed runtime object.
///
/// Lets the inverse map reference objects without owning or aliasing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct InstanceSlot {
    id: TargetId,
    target: Box<dyn Target>,
}

/// `vid ↔ runtime object` for one module.
#[derive(Default)]
pub struct InstanceMap {
    slots: IndexMap<String, InstanceSlot>,
    vids: HashMap<TargetId, String>,
}

impl InstanceMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runtime object under a vid, returning its identity.
    ///
    /// An existing entry under the same vid is replaced and both of its map
    /// entries evicted; the caller is expected to have disposed it.
    pub fn insert(&mut self, vid: &str, target: Box<dyn Target>) -> TargetId {
        let id = TargetId::new();
        if let Some(previous) = self.slots.insert(
            vid.to_string(),
            InstanceSlot { id, target },
        ) {
            self.vids.remove(&previous.id);
        }
        self.vids.insert(id, vid.to_string());
        id
    }

    /// Evict both entries for a vid, returning the runtime object.
    pub fn remove(&mut self, vid: &str) -> Option<Box<dyn Target>> {
        let slot = self.slots.shift_remove(vid)?;
        self.vids.remove(&slot.id);
        Some(slot.target)
    }

    /// The runtime object for a vid.
    pub fn get(&self, vid: &str) -> Option<&dyn Target> {
        self.slots.get(vid).map(|slot| slot.target.as_ref())
    }

    /// Mutable access to the runtime object for a vid.
    pub fn get_mut(&mut self, vid: &str) -> Option<&mut dyn Target> {
        self.slots.get_mut(vid).map(|slot| slot.target.as_mut())
    }

    /// The identity registered for a vid.
    pub fn target_id(&self, vid: &str) -> Option<TargetId> {
        self.slots.get(vid).map(|slot| slot.id)
    }

    /// Reverse lookup: the vid a runtime object was registered under.
    pub fn vid_of(&self, id: TargetId) -> Option<&str> {
        self.vids.get(&id).map(String::as_str)
    }

    /// Whether a vid has a live runtime object.
    pub fn contains(&self, vid: &str) -> bool {
        self.slots.contains_key(vid)
    }

    /// Number of live runtime objects.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate live vids in registration order.
    pub fn vids(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

/// Shared handle to a module's instance map.
pub type SharedInstanceMap = Rc<RefCell<InstanceMap>>;

/// The foreign maps one compiler may consult, keyed by module type.
#[derive(Default, Clone)]
pub struct LinkSet {
    maps: IndexMap<String, SharedInstanceMap>,
}

impl LinkSet {
    /// Create an empty link set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a foreign map under its module type. Re-linking a module
    /// replaces the handle.
    pub fn link(&mut self, module: &str, map: SharedInstanceMap) {
        self.maps.insert(module.to_string(), map);
    }

    /// Whether a foreign vid currently resolves.
    pub fn contains(&self, module: &str, vid: &str) -> bool {
        self.maps
            .get(module)
            .and_then(|map| map.try_borrow().ok().map(|map| map.contains(vid)))
            .unwrap_or(false)
    }

    /// Resolve a foreign vid and run `f` against its runtime object.
    ///
    /// Fails soft: a missing link, a busy map (the foreign module is
    /// mid-compile), or an absent vid logs a warning and returns `None`;
    /// the caller leaves the field at its default and re-resolves on the
    /// next cover or compile.
    pub fn with_target<R>(
        &self,
        module: &str,
        vid: &str,
        f: impl FnOnce(&mut dyn Target) -> R,
    ) -> Option<R> {
        let Some(map) = self.maps.get(module) else {
            warn!(module, vid, "no linked map for module; reference unresolved");
            return None;
        };
        let Ok(mut map) = map.try_borrow_mut() else {
            warn!(module, vid, "linked map busy; reference unresolved");
            return None;
        };
        match map.get_mut(vid) {
            Some(target) => Some(f(target)),
            None => {
                warn!(module, vid, "broken cross reference; leaving default");
                None
            }
        }
    }

    /// Module types this set is linked against.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }
}
