//! Compiler
//!
//! One compiler per module. It owns the module's `vid ↔ runtime object`
//! maps, receives patches from the change bus, and delegates each one to
//! the processor matching the entry's concrete type.
//!
//! # How Patches Route
//!
//! The compiler subscribes to its module's store. A patch whose path is
//! empty addresses the table itself:
//!
//! - add/set of a vid key → [`cover`](Compiler::cover): construct (or
//!   locate) the runtime object and synchronize every field.
//! - delete of a vid key → [`remove`](Compiler::remove): dispose the
//!   runtime object and evict both map entries.
//!
//! Any other patch addresses a field inside one entry: the first path
//! segment is the vid, the remainder is forwarded to
//! [`compile`](Compiler::compile).
//!
//! Failures during bus-driven routing are logged and skipped rather than
//! propagated: one malformed entry must never block synchronization of
//! unrelated entries.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use super::link::{InstanceMap, LinkSet, SharedInstanceMap};
use super::processor::{ConstructContext, ProcessContext, Processor};
use crate::bus::PatchSubscriber;
use crate::error::{Error, Result};
use crate::store::{Operate, Patch, Path, ReactiveStore};

/// Notification that a compiler created or disposed a runtime object.
///
/// Emitted after a successful cover/remove so dependent compilers can
/// maintain derived symbol maps.
#[derive(Debug, Clone)]
pub enum CompileEvent {
    Added { module: String, vid: String },
    Removed { module: String, vid: String },
}

/// Receiver of [`CompileEvent`]s.
pub type EventListener = Box<dyn FnMut(&CompileEvent)>;

/// Per-module patch consumer owning the instance maps.
pub struct Compiler {
    module: String,
    store: ReactiveStore,
    processors: indexmap::IndexMap<String, Processor>,
    vid_rule: Rc<dyn Fn(&str) -> bool>,
    map: SharedInstanceMap,
    links: LinkSet,
    listeners: Vec<EventListener>,
}

impl Compiler {
    /// Create a compiler for one module.
    ///
    /// `store` is the module's config table; `processors` cover every
    /// concrete type the module spans; `vid_rule` gates which table keys
    /// are treated as entries.
    pub fn new(
        module: &str,
        store: ReactiveStore,
        processors: Vec<Processor>,
        vid_rule: Rc<dyn Fn(&str) -> bool>,
    ) -> Self {
        let processors = processors
            .into_iter()
            .map(|processor| (processor.type_name().to_string(), processor))
            .collect();
        Self {
            module: module.to_string(),
            store,
            processors,
            vid_rule,
            map: Rc::new(RefCell::new(InstanceMap::new())),
            links: LinkSet::new(),
            listeners: Vec::new(),
        }
    }

    /// The module type this compiler serves.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Shared handle to this module's instance map, for linking into other
    /// compilers.
    pub fn map(&self) -> SharedInstanceMap {
        Rc::clone(&self.map)
    }

    /// Register a foreign map this compiler's processors may consult.
    pub fn link(&mut self, module: &str, map: SharedInstanceMap) {
        self.links.link(module, map);
    }

    /// Register a listener for add/remove events.
    pub fn on_event(&mut self, listener: impl FnMut(&CompileEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Fully synchronize one config entry.
    ///
    /// Locates or constructs the runtime object via the owning processor,
    /// registers both map entries, then applies every top-level field as an
    /// initial set pass so command handlers (including cross-reference
    /// resolution) run. Used for initial load and for re-synchronizing
    /// after [`remove`](Compiler::remove).
    ///
    /// A construction failure propagates and registers nothing.
    pub fn cover(&mut self, config: &Value) -> Result<()> {
        let vid = required_str(config, "vid")?;
        let type_name = required_str(config, "type")?;
        let processor = self
            .processors
            .get(type_name)
            .ok_or_else(|| Error::UnknownConfigType(type_name.to_string()))?;

        if !self.map.borrow().contains(vid) {
            let ctx = ConstructContext {
                vid,
                config,
                links: &self.links,
            };
            let target = processor.construct(&ctx)?;
            self.map.borrow_mut().insert(vid, target);
            debug!(module = %self.module, vid, type_name, "constructed runtime object");
        }

        if let Some(fields) = config.as_object() {
            let mut map = self.map.borrow_mut();
            if let Some(target) = map.get_mut(vid) {
                for (key, value) in fields {
                    if key == "vid" || key == "type" {
                        continue;
                    }
                    let patch = Patch {
                        operate: Operate::Set,
                        path: Path::new(),
                        key: key.clone(),
                        value: value.clone(),
                    };
                    let mut ctx = ProcessContext {
                        vid,
                        config,
                        target: &mut *target,
                        patch: &patch,
                        links: &self.links,
                    };
                    processor.dispatch(&mut ctx);
                }
            }
        }

        self.emit(CompileEvent::Added {
            module: self.module.clone(),
            vid: vid.to_string(),
        });
        Ok(())
    }

    /// Apply one streaming patch to the runtime object for `vid`.
    ///
    /// `patch.path` is relative to the entry root. Fails with
    /// [`Error::UnknownVid`] when no runtime object exists; the failure is
    /// fatal to this compile call only.
    pub fn compile(&mut self, vid: &str, patch: &Patch) -> Result<()> {
        let config = self
            .store
            .get(&[vid])
            .ok_or_else(|| Error::UnknownVid(vid.to_string()))?;
        let type_name = required_str(&config, "type")?;
        let processor = self
            .processors
            .get(type_name)
            .ok_or_else(|| Error::UnknownConfigType(type_name.to_string()))?;

        let mut map = self.map.borrow_mut();
        let target = map
            .get_mut(vid)
            .ok_or_else(|| Error::UnknownVid(vid.to_string()))?;
        let mut ctx = ProcessContext {
            vid,
            config: &config,
            target,
            patch,
            links: &self.links,
        };
        processor.dispatch(&mut ctx);
        Ok(())
    }

    /// Dispose the runtime object for a config entry and evict both map
    /// entries. Safe to call on an already-removed vid (no-op).
    pub fn remove(&mut self, config: &Value) -> Result<()> {
        let vid = required_str(config, "vid")?;
        let Some(target) = self.map.borrow_mut().remove(vid) else {
            return Ok(());
        };

        match config
            .get("type")
            .and_then(Value::as_str)
            .and_then(|type_name| self.processors.get(type_name))
        {
            Some(processor) => processor.dispose(target),
            // No processor to run teardown; dropping still releases the box.
            None => drop(target),
        }
        debug!(module = %self.module, vid, "disposed runtime object");

        self.emit(CompileEvent::Removed {
            module: self.module.clone(),
            vid: vid.to_string(),
        });
        Ok(())
    }

    fn emit(&mut self, event: CompileEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl PatchSubscriber for Compiler {
    fn on_patch(&mut self, patch: &Patch) {
        if patch.path.is_empty() {
            let vid = patch.key.as_str();
            match patch.operate {
                Operate::Add | Operate::Set => {
                    if !(self.vid_rule)(vid) {
                        warn!(module = %self.module, vid, "key rejected by vid rule; not compiled");
                        return;
                    }
                    if let Err(err) = self.cover(&patch.value) {
                        warn!(module = %self.module, vid, %err, "cover failed");
                    }
                }
                Operate::Delete => {
                    if let Err(err) = self.remove(&patch.value) {
                        warn!(module = %self.module, vid, %err, "remove failed");
                    }
                }
            }
            return;
        }

        let vid = patch.path[0].clone();
        let inner = Patch {
            operate: patch.operate,
            path: patch.path[1..].iter().cloned().collect(),
            key: patch.key.clone(),
            value: patch.value.clone(),
        };
        if let Err(err) = self.compile(&vid, &inner) {
            warn!(module = %self.module, vid = %vid, %err, "compile failed");
        }
    }
}

fn required_str<'a>(config: &'a Value, field: &'static str) -> Result<&'a str> {
    config
        .get(field)
        .and_then(Value::as_str)
        .ok_or(Error::MissingField(field))
}
