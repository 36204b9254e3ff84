//! Engine
//!
//! The assembled system: one [`ReactiveStore`] and one [`Compiler`] per
//! installed module, wired through the store's change bus.
//!
//! # How It Works
//!
//! 1. [`install`](Engine::install) registers a [`ModuleDefinition`],
//!    creates the module's store and compiler, and subscribes the
//!    compiler to the store's bus.
//! 2. Every pair of compilers is cross-linked at install time, so any
//!    processor can resolve vids belonging to any other module.
//! 3. [`load`](Engine::load) applies a config document module-by-module
//!    in build order; each table insert flows through the bus and covers
//!    the entry, so producers exist before their consumers resolve them.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use tracing::{info, warn};

use crate::bus::PatchSubscriber;
use crate::error::{Error, Result};
use crate::module::{Compiler, ModuleDefinition, ModuleRegistry};
use crate::store::ReactiveStore;

/// Stores, compilers, and the registry for one running system.
#[derive(Default)]
pub struct Engine {
    registry: ModuleRegistry,
    stores: indexmap::IndexMap<String, ReactiveStore>,
    compilers: indexmap::IndexMap<String, Rc<RefCell<Compiler>>>,
}

impl Engine {
    /// Create an engine with no modules installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one module: register it, wire its store and compiler, and
    /// cross-link it with every previously installed module.
    pub fn install(&mut self, definition: ModuleDefinition) -> Result<()> {
        self.registry.register(&definition)?;
        let module = definition.type_name().to_string();
        let (processors, vid_rule, ignore, extend) = definition.take_parts();

        let store = match ignore {
            Some(rule) => ReactiveStore::with_ignore(rule),
            None => ReactiveStore::new(),
        };
        let mut compiler = Compiler::new(&module, store.clone(), processors, vid_rule);

        for (other_module, other) in &self.compilers {
            let mut other = other.borrow_mut();
            other.link(&module, compiler.map());
            compiler.link(other_module, other.map());
        }
        if let Some(extend) = extend {
            extend(&mut compiler);
        }

        let compiler = Rc::new(RefCell::new(compiler));
        let subscriber: Rc<RefCell<dyn PatchSubscriber>> = compiler.clone();
        store.bus().subscribe(&subscriber);

        info!(module = %module, "module installed");
        self.stores.insert(module.clone(), store);
        self.compilers.insert(module, compiler);
        Ok(())
    }

    /// Install a batch of modules in ascending lifecycle order, ties by
    /// the order given.
    pub fn assemble(&mut self, definitions: Vec<ModuleDefinition>) -> Result<()> {
        let mut definitions = definitions;
        definitions.sort_by_key(ModuleDefinition::lifecycle_rank);
        for definition in definitions {
            self.install(definition)?;
        }
        Ok(())
    }

    /// The module catalog.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// The config store for a module type.
    pub fn store(&self, module: &str) -> Result<ReactiveStore> {
        self.stores
            .get(module)
            .cloned()
            .ok_or_else(|| Error::ModuleNotFound(module.to_string()))
    }

    /// The compiler for a module type.
    pub fn compiler(&self, module: &str) -> Result<Rc<RefCell<Compiler>>> {
        self.compilers
            .get(module)
            .cloned()
            .ok_or_else(|| Error::ModuleNotFound(module.to_string()))
    }

    /// A fresh default config for a concrete type, with `type` set and a
    /// newly generated vid.
    pub fn generate_config(&self, concrete_type: &str) -> Result<Value> {
        self.registry.default_config(concrete_type)
    }

    /// Apply a config document, keyed `module type → [config, ...]`.
    ///
    /// Modules are processed in build order so cross-referenced producers
    /// are compiled before their consumers. Entries for uninstalled
    /// modules, and entries missing a string `vid`, are logged and
    /// skipped; one bad entry never blocks the rest of the document.
    pub fn load(&mut self, document: &Value) -> Result<()> {
        let Some(tables) = document.as_object() else {
            return Err(Error::NotAContainer("document root".to_string()));
        };

        for module in self.registry.build_order() {
            let Some(configs) = tables.get(&module).and_then(Value::as_array) else {
                continue;
            };
            let store = self.store(&module)?;
            for config in configs {
                let Some(vid) = config.get("vid").and_then(Value::as_str) else {
                    warn!(module = %module, "config without a vid skipped");
                    continue;
                };
                store.set(&[], vid, config.clone())?;
            }
        }

        for module in tables.keys() {
            if !self.registry.contains(module) {
                warn!(module = %module, "document section for uninstalled module ignored");
            }
        }
        Ok(())
    }

    /// Delete a config entry, disposing its runtime object through the
    /// bus-driven pipeline.
    pub fn remove_config(&self, module: &str, vid: &str) -> Result<()> {
        let store = self.store(module)?;
        store.delete(&[], vid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Processor;
    use serde_json::json;

    fn plain_processor(type_name: &str) -> Processor {
        Processor::new(
            type_name,
            || json!({}),
            |ctx| Ok(Box::new(ctx.config.clone())),
            drop,
        )
    }

    fn module(type_name: &str, lifecycle: u32, concrete: &str) -> ModuleDefinition {
        ModuleDefinition::new(type_name)
            .lifecycle(lifecycle)
            .processor(plain_processor(concrete))
            .vid_rule(|_| true)
    }

    #[test]
    fn install_rejects_duplicates_and_resolves_handles() {
        let mut engine = Engine::new();
        engine.install(module("geometry", 1, "BoxGeometry")).unwrap();

        assert!(engine.install(module("geometry", 2, "Torus")).is_err());
        assert!(engine.store("geometry").is_ok());
        assert!(engine.compiler("geometry").is_ok());
        assert!(matches!(
            engine.store("material"),
            Err(Error::ModuleNotFound(_))
        ));
    }

    #[test]
    fn table_inserts_compile_through_the_bus() {
        let mut engine = Engine::new();
        engine.install(module("geometry", 1, "BoxGeometry")).unwrap();

        let store = engine.store("geometry").unwrap();
        store
            .set(&[], "g1", json!({ "vid": "g1", "type": "BoxGeometry", "width": 2 }))
            .unwrap();

        let compiler = engine.compiler("geometry").unwrap();
        let map = compiler.borrow().map();
        assert!(map.borrow().contains("g1"));
    }

    #[test]
    fn assemble_installs_in_lifecycle_order() {
        let mut engine = Engine::new();
        engine
            .assemble(vec![
                module("mesh", 3, "Mesh"),
                module("geometry", 1, "BoxGeometry"),
                module("material", 2, "BasicMaterial"),
            ])
            .unwrap();

        assert_eq!(
            engine.registry().build_order(),
            vec!["geometry", "material", "mesh"]
        );
        // Cross-links run both ways regardless of install order.
        let geometry = engine.compiler("geometry").unwrap();
        let mesh = engine.compiler("mesh").unwrap();
        assert!(geometry.borrow().map().borrow().is_empty());
        assert!(mesh.borrow().map().borrow().is_empty());
    }

    #[test]
    fn generate_config_uses_registered_factories() {
        let mut engine = Engine::new();
        engine.install(module("geometry", 1, "BoxGeometry")).unwrap();

        let config = engine.generate_config("BoxGeometry").unwrap();
        assert_eq!(config["type"], "BoxGeometry");
        assert!(config["vid"].as_str().is_some());
        assert!(engine.generate_config("Torus").is_err());
    }

    #[test]
    fn remove_config_disposes_through_the_bus() {
        let mut engine = Engine::new();
        engine.install(module("geometry", 1, "BoxGeometry")).unwrap();
        let store = engine.store("geometry").unwrap();
        store
            .set(&[], "g1", json!({ "vid": "g1", "type": "BoxGeometry" }))
            .unwrap();

        engine.remove_config("geometry", "g1").unwrap();
        let compiler = engine.compiler("geometry").unwrap();
        assert!(compiler.borrow().map().borrow().is_empty());
        // Store entry is gone as well.
        assert!(store.get(&["g1"]).is_none());
    }
}
