//! Module Registry
//!
//! A module bundles everything one config domain needs: its module type,
//! the processors covering its concrete types, the vid rule gating its
//! table keys, and its lifecycle rank. The registry records installed
//! modules, rejects duplicates, and answers two global questions: what
//! order should modules be brought up in, and what is the default config
//! for a given concrete type.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use super::compiler::Compiler;
use super::processor::Processor;
use crate::error::{Error, Result};
use crate::store::IgnoreRule;
use crate::vid;

/// Hook run against a module's compiler after wiring, for modules that
/// need extra listeners or links beyond the standard pairwise setup.
pub type ExtendHook = Box<dyn Fn(&mut Compiler)>;

/// Everything required to install one module.
pub struct ModuleDefinition {
    type_name: String,
    lifecycle: u32,
    processors: Vec<Processor>,
    vid_rule: Rc<dyn Fn(&str) -> bool>,
    ignore: Option<IgnoreRule>,
    extend: Option<ExtendHook>,
}

impl ModuleDefinition {
    /// Start a definition for a module type. Lifecycle defaults to `0`
    /// and the vid rule to [`vid::default_rule`].
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            lifecycle: 0,
            processors: Vec::new(),
            vid_rule: Rc::new(vid::default_rule),
            ignore: None,
            extend: None,
        }
    }

    /// Set the lifecycle rank. Lower ranks are installed and loaded
    /// first; producers of cross-referenced objects should rank below
    /// their consumers.
    pub fn lifecycle(mut self, rank: u32) -> Self {
        self.lifecycle = rank;
        self
    }

    /// Add a processor for one of this module's concrete types.
    pub fn processor(mut self, processor: Processor) -> Self {
        self.processors.push(processor);
        self
    }

    /// Override the rule deciding which table keys are compiled entries.
    pub fn vid_rule(mut self, rule: impl Fn(&str) -> bool + 'static) -> Self {
        self.vid_rule = Rc::new(rule);
        self
    }

    /// Exempt paths in this module's store from change notification.
    pub fn ignore(mut self, rule: IgnoreRule) -> Self {
        self.ignore = Some(rule);
        self
    }

    /// Attach a post-wiring hook.
    pub fn extend(mut self, hook: impl Fn(&mut Compiler) + 'static) -> Self {
        self.extend = Some(Box::new(hook));
        self
    }

    /// The module type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn lifecycle_rank(&self) -> u32 {
        self.lifecycle
    }

    pub(crate) fn take_parts(
        self,
    ) -> (
        Vec<Processor>,
        Rc<dyn Fn(&str) -> bool>,
        Option<IgnoreRule>,
        Option<ExtendHook>,
    ) {
        (self.processors, self.vid_rule, self.ignore, self.extend)
    }
}

/// Registered metadata for one module.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub type_name: String,
    pub lifecycle: u32,
    pub concrete_types: Vec<String>,
}

/// Catalog of installed modules and their config factories.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, ModuleInfo>,
    factories: IndexMap<String, Rc<dyn Fn() -> Value>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a module's metadata and harvest its config factories.
    ///
    /// Fails with [`Error::DuplicateType`] when the module type, or any of
    /// its concrete types, is already registered.
    pub fn register(&mut self, definition: &ModuleDefinition) -> Result<()> {
        if self.modules.contains_key(&definition.type_name) {
            return Err(Error::DuplicateType(definition.type_name.clone()));
        }
        for processor in &definition.processors {
            if self.factories.contains_key(processor.type_name()) {
                return Err(Error::DuplicateType(processor.type_name().to_string()));
            }
        }

        let mut concrete_types = Vec::with_capacity(definition.processors.len());
        for processor in &definition.processors {
            concrete_types.push(processor.type_name().to_string());
            self.factories
                .insert(processor.type_name().to_string(), processor.config_factory());
        }
        self.modules.insert(
            definition.type_name.clone(),
            ModuleInfo {
                type_name: definition.type_name.clone(),
                lifecycle: definition.lifecycle,
                concrete_types,
            },
        );
        Ok(())
    }

    /// Metadata for a module type.
    pub fn resolve(&self, type_name: &str) -> Result<&ModuleInfo> {
        self.modules
            .get(type_name)
            .ok_or_else(|| Error::ModuleNotFound(type_name.to_string()))
    }

    /// Whether a module type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.modules.contains_key(type_name)
    }

    /// Module types in bring-up order: ascending lifecycle rank, ties
    /// broken by registration order.
    pub fn build_order(&self) -> Vec<String> {
        let mut order: Vec<&ModuleInfo> = self.modules.values().collect();
        order.sort_by_key(|info| info.lifecycle);
        order.into_iter().map(|info| info.type_name.clone()).collect()
    }

    /// The module type owning a concrete config type.
    pub fn module_of(&self, concrete_type: &str) -> Result<&str> {
        self.modules
            .values()
            .find(|info| info.concrete_types.iter().any(|t| t == concrete_type))
            .map(|info| info.type_name.as_str())
            .ok_or_else(|| Error::UnknownConfigType(concrete_type.to_string()))
    }

    /// A fresh default config for a concrete type, with the `type`
    /// discriminator set and a newly generated vid.
    pub fn default_config(&self, concrete_type: &str) -> Result<Value> {
        let factory = self
            .factories
            .get(concrete_type)
            .ok_or_else(|| Error::UnknownConfigType(concrete_type.to_string()))?;
        let mut config = factory();
        if let Value::Object(fields) = &mut config {
            fields.insert(
                "type".to_string(),
                Value::String(concrete_type.to_string()),
            );
            fields.insert("vid".to_string(), Value::String(vid::generate()));
        }
        Ok(config)
    }

    /// Registered module types in registration order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.values()
    }
}
