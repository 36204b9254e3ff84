//! Module System
//!
//! Everything between the config stores and the live runtime objects:
//!
//! 1. A [`Processor`] defines one concrete config type: default config,
//!    construct/dispose, and a command table routing patches to handlers.
//! 2. A [`Compiler`] serves one module: it owns the `vid ↔ object` maps
//!    and applies incoming patches through the matching processor.
//! 3. [`LinkSet`] resolves cross-module vid references at construct and
//!    update time.
//! 4. [`ModuleRegistry`] catalogs installed modules, orders bring-up, and
//!    produces default configs.

mod compiler;
mod link;
mod processor;
mod registry;
mod target;

pub use compiler::{CompileEvent, Compiler, EventListener};
pub use link::{InstanceMap, LinkSet, SharedInstanceMap, TargetId};
pub use processor::{
    CommandTable, Commands, ConstructContext, Handler, ProcessContext, Processor,
};
pub use registry::{ExtendHook, ModuleDefinition, ModuleInfo, ModuleRegistry};
pub use target::Target;
