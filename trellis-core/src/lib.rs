//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive
//! configuration framework. It implements:
//!
//! - A reactive config store emitting minimal patches for every mutation
//! - A change bus delivering patches to subscribers exactly once, in order
//! - A module system compiling config entries into live runtime objects
//! - Cross-module reference resolution between compiled objects
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: Nested plain-data config tree and patch generation
//! - `bus`: Patch distribution with re-entrancy-safe queuing
//! - `module`: Processors, compilers, instance maps, and the registry
//! - `engine`: Assembled system wiring stores to compilers
//! - `vid`: Symbolic identifiers naming config entries
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trellis_core::engine::Engine;
//! use trellis_core::module::{ModuleDefinition, Processor};
//!
//! let mut engine = Engine::new();
//! engine.install(
//!     ModuleDefinition::new("geometry")
//!         .lifecycle(1)
//!         .processor(box_geometry_processor()),
//! )?;
//!
//! // Inserting a config entry constructs and synchronizes its object.
//! let store = engine.store("geometry")?;
//! let config = engine.generate_config("BoxGeometry")?;
//! let vid = config["vid"].as_str().unwrap().to_string();
//! store.set(&[], &vid, config)?;
//!
//! // Further mutations stream through as minimal patches.
//! store.set(&[&vid], "width", json!(4.0))?;
//! ```

pub mod bus;
pub mod engine;
pub mod error;
pub mod module;
pub mod store;
pub mod vid;

pub use bus::{ChangeBus, PatchSubscriber, SubscriptionId};
pub use engine::Engine;
pub use error::{Error, Result};
pub use store::{Operate, Patch, ReactiveStore};
