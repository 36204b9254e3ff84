//! Reactive Config Store
//!
//! This module implements the change-tracking side of the core: a nested
//! plain-data tree whose committed mutations stream out as minimal patches.
//!
//! # Concepts
//!
//! ## Arena
//!
//! The tree lives in an index-addressed arena. Every node carries a
//! non-owning back-reference to its parent (parent index plus key), used
//! only to reconstruct the path of a mutation; ownership always flows
//! root-to-leaf.
//!
//! ## Patches
//!
//! A patch describes exactly one minimal mutation: `{operate, path, key,
//! value}`. Bulk sequence mutations are reconciled into granular per-element
//! patches rather than reported as opaque changes.
//!
//! ## Ignore rules
//!
//! A predicate supplied at construction can exempt paths from notification
//! entirely, for fields that must stay mutable without triggering
//! recompilation.

mod arena;
mod patch;
#[allow(clippy::module_inception)]
mod store;

pub use arena::{Arena, NodeData, NodeId};
pub use patch::{IgnoreRule, Operate, Patch, Path};
pub use store::ReactiveStore;
