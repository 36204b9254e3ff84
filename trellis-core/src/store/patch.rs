//! Patch types.
//!
//! A patch is the minimal notification a [`ReactiveStore`] emits for one
//! mutation: which operation happened, where in the tree, and with what
//! value. Patches stream through the [`ChangeBus`] in mutation order and are
//! the only channel by which compilers learn about config edits.
//!
//! [`ReactiveStore`]: crate::store::ReactiveStore
//! [`ChangeBus`]: crate::bus::ChangeBus

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

/// An ordered key sequence from the table root to a node.
///
/// Config trees are shallow in practice, so the common case stays inline.
pub type Path = SmallVec<[String; 8]>;

/// The kind of mutation a patch describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operate {
    /// A key that did not exist before was written.
    Add,
    /// An existing key was overwritten.
    Set,
    /// A key was removed. The patch carries the old value.
    Delete,
}

/// One minimal mutation notification.
///
/// `path` addresses the mutated *container*; `key` is the field or index
/// (as a decimal string) inside it. For `Add`/`Set` the value is the newly
/// written data; for `Delete` it is the data that was removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub operate: Operate,
    pub path: Path,
    pub key: String,
    pub value: Value,
}

impl Patch {
    /// Iterate the full key sequence of the mutation: every path segment,
    /// then the key. This is the order command tables are walked in.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.key.as_str()))
    }
}

/// Predicate exempting paths from notification.
///
/// The rule receives the full key sequence (container path plus key) of a
/// would-be patch; returning `true` suppresses it for every operate kind.
/// Used to keep fields mutable without triggering recompilation, such as
/// transform fields a control layer writes every frame.
pub type IgnoreRule = Box<dyn Fn(&[String]) -> bool>;
