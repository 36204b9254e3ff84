//! Config Tree Arena
//!
//! The config tree is stored as an arena of nodes addressed by index. Each
//! node records its parent index and the key it lives under, giving every
//! node a non-owning back-reference used for exactly one thing: rebuilding
//! the path from a mutated node to the table root. No cyclic ownership is
//! involved; the arena owns every node, parents reference children by id,
//! and children reference parents by id.
//!
//! # Design Decisions
//!
//! 1. Objects use an ordered map so field order survives snapshots; sequence
//!    children are keyed by their decimal index.
//!
//! 2. Detached subtrees are returned to a free list and their slots reused,
//!    so long-lived stores do not grow with churn.
//!
//! 3. After a sequence mutation that shifts elements, the parent keys of the
//!    surviving children are re-tagged with their new indices. Path
//!    reconstruction stays a pure index walk.

use indexmap::IndexMap;
use serde_json::Value;

use super::patch::Path;

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The payload of one node.
#[derive(Debug)]
pub enum NodeData {
    /// A nested record. Field order is preserved.
    Object(IndexMap<String, NodeId>),
    /// An ordered sequence.
    Sequence(Vec<NodeId>),
    /// A plain scalar value.
    Leaf(Value),
}

#[derive(Debug)]
struct Slot {
    /// Parent index and the key this node lives under. `None` for the root.
    parent: Option<(NodeId, String)>,
    data: NodeData,
}

#[derive(Debug)]
enum Entry {
    Occupied(Slot),
    Vacant,
}

/// Arena of config tree nodes.
#[derive(Debug)]
pub struct Arena {
    entries: Vec<Entry>,
    free: Vec<usize>,
    root: NodeId,
}

impl Arena {
    /// Create an arena holding an empty root object.
    pub fn new() -> Self {
        let mut arena = Self {
            entries: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        arena.root = arena.alloc(None, NodeData::Object(IndexMap::new()));
        arena
    }

    /// The table root.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, parent: Option<(NodeId, String)>, data: NodeData) -> NodeId {
        let slot = Slot { parent, data };
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = Entry::Occupied(slot);
                NodeId(index)
            }
            None => {
                self.entries.push(Entry::Occupied(slot));
                NodeId(self.entries.len() - 1)
            }
        }
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        match self.entries.get(id.0) {
            Some(Entry::Occupied(slot)) => Some(slot),
            _ => None,
        }
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        match self.entries.get_mut(id.0) {
            Some(Entry::Occupied(slot)) => Some(slot),
            _ => None,
        }
    }

    /// The payload of a node.
    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.slot(id).map(|slot| &slot.data)
    }

    /// Mutable payload of a node.
    pub fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slot_mut(id).map(|slot| &mut slot.data)
    }

    /// Insert a plain value tree under `parent`, returning the new node.
    ///
    /// Containers are converted recursively; every created node is tagged
    /// with its parent index and key. The caller is responsible for wiring
    /// the returned id into the parent's container.
    pub fn insert_tree(&mut self, parent: Option<(NodeId, String)>, value: &Value) -> NodeId {
        match value {
            Value::Object(fields) => {
                let id = self.alloc(parent, NodeData::Object(IndexMap::new()));
                for (key, child_value) in fields {
                    let child = self.insert_tree(Some((id, key.clone())), child_value);
                    if let Some(NodeData::Object(children)) = self.data_mut(id) {
                        children.insert(key.clone(), child);
                    }
                }
                id
            }
            Value::Array(items) => {
                let id = self.alloc(parent, NodeData::Sequence(Vec::new()));
                for (index, item) in items.iter().enumerate() {
                    let child = self.insert_tree(Some((id, index.to_string())), item);
                    if let Some(NodeData::Sequence(children)) = self.data_mut(id) {
                        children.push(child);
                    }
                }
                id
            }
            leaf => self.alloc(parent, NodeData::Leaf(leaf.clone())),
        }
    }

    /// Rebuild a subtree rooted at `id` into a plain value.
    pub fn snapshot(&self, id: NodeId) -> Option<Value> {
        match self.data(id)? {
            NodeData::Leaf(value) => Some(value.clone()),
            NodeData::Object(children) => {
                let mut fields = serde_json::Map::new();
                for (key, child) in children {
                    fields.insert(key.clone(), self.snapshot(*child)?);
                }
                Some(Value::Object(fields))
            }
            NodeData::Sequence(children) => {
                let items = children
                    .iter()
                    .map(|child| self.snapshot(*child))
                    .collect::<Option<Vec<_>>>()?;
                Some(Value::Array(items))
            }
        }
    }

    /// Detach a subtree and return its slots to the free list.
    ///
    /// The caller removes the id from the parent container; the root is
    /// never freed.
    pub fn free_tree(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let Some(entry) = self.entries.get_mut(id.0) else {
            return;
        };
        let entry = std::mem::replace(entry, Entry::Vacant);
        let Entry::Occupied(slot) = entry else {
            return;
        };
        match slot.data {
            NodeData::Object(children) => {
                for (_, child) in children {
                    self.free_tree(child);
                }
            }
            NodeData::Sequence(children) => {
                for child in children {
                    self.free_tree(child);
                }
            }
            NodeData::Leaf(_) => {}
        }
        self.free.push(id.0);
    }

    /// Ordered key sequence from the table root to `id`. The root itself
    /// has an empty path. Cost is proportional to depth.
    pub fn path_of(&self, id: NodeId) -> Path {
        let mut segments = Path::new();
        let mut current = id;
        while let Some(slot) = self.slot(current) {
            match &slot.parent {
                Some((parent, key)) => {
                    segments.push(key.clone());
                    current = *parent;
                }
                None => break,
            }
        }
        segments.reverse();
        segments
    }

    /// Child of a container by key. Sequence keys are decimal indices.
    pub fn child(&self, id: NodeId, key: &str) -> Option<NodeId> {
        match self.data(id)? {
            NodeData::Object(children) => children.get(key).copied(),
            NodeData::Sequence(children) => key
                .parse::<usize>()
                .ok()
                .and_then(|index| children.get(index).copied()),
            NodeData::Leaf(_) => None,
        }
    }

    /// Walk a key path from the root.
    pub fn resolve(&self, path: &[&str]) -> Option<NodeId> {
        let mut current = self.root;
        for segment in path {
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    /// Re-tag the children of a sequence with their current indices.
    ///
    /// Required after any mutation that shifts or reorders elements, so
    /// path reconstruction through the survivors stays correct.
    pub fn retag_sequence(&mut self, id: NodeId) {
        let children: Vec<NodeId> = match self.data(id) {
            Some(NodeData::Sequence(children)) => children.clone(),
            _ => return,
        };
        for (index, child) in children.into_iter().enumerate() {
            if let Some(slot) = self.slot_mut(child) {
                slot.parent = Some((id, index.to_string()));
            }
        }
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Total allocated slots, live or vacant.
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
