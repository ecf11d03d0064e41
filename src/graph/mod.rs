//! The editable node graph.
//!
//! Nodes live in an arena and link to each other by [`NodeKey`]; the outside
//! world addresses them by their workspace-unique string id. Variable fields
//! hold variable *ids*, resolved through the [`VariableTable`] only when the
//! graph is translated, so renaming a variable never touches a node.

use crate::error::CompileError;
use crate::step::{FieldMap, Kind};
use ahash::AHashMap;

pub mod variables;
pub mod xml;

pub use variables::{Variable, VariableTable, VariableType};
pub use xml::{graph_to_xml, parse_graph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

/// Editor-only placement data. Not part of the program's meaning.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Layout {
    pub x: f64,
    pub y: f64,
    pub collapsed: bool,
}

/// A named statement slot and the first node of its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub first: Option<NodeKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: Kind,
    pub fields: FieldMap,
    pub slots: Vec<Slot>,
    pub next: Option<NodeKey>,
    pub layout: Option<Layout>,
}

impl Node {
    pub fn slot(&self, name: &str) -> Option<NodeKey> {
        self.slots.iter().find(|s| s.name == name).and_then(|s| s.first)
    }
}

/// A node's structure with ids dropped and variable references resolved to
/// names. Two graphs describe the same program iff their shapes are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeShape {
    pub kind: Kind,
    pub fields: FieldMap,
    pub slots: Vec<(String, Vec<NodeShape>)>,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    by_id: AHashMap<String, NodeKey>,
    roots: Vec<NodeKey>,
    variables: VariableTable,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    /// Creates a detached node. Link it with [`Graph::push_root`],
    /// [`Graph::insert_after`] or [`Graph::attach`].
    pub fn add_node(&mut self, id: impl Into<String>, kind: Kind) -> Result<NodeKey, CompileError> {
        let id = id.into();
        if self.by_id.contains_key(&id) {
            return Err(CompileError::MalformedDocument(format!(
                "duplicate node id '{}'",
                id
            )));
        }
        let key = NodeKey(self.nodes.len());
        let slots = kind
            .slot_names()
            .iter()
            .map(|name| Slot {
                name: name.to_string(),
                first: None,
            })
            .collect();
        self.nodes.push(Some(Node {
            id: id.clone(),
            kind,
            fields: FieldMap::new(),
            slots,
            next: None,
            layout: None,
        }));
        self.by_id.insert(id, key);
        Ok(key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key.0).and_then(Option::as_mut)
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.by_id.get(id).copied()
    }

    fn require(&mut self, key: NodeKey) -> Result<&mut Node, CompileError> {
        self.node_mut(key)
            .ok_or_else(|| CompileError::MalformedDocument(format!("no node with key {:?}", key)))
    }

    pub fn set_field(
        &mut self,
        key: NodeKey,
        field: &str,
        value: impl Into<String>,
    ) -> Result<(), CompileError> {
        self.require(key)?
            .fields
            .insert(field.to_string(), value.into());
        Ok(())
    }

    pub fn set_layout(&mut self, key: NodeKey, layout: Layout) -> Result<(), CompileError> {
        self.require(key)?.layout = Some(layout);
        Ok(())
    }

    /// Starts a new top-level statement chain.
    pub fn push_root(&mut self, key: NodeKey) {
        self.roots.push(key);
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    /// Splices the chain starting at `node` in directly after `prev`; whatever
    /// followed `prev` moves behind the spliced chain's tail.
    pub fn insert_after(&mut self, prev: NodeKey, node: NodeKey) -> Result<(), CompileError> {
        self.require(node)?;
        let rest = self.require(prev)?.next.replace(node);
        if let Some(rest) = rest {
            let tail = self.chain(Some(node)).last().copied().unwrap_or(node);
            self.require(tail)?.next = Some(rest);
        }
        Ok(())
    }

    /// Appends `child` at the end of `parent`'s statement slot.
    pub fn attach(&mut self, parent: NodeKey, slot: &str, child: NodeKey) -> Result<(), CompileError> {
        let node = self.require(parent)?;
        let (kind, id) = (node.kind, node.id.clone());
        let slot_ref = node
            .slots
            .iter_mut()
            .find(|s| s.name == slot)
            .ok_or_else(|| CompileError::InvalidField {
                element_id: id,
                field: slot.to_string(),
                message: format!("'{}' has no statement slot named '{}'", kind, slot),
            })?;
        let Some(first) = slot_ref.first else {
            slot_ref.first = Some(child);
            return Ok(());
        };
        let last = self.chain(Some(first)).last().copied().unwrap_or(first);
        self.insert_after(last, child)
    }

    /// Keys of a statement chain in order.
    pub fn chain(&self, first: Option<NodeKey>) -> Vec<NodeKey> {
        let mut keys = Vec::new();
        let mut cursor = first;
        while let Some(key) = cursor {
            if keys.contains(&key) {
                break;
            }
            keys.push(key);
            cursor = self.node(key).and_then(|n| n.next);
        }
        keys
    }

    /// Deletes a node and everything nested in its slots. The node's chain
    /// successor takes its place. Returns the ids of all deleted nodes.
    pub fn remove(&mut self, key: NodeKey) -> Result<Vec<String>, CompileError> {
        let successor = self.require(key)?.next;

        for root in self.roots.iter_mut() {
            if *root == key {
                if let Some(next) = successor {
                    *root = next;
                }
            }
        }
        if successor.is_none() {
            self.roots.retain(|root| *root != key);
        }
        for node in self.nodes.iter_mut().flatten() {
            if node.next == Some(key) {
                node.next = successor;
            }
            for slot in node.slots.iter_mut() {
                if slot.first == Some(key) {
                    slot.first = successor;
                }
            }
        }

        let mut removed = Vec::new();
        self.delete_subtree(key, &mut removed);
        Ok(removed)
    }

    fn delete_subtree(&mut self, key: NodeKey, removed: &mut Vec<String>) {
        let Some(node) = self.nodes.get_mut(key.0).and_then(Option::take) else {
            return;
        };
        self.by_id.remove(&node.id);
        removed.push(node.id);
        for slot in node.slots {
            for child in self.chain(slot.first) {
                self.delete_subtree(child, removed);
            }
        }
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The id-free, layout-free structure of every top-level chain.
    pub fn shape(&self) -> Vec<Vec<NodeShape>> {
        self.roots
            .iter()
            .map(|root| self.chain_shape(Some(*root)))
            .collect()
    }

    fn chain_shape(&self, first: Option<NodeKey>) -> Vec<NodeShape> {
        self.chain(first)
            .into_iter()
            .filter_map(|key| self.node(key))
            .map(|node| {
                let mut fields = node.fields.clone();
                for spec in node.kind.variable_fields() {
                    if let Some(value) = fields.get_mut(spec.key) {
                        if let Some(name) = self.variables.name_of(value) {
                            *value = name.to_string();
                        }
                    }
                }
                NodeShape {
                    kind: node.kind,
                    fields,
                    slots: node
                        .slots
                        .iter()
                        .map(|slot| (slot.name.clone(), self.chain_shape(slot.first)))
                        .collect(),
                }
            })
            .collect()
    }
}
