//! The in-memory scene graph store.
//!
//! Owns the authoritative set of nodes and edges. Mutators only touch the
//! maps; history, validation and broadcast live above this layer. The
//! containment tree is derived from each node's parent back-reference, so a
//! snapshot of a cell is a plain clone of its record.

use crate::cell::{CellId, Edge, Node};
use log::warn;
use std::collections::HashMap;

/// Authoritative in-memory diagram state.
#[derive(Debug, Clone, Default)]
pub struct Diagram {
    nodes: HashMap<CellId, Node>,
    edges: HashMap<CellId, Edge>,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: CellId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: CellId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn edge(&self, id: CellId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub(crate) fn edge_mut(&mut self, id: CellId) -> Option<&mut Edge> {
        self.edges.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Whether any cell (node or edge) has this id.
    pub fn contains(&self, id: CellId) -> bool {
        self.nodes.contains_key(&id) || self.edges.contains_key(&id)
    }

    /// Insert a node. The parent back-reference is stored as given; callers
    /// validate containment before inserting.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    /// Remove a node, cascade-removing every incident edge and re-homing its
    /// children to the removed node's parent (the root if none) so the
    /// containment tree never dangles.
    ///
    /// Missing ids are a logged no-op: remote replays race local deletions.
    pub fn remove_node(&mut self, id: CellId) -> Option<Node> {
        let Some(node) = self.nodes.remove(&id) else {
            warn!("remove_node: {id} is not in the diagram");
            return None;
        };

        let incident: Vec<CellId> = self
            .edges
            .values()
            .filter(|e| e.touches(id))
            .map(|e| e.id)
            .collect();
        for edge_id in incident {
            self.edges.remove(&edge_id);
        }

        for child in self.nodes.values_mut() {
            if child.parent == Some(id) {
                child.parent = node.parent;
            }
        }

        Some(node)
    }

    /// Insert an edge. Endpoint validity is the caller's concern.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.insert(edge.id, edge);
    }

    pub fn remove_edge(&mut self, id: CellId) -> Option<Edge> {
        let removed = self.edges.remove(&id);
        if removed.is_none() {
            warn!("remove_edge: {id} is not in the diagram");
        }
        removed
    }

    /// Every edge that starts or ends at the given node.
    pub fn connected_edges(&self, node: CellId) -> Vec<&Edge> {
        self.edges.values().filter(|e| e.touches(node)).collect()
    }

    /// Re-home a node under a new parent (or the root). Missing node or
    /// parent ids are a logged no-op.
    pub fn set_parent(&mut self, id: CellId, parent: Option<CellId>) {
        if let Some(p) = parent {
            if !self.nodes.contains_key(&p) {
                warn!("set_parent: parent {p} is not in the diagram");
                return;
            }
        }
        match self.nodes.get_mut(&id) {
            Some(node) => node.parent = parent,
            None => warn!("set_parent: {id} is not in the diagram"),
        }
    }

    /// Direct children of a node.
    pub fn children(&self, id: CellId) -> Vec<CellId> {
        self.nodes
            .values()
            .filter(|n| n.parent == Some(id))
            .map(|n| n.id)
            .collect()
    }

    /// All descendants of a node, parents before their children.
    pub fn descendants(&self, id: CellId) -> Vec<CellId> {
        let mut out = Vec::new();
        let mut queue = self.children(id);
        while let Some(next) = queue.pop() {
            queue.extend(self.children(next));
            out.push(next);
        }
        // pop() walks depth-first; re-order so parents precede children
        out.sort_by_key(|c| self.depth(*c));
        out
    }

    /// Whether `ancestor` appears on `of`'s parent chain.
    pub fn is_ancestor(&self, ancestor: CellId, of: CellId) -> bool {
        let mut cursor = self.node(of).and_then(|n| n.parent);
        let mut hops = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.node(current).and_then(|n| n.parent);
            // containment is validated acyclic, but never trust a loop
            hops += 1;
            if hops > self.nodes.len() {
                warn!("is_ancestor: parent chain of {of} does not terminate");
                return false;
            }
        }
        false
    }

    /// Distance from the root along the parent chain.
    fn depth(&self, id: CellId) -> usize {
        let mut depth = 0;
        let mut cursor = self.node(id).and_then(|n| n.parent);
        while let Some(current) = cursor {
            depth += 1;
            if depth > self.nodes.len() {
                break;
            }
            cursor = self.node(current).and_then(|n| n.parent);
        }
        depth
    }

    /// Nodes with no (resolvable) parent.
    pub fn roots(&self) -> Vec<CellId> {
        self.nodes
            .values()
            .filter(|n| match n.parent {
                None => true,
                Some(p) => !self.nodes.contains_key(&p),
            })
            .map(|n| n.id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    // Raw map surgery for transaction rollback: no cascades, no logging.

    pub(crate) fn put_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn put_edge(&mut self, edge: Edge) {
        self.edges.insert(edge.id, edge);
    }

    pub(crate) fn discard(&mut self, id: CellId) {
        self.nodes.remove(&id);
        self.edges.remove(&id);
    }
}
