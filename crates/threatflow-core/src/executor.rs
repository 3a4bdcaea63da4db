//! The operation executor.
//!
//! Every mutation, whatever its producer, runs the same sequence: validate,
//! snapshot the cells about to be touched, mutate the store, re-balance the
//! affected subtree, package the result. The mutate/re-balance half runs
//! inside a snapshot transaction: any fault restores every captured cell, so
//! a failed operation never leaves a partial mutation behind.
//!
//! Inverse construction is diff-based. The transaction compares each
//! captured pre-image with the post-state and emits counter-operations in a
//! replay-safe order, which is what the history coordinator stores.

use crate::cell::{CellId, Edge, Node};
use crate::error::{EngineError, ValidationError};
use crate::graph::Diagram;
use crate::op::{EdgePatch, NodePatch, OpPayload, Operation, ParentPatch};
use crate::rules::{connection, embedding, layering};
use log::error;
use std::collections::HashMap;

/// Result of a successfully executed operation.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The operation as recorded. For a retroactive create of an already
    /// materialized cell this carries the observed state, not the request.
    pub op: Operation,
    /// Counter-operations that reverse this one, in replay order.
    pub inverse: Vec<Operation>,
    /// Every cell the mutation or re-balance changed.
    pub affected: Vec<CellId>,
}

/// Validate, apply and package one operation.
pub(crate) fn execute(diagram: &mut Diagram, op: &Operation) -> Result<Applied, EngineError> {
    if !op.retroactive {
        validate(diagram, op)?;
    }

    let mut txn = Transaction::begin(diagram);
    match apply(&mut txn, op) {
        Ok(recorded) => {
            let (inverse, affected) = txn.commit();
            Ok(Applied {
                op: recorded,
                inverse,
                affected,
            })
        }
        Err(err) => {
            txn.rollback();
            if !err.is_benign_for_replay() {
                error!(
                    "operation {} ({}) rolled back: {err}; payload: {}",
                    op.id,
                    op.payload.kind(),
                    serde_json::to_string(&op.payload).unwrap_or_default()
                );
            }
            Err(err)
        }
    }
}

/// Precondition checks. Nothing is mutated on this path.
fn validate(diagram: &Diagram, op: &Operation) -> Result<(), EngineError> {
    match &op.payload {
        OpPayload::CreateNode { node } => {
            if diagram.contains(node.id) {
                return Err(ValidationError::DuplicateCell(node.id).into());
            }
            if let Some(parent_id) = node.parent {
                let parent = diagram
                    .node(parent_id)
                    .ok_or(EngineError::NotFound(parent_id))?;
                embedding::check_embed(diagram, parent, node)?;
            }
        }
        OpPayload::UpdateNode { id, patch } => {
            let node = diagram.node(*id).ok_or(EngineError::NotFound(*id))?;
            if let ParentPatch::Embed(parent_id) = patch.parent {
                let parent = diagram
                    .node(parent_id)
                    .ok_or(EngineError::NotFound(parent_id))?;
                embedding::check_embed(diagram, parent, node)?;
            }
        }
        OpPayload::DeleteNode { id } => {
            diagram.node(*id).ok_or(EngineError::NotFound(*id))?;
        }
        OpPayload::CreateEdge { edge } => {
            if diagram.contains(edge.id) {
                return Err(ValidationError::DuplicateCell(edge.id).into());
            }
            let source = diagram
                .node(edge.source.node)
                .ok_or(EngineError::NotFound(edge.source.node))?;
            let target = diagram
                .node(edge.target.node)
                .ok_or(EngineError::NotFound(edge.target.node))?;
            connection::check_connect(diagram, edge, source, target)?;
        }
        OpPayload::UpdateEdge { id, patch } => {
            let edge = diagram.edge(*id).ok_or(EngineError::NotFound(*id))?;
            if patch.source.is_some() || patch.target.is_some() {
                let mut probe = edge.clone();
                if let Some(source) = &patch.source {
                    probe.source = source.clone();
                }
                if let Some(target) = &patch.target {
                    probe.target = target.clone();
                }
                let source = diagram
                    .node(probe.source.node)
                    .ok_or(EngineError::NotFound(probe.source.node))?;
                let target = diagram
                    .node(probe.target.node)
                    .ok_or(EngineError::NotFound(probe.target.node))?;
                connection::check_connect(diagram, &probe, source, target)?;
            }
        }
        OpPayload::DeleteEdge { id } => {
            diagram.edge(*id).ok_or(EngineError::NotFound(*id))?;
        }
    }
    Ok(())
}

/// The mutation itself, running entirely through the transaction.
fn apply(txn: &mut Transaction<'_>, op: &Operation) -> Result<Operation, EngineError> {
    let mut recorded = op.clone();
    match &op.payload {
        OpPayload::CreateNode { node } => {
            if op.retroactive {
                if let Some(existing) = txn.diagram().node(node.id) {
                    // The canvas already materialized this cell; record what
                    // is actually there instead of re-creating it.
                    recorded.payload = OpPayload::CreateNode {
                        node: existing.clone(),
                    };
                    return Ok(recorded);
                }
            }
            txn.add_node(node.clone());
            txn.rebalance(node.id);
        }
        OpPayload::UpdateNode { id, patch } => {
            if txn.diagram().node(*id).is_none() {
                return Err(EngineError::NotFound(*id));
            }
            apply_node_patch(txn, *id, patch);
            txn.rebalance(*id);
        }
        OpPayload::DeleteNode { id } => {
            if txn.diagram().node(*id).is_none() {
                return Err(EngineError::NotFound(*id));
            }
            txn.remove_node(*id);
        }
        OpPayload::CreateEdge { edge } => {
            if op.retroactive {
                if let Some(existing) = txn.diagram().edge(edge.id) {
                    recorded.payload = OpPayload::CreateEdge {
                        edge: existing.clone(),
                    };
                    return Ok(recorded);
                }
            }
            if txn.diagram().node(edge.source.node).is_none() {
                return Err(EngineError::NotFound(edge.source.node));
            }
            if txn.diagram().node(edge.target.node).is_none() {
                return Err(EngineError::NotFound(edge.target.node));
            }
            let mut edge = edge.clone();
            if let Some(z) = layering::edge_z(txn.diagram(), edge.source.node, edge.target.node) {
                edge.z = z;
            }
            txn.add_edge(edge);
        }
        OpPayload::UpdateEdge { id, patch } => {
            if txn.diagram().edge(*id).is_none() {
                return Err(EngineError::NotFound(*id));
            }
            apply_edge_patch(txn, *id, patch);
            // Settle onto the (possibly new) endpoints unless the patch
            // pinned an explicit z, which undo replays rely on.
            if patch.z.is_none() {
                let anchors = txn
                    .diagram()
                    .edge(*id)
                    .map(|e| (e.source.node, e.target.node));
                if let Some((source, target)) = anchors {
                    if let Some(z) = layering::edge_z(txn.diagram(), source, target) {
                        txn.update_edge(*id, |e| e.z = z);
                    }
                }
            }
        }
        OpPayload::DeleteEdge { id } => {
            if txn.diagram().edge(*id).is_none() {
                return Err(EngineError::NotFound(*id));
            }
            txn.remove_edge(*id);
        }
    }
    Ok(recorded)
}

fn apply_node_patch(txn: &mut Transaction<'_>, id: CellId, patch: &NodePatch) {
    txn.update_node(id, |node| {
        if let Some(position) = patch.position {
            node.position = position;
        }
        if let Some(size) = patch.size {
            node.size = size;
        }
        if let Some(label) = &patch.label {
            node.label = label.clone();
        }
        if let Some(attrs) = &patch.attrs {
            node.attrs = attrs.clone();
        }
    });
    match patch.parent {
        ParentPatch::Keep => {}
        ParentPatch::Detach => {
            let is_boundary = txn
                .diagram()
                .node(id)
                .map(|n| n.shape.is_boundary())
                .unwrap_or(false);
            txn.set_parent(id, None);
            if is_boundary {
                // unembedding a trust boundary restores the fixed base layer
                txn.update_node(id, |n| n.z = layering::BOUNDARY_Z);
            }
        }
        ParentPatch::Embed(parent) => {
            txn.set_parent(id, Some(parent));
        }
    }
    if let Some(z) = patch.z {
        txn.update_node(id, |n| n.z = z);
    }
}

fn apply_edge_patch(txn: &mut Transaction<'_>, id: CellId, patch: &EdgePatch) {
    txn.update_edge(id, |edge| {
        if let Some(source) = &patch.source {
            edge.source = source.clone();
        }
        if let Some(target) = &patch.target {
            edge.target = target.clone();
        }
        if let Some(vertices) = &patch.vertices {
            edge.vertices = vertices.clone();
        }
        if let Some(label) = &patch.label {
            edge.label = label.clone();
        }
        if let Some(z) = patch.z {
            edge.z = z;
        }
    });
}

/// Pre-mutation image of one cell. `None` means the cell did not exist.
#[derive(Debug, Clone)]
enum Snapshot {
    Node(Node),
    Edge(Edge),
}

/// Captures the first pre-image of every cell written through it, so the
/// whole mutation either commits or restores.
struct Transaction<'a> {
    diagram: &'a mut Diagram,
    before: HashMap<CellId, Option<Snapshot>>,
}

impl<'a> Transaction<'a> {
    fn begin(diagram: &'a mut Diagram) -> Self {
        Self {
            diagram,
            before: HashMap::new(),
        }
    }

    fn diagram(&self) -> &Diagram {
        self.diagram
    }

    fn remember(&mut self, id: CellId) {
        if self.before.contains_key(&id) {
            return;
        }
        let snap = if let Some(node) = self.diagram.node(id) {
            Some(Snapshot::Node(node.clone()))
        } else {
            self.diagram.edge(id).map(|e| Snapshot::Edge(e.clone()))
        };
        self.before.insert(id, snap);
    }

    fn add_node(&mut self, node: Node) {
        self.remember(node.id);
        self.diagram.add_node(node);
    }

    fn remove_node(&mut self, id: CellId) {
        let incident: Vec<CellId> = self
            .diagram
            .connected_edges(id)
            .iter()
            .map(|e| e.id)
            .collect();
        for edge_id in incident {
            self.remember(edge_id);
        }
        for child in self.diagram.children(id) {
            self.remember(child);
        }
        self.remember(id);
        self.diagram.remove_node(id);
    }

    fn add_edge(&mut self, edge: Edge) {
        self.remember(edge.id);
        self.diagram.add_edge(edge);
    }

    fn remove_edge(&mut self, id: CellId) {
        self.remember(id);
        self.diagram.remove_edge(id);
    }

    fn update_node(&mut self, id: CellId, f: impl FnOnce(&mut Node)) {
        self.remember(id);
        if let Some(node) = self.diagram.node_mut(id) {
            f(node);
        }
    }

    fn update_edge(&mut self, id: CellId, f: impl FnOnce(&mut Edge)) {
        self.remember(id);
        if let Some(edge) = self.diagram.edge_mut(id) {
            f(edge);
        }
    }

    fn set_parent(&mut self, id: CellId, parent: Option<CellId>) {
        self.remember(id);
        self.diagram.set_parent(id, parent);
    }

    /// Run the layering cascade from `root`, capturing every cell it moves.
    fn rebalance(&mut self, root: CellId) {
        let corrections = layering::subtree_corrections(self.diagram, root);
        for c in &corrections {
            self.remember(c.cell);
        }
        layering::apply_corrections(self.diagram, &corrections);
    }

    /// Restore every captured pre-image.
    fn rollback(self) {
        for (id, snap) in self.before {
            match snap {
                Some(Snapshot::Node(node)) => self.diagram.put_node(node),
                Some(Snapshot::Edge(edge)) => self.diagram.put_edge(edge),
                None => self.diagram.discard(id),
            }
        }
    }

    /// Diff pre-images against the post-state into counter-operations and
    /// the affected id set.
    fn commit(self) -> (Vec<Operation>, Vec<CellId>) {
        let mut affected = Vec::new();
        let mut create_nodes = Vec::new();
        let mut update_nodes = Vec::new();
        let mut create_edges = Vec::new();
        let mut update_edges = Vec::new();
        let mut delete_edges = Vec::new();
        let mut delete_nodes = Vec::new();

        for (id, before) in &self.before {
            match before {
                None => {
                    if self.diagram.node(*id).is_some() {
                        delete_nodes.push(Operation::undo_redo(OpPayload::DeleteNode { id: *id }));
                        affected.push(*id);
                    } else if self.diagram.edge(*id).is_some() {
                        delete_edges.push(Operation::undo_redo(OpPayload::DeleteEdge { id: *id }));
                        affected.push(*id);
                    }
                }
                Some(Snapshot::Node(prev)) => match self.diagram.node(*id) {
                    None => {
                        create_nodes.push(Operation::undo_redo(OpPayload::CreateNode {
                            node: prev.clone(),
                        }));
                        affected.push(*id);
                    }
                    Some(cur) if cur != prev => {
                        update_nodes.push(Operation::undo_redo(OpPayload::UpdateNode {
                            id: *id,
                            patch: node_restore_patch(cur, prev),
                        }));
                        affected.push(*id);
                    }
                    Some(_) => {}
                },
                Some(Snapshot::Edge(prev)) => match self.diagram.edge(*id) {
                    None => {
                        create_edges.push(Operation::undo_redo(OpPayload::CreateEdge {
                            edge: prev.clone(),
                        }));
                        affected.push(*id);
                    }
                    Some(cur) if cur != prev => {
                        update_edges.push(Operation::undo_redo(OpPayload::UpdateEdge {
                            id: *id,
                            patch: edge_restore_patch(cur, prev),
                        }));
                        affected.push(*id);
                    }
                    Some(_) => {}
                },
            }
        }

        // Replay-safe order: nodes exist before anything re-attaches or
        // re-connects to them; removals run last, edges before nodes.
        let mut inverse = create_nodes;
        inverse.extend(update_nodes);
        inverse.extend(create_edges);
        inverse.extend(update_edges);
        inverse.extend(delete_edges);
        inverse.extend(delete_nodes);
        (inverse, affected)
    }
}

/// Patch bringing `now` back to `before`.
fn node_restore_patch(now: &Node, before: &Node) -> NodePatch {
    NodePatch {
        position: (now.position != before.position).then_some(before.position),
        size: (now.size != before.size).then_some(before.size),
        label: (now.label != before.label).then(|| before.label.clone()),
        z: (now.z != before.z).then_some(before.z),
        parent: if now.parent != before.parent {
            match before.parent {
                Some(p) => ParentPatch::Embed(p),
                None => ParentPatch::Detach,
            }
        } else {
            ParentPatch::Keep
        },
        attrs: (now.attrs != before.attrs).then(|| before.attrs.clone()),
    }
}

fn edge_restore_patch(now: &Edge, before: &Edge) -> EdgePatch {
    EdgePatch {
        source: (now.source != before.source).then(|| before.source.clone()),
        target: (now.target != before.target).then(|| before.target.clone()),
        vertices: (now.vertices != before.vertices).then(|| before.vertices.clone()),
        label: (now.label != before.label).then(|| before.label.clone()),
        z: (now.z != before.z).then_some(before.z),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Anchor, NodeShape};
    use kurbo::{Point, Size};

    fn node(shape: NodeShape) -> Node {
        Node::new(shape, Point::new(0.0, 0.0), Size::new(100.0, 60.0))
    }

    fn create(diagram: &mut Diagram, n: Node) -> CellId {
        let id = n.id;
        execute(diagram, &Operation::user(OpPayload::CreateNode { node: n })).unwrap();
        id
    }

    #[test]
    fn test_create_node_inverse_deletes() {
        let mut diagram = Diagram::new();
        let n = node(NodeShape::Process);
        let op = Operation::user(OpPayload::CreateNode { node: n.clone() });

        let applied = execute(&mut diagram, &op).unwrap();
        assert!(diagram.node(n.id).is_some());
        assert_eq!(applied.inverse.len(), 1);
        assert!(matches!(
            applied.inverse[0].payload,
            OpPayload::DeleteNode { id } if id == n.id
        ));
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let mut diagram = Diagram::new();
        let n = node(NodeShape::Process);
        create(&mut diagram, n.clone());

        let again = Operation::user(OpPayload::CreateNode { node: n });
        let err = execute(&mut diagram, &again).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::DuplicateCell(_))
        ));
        assert_eq!(diagram.node_count(), 1);
    }

    #[test]
    fn test_delete_node_inverse_restores_edges_and_children() {
        let mut diagram = Diagram::new();
        let boundary = node(NodeShape::TrustBoundary);
        let inner = node(NodeShape::Process);
        let outer = node(NodeShape::Process);
        let b_id = create(&mut diagram, boundary);
        let i_id = create(&mut diagram, inner);
        let o_id = create(&mut diagram, outer);

        execute(
            &mut diagram,
            &Operation::user(OpPayload::UpdateNode {
                id: i_id,
                patch: NodePatch::embed(b_id),
            }),
        )
        .unwrap();
        let edge = Edge::new(Anchor::new(i_id, "right"), Anchor::new(o_id, "left"));
        let e_id = edge.id;
        execute(&mut diagram, &Operation::user(OpPayload::CreateEdge { edge })).unwrap();

        // delete the boundary: the child detaches, nothing else changes
        let applied = execute(
            &mut diagram,
            &Operation::user(OpPayload::DeleteNode { id: b_id }),
        )
        .unwrap();
        assert!(diagram.node(b_id).is_none());
        assert_eq!(diagram.node(i_id).unwrap().parent, None);

        // replay the inverse: boundary back, child re-embedded
        for inv in &applied.inverse {
            execute(&mut diagram, inv).unwrap();
        }
        assert!(diagram.node(b_id).is_some());
        assert_eq!(diagram.node(i_id).unwrap().parent, Some(b_id));
        assert!(diagram.edge(e_id).is_some());
    }

    #[test]
    fn test_delete_node_with_edges_inverse_recreates_them() {
        let mut diagram = Diagram::new();
        let a_id = create(&mut diagram, node(NodeShape::Process));
        let b_id = create(&mut diagram, node(NodeShape::Process));
        let edge = Edge::new(Anchor::new(a_id, "right"), Anchor::new(b_id, "left"));
        let e_id = edge.id;
        execute(&mut diagram, &Operation::user(OpPayload::CreateEdge { edge })).unwrap();

        let applied = execute(
            &mut diagram,
            &Operation::user(OpPayload::DeleteNode { id: a_id }),
        )
        .unwrap();
        assert!(diagram.edge(e_id).is_none());

        for inv in &applied.inverse {
            execute(&mut diagram, inv).unwrap();
        }
        assert!(diagram.node(a_id).is_some());
        assert_eq!(diagram.edge(e_id).unwrap().source.node, a_id);
    }

    #[test]
    fn test_update_missing_node_is_not_found() {
        let mut diagram = Diagram::new();
        let err = execute(
            &mut diagram,
            &Operation::user(OpPayload::UpdateNode {
                id: CellId::new(),
                patch: NodePatch::label("ghost"),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_embed_cascades_z() {
        let mut diagram = Diagram::new();
        let p_id = create(&mut diagram, node(NodeShape::Group));
        diagram.node_mut(p_id).unwrap().z = 10;
        let c_id = create(&mut diagram, node(NodeShape::Process));

        execute(
            &mut diagram,
            &Operation::user(OpPayload::UpdateNode {
                id: c_id,
                patch: NodePatch::embed(p_id),
            }),
        )
        .unwrap();

        let child_z = diagram.node(c_id).unwrap().z;
        assert!(child_z >= 11, "child z {child_z} must clear parent z 10");
    }

    #[test]
    fn test_embed_into_non_container_rejected() {
        let mut diagram = Diagram::new();
        let a_id = create(&mut diagram, node(NodeShape::Process));
        let b_id = create(&mut diagram, node(NodeShape::Process));

        let err = execute(
            &mut diagram,
            &Operation::user(OpPayload::UpdateNode {
                id: b_id,
                patch: NodePatch::embed(a_id),
            }),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::ContainmentBreach { .. })
        ));
        assert_eq!(diagram.node(b_id).unwrap().parent, None);
    }

    #[test]
    fn test_edge_settles_on_endpoint_z() {
        let mut diagram = Diagram::new();
        let a_id = create(&mut diagram, node(NodeShape::Process));
        let b_id = create(&mut diagram, node(NodeShape::Process));
        diagram.node_mut(b_id).unwrap().z = 6;

        let edge = Edge::new(Anchor::new(a_id, "right"), Anchor::new(b_id, "left"));
        let e_id = edge.id;
        execute(&mut diagram, &Operation::user(OpPayload::CreateEdge { edge })).unwrap();

        assert_eq!(diagram.edge(e_id).unwrap().z, 6);
    }

    #[test]
    fn test_invalid_edge_leaves_no_trace() {
        let mut diagram = Diagram::new();
        let a_id = create(&mut diagram, node(NodeShape::DataStore));
        let b_id = create(&mut diagram, node(NodeShape::DataStore));

        let edge = Edge::new(Anchor::new(a_id, "right"), Anchor::new(b_id, "left"));
        let err = execute(&mut diagram, &Operation::user(OpPayload::CreateEdge { edge }))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::ConnectionNotAllowed { .. })
        ));
        assert_eq!(diagram.edge_count(), 0);
    }

    #[test]
    fn test_retroactive_create_records_observed_state() {
        let mut diagram = Diagram::new();
        let mut n = node(NodeShape::Process);
        n.label = "as drawn".to_string();
        let id = n.id;
        diagram.add_node(n);

        // the request carries stale data; the record must not
        let mut stale = diagram.node(id).unwrap().clone();
        stale.label = "stale".to_string();
        let op = Operation::user(OpPayload::CreateNode { node: stale }).retroactive();
        let applied = execute(&mut diagram, &op).unwrap();

        match &applied.op.payload {
            OpPayload::CreateNode { node } => assert_eq!(node.label, "as drawn"),
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(diagram.node(id).unwrap().label, "as drawn");
        assert!(applied.inverse.is_empty());
    }

    #[test]
    fn test_update_round_trip_restores_everything() {
        let mut diagram = Diagram::new();
        let id = create(&mut diagram, node(NodeShape::Process));
        let before = diagram.node(id).unwrap().clone();

        let patch = NodePatch {
            position: Some(Point::new(50.0, 60.0)),
            label: Some("renamed".to_string()),
            z: Some(9),
            ..NodePatch::default()
        };
        let applied = execute(
            &mut diagram,
            &Operation::user(OpPayload::UpdateNode { id, patch }),
        )
        .unwrap();

        for inv in &applied.inverse {
            execute(&mut diagram, inv).unwrap();
        }
        assert_eq!(diagram.node(id).unwrap(), &before);
    }
}
