//! Remote operation gateway and bulk diagram loading.
//!
//! Both paths run through the same executor as local edits, under a
//! suppression flag: a collaborator's operation must not echo back to its
//! sender, and replaying a thousand cells on load must not mint a thousand
//! undo entries. De-duplication by operation id makes remote replays
//! idempotent; missing targets are tolerated because deletes race.

use crate::cell::{CellId, Edge, Node};
use crate::editor::{Editor, Scope};
use crate::error::EngineError;
use crate::op::{OpId, OpPayload, OpSource, Operation};
use crate::rules::layering;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Flat record of one diagram cell, the persistence collaborator's unit of
/// exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellRecord {
    Node(Node),
    Edge(Edge),
}

impl CellRecord {
    pub fn id(&self) -> CellId {
        match self {
            CellRecord::Node(node) => node.id,
            CellRecord::Edge(edge) => edge.id,
        }
    }
}

/// How many applied remote operation ids to remember for de-duplication.
const SEEN_LIMIT: usize = 1024;

/// Bridge between the transport/persistence collaborators and the editor.
#[derive(Debug, Default)]
pub struct RemoteGateway {
    seen: HashSet<OpId>,
    seen_order: VecDeque<OpId>,
}

impl RemoteGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one collaborator operation through the editor.
    ///
    /// Runs under the applying-remote flag, so nothing reaches the undo
    /// stack or the outbound queue. Duplicate operation ids and deletes of
    /// already-gone cells are tolerated as no-ops. Returns the affected
    /// cell ids.
    pub fn apply_remote(
        &mut self,
        editor: &mut Editor,
        op: Operation,
    ) -> Result<Vec<CellId>, EngineError> {
        if !self.remember(op.id) {
            debug!("remote operation {} already applied, skipping", op.id);
            return Ok(Vec::new());
        }

        let mut op = op;
        op.source = OpSource::Remote;

        editor.scoped(Scope::Remote, |ed| match ed.apply(op) {
            Ok(affected) => Ok(affected),
            Err(err) if err.is_benign_for_replay() => {
                warn!("remote operation targeted a missing cell: {err}");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        })
    }

    /// Load a full diagram from flat cell records.
    ///
    /// Runs under the loading flag; each cell replays as a retroactive
    /// create, one whole-graph validation pass settles the layering, and
    /// both history stacks are cleared (prior entries are meaningless after
    /// a reload). Application is best effort (a dangling record is skipped
    /// with a warning), but any hard fault still releases the flag before
    /// propagating.
    pub fn load_diagram(
        &mut self,
        editor: &mut Editor,
        records: Vec<CellRecord>,
        replace: bool,
    ) -> Result<(), EngineError> {
        let result = editor.scoped(Scope::Loading, |ed| {
            if replace {
                ed.diagram_mut().clear();
            }

            let (nodes, edges): (Vec<_>, Vec<_>) = records
                .into_iter()
                .partition(|r| matches!(r, CellRecord::Node(_)));

            for record in nodes.into_iter().chain(edges) {
                let payload = match record {
                    CellRecord::Node(node) => OpPayload::CreateNode { node },
                    CellRecord::Edge(edge) => OpPayload::CreateEdge { edge },
                };
                let op = Operation::remote(payload).retroactive();
                match ed.apply(op) {
                    Ok(_) => {}
                    Err(err) if err.is_benign_for_replay() => {
                        warn!("skipping dangling cell record: {err}");
                    }
                    Err(err) => return Err(err),
                }
            }

            let corrections = layering::validate_and_correct(ed.diagram());
            if !corrections.is_empty() {
                debug!("load settled {} layering corrections", corrections.len());
            }
            layering::apply_corrections(ed.diagram_mut(), &corrections);
            Ok(())
        });

        // a reload, even a failed one, invalidates prior history and the
        // remote replay horizon
        editor.clear_history();
        self.seen.clear();
        self.seen_order.clear();

        result
    }

    /// The diagram as flat records, nodes before edges, for the persistence
    /// collaborator.
    pub fn export_cells(&self, editor: &Editor) -> Vec<CellRecord> {
        let mut nodes: Vec<&Node> = editor.diagram().nodes().collect();
        nodes.sort_by_key(|n| (n.z, n.id));
        let mut edges: Vec<&Edge> = editor.diagram().edges().collect();
        edges.sort_by_key(|e| (e.z, e.id));

        nodes
            .into_iter()
            .map(|n| CellRecord::Node(n.clone()))
            .chain(edges.into_iter().map(|e| CellRecord::Edge(e.clone())))
            .collect()
    }

    /// Drain operations queued for broadcast, serialized for the transport.
    pub fn drain_outgoing(&mut self, editor: &mut Editor) -> Vec<String> {
        editor
            .take_outbound()
            .iter()
            .filter_map(|op| serde_json::to_string(op).ok())
            .collect()
    }

    /// Track an applied id; false means it was already known.
    fn remember(&mut self, id: OpId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.seen_order.push_back(id);
        while self.seen_order.len() > SEEN_LIMIT {
            if let Some(evicted) = self.seen_order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
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

    #[test]
    fn test_remote_apply_never_echoes() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        let op = Operation::remote(OpPayload::CreateNode {
            node: node(NodeShape::Process),
        });
        gateway.apply_remote(&mut editor, op).unwrap();

        assert_eq!(editor.diagram().node_count(), 1);
        assert!(!editor.has_outbound(), "remote edits must not loop back");
        assert!(!editor.can_undo(), "remote edits are not undoable locally");
    }

    #[test]
    fn test_duplicate_remote_op_applies_once() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        let op = Operation::remote(OpPayload::CreateNode {
            node: node(NodeShape::Process),
        });
        gateway.apply_remote(&mut editor, op.clone()).unwrap();
        let affected = gateway.apply_remote(&mut editor, op).unwrap();

        assert!(affected.is_empty());
        assert_eq!(editor.diagram().node_count(), 1);
    }

    #[test]
    fn test_remote_delete_of_missing_cell_is_benign() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        let op = Operation::remote(OpPayload::DeleteNode { id: CellId::new() });
        let affected = gateway.apply_remote(&mut editor, op).unwrap();
        assert!(affected.is_empty());
        assert!(!editor.is_suppressed());
    }

    #[test]
    fn test_load_replaces_and_clears_history() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        // some local, undoable work first
        editor
            .apply(Operation::user(OpPayload::CreateNode {
                node: node(NodeShape::Process),
            }))
            .unwrap();
        assert!(editor.can_undo());
        editor.take_outbound();

        let records = vec![
            CellRecord::Node(node(NodeShape::TrustBoundary)),
            CellRecord::Node(node(NodeShape::Process)),
        ];
        gateway.load_diagram(&mut editor, records, true).unwrap();

        assert_eq!(editor.diagram().node_count(), 2);
        assert!(!editor.can_undo(), "a reload invalidates all history");
        assert!(!editor.is_suppressed());
        assert!(!editor.has_outbound());
    }

    #[test]
    fn test_load_settles_layering() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        let mut boundary = node(NodeShape::TrustBoundary);
        boundary.z = 99;
        let b_id = boundary.id;
        gateway
            .load_diagram(&mut editor, vec![CellRecord::Node(boundary)], true)
            .unwrap();

        assert_eq!(editor.diagram().node(b_id).unwrap().z, layering::BOUNDARY_Z);
    }

    #[test]
    fn test_load_skips_dangling_edges() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        let a = node(NodeShape::Process);
        let dangling = Edge::new(
            Anchor::new(CellId::new(), "right"),
            Anchor::new(a.id, "left"),
        );
        let records = vec![CellRecord::Node(a), CellRecord::Edge(dangling)];

        gateway.load_diagram(&mut editor, records, true).unwrap();
        assert_eq!(editor.diagram().node_count(), 1);
        assert_eq!(editor.diagram().edge_count(), 0);
        assert!(!editor.is_suppressed());
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        let a = node(NodeShape::Process);
        let b = node(NodeShape::DataStore);
        let edge = Edge::new(Anchor::new(a.id, "right"), Anchor::new(b.id, "left"));
        let records = vec![
            CellRecord::Node(a),
            CellRecord::Node(b),
            CellRecord::Edge(edge),
        ];
        gateway.load_diagram(&mut editor, records, true).unwrap();

        let exported = gateway.export_cells(&editor);
        let mut second = Editor::new();
        gateway.load_diagram(&mut second, exported, true).unwrap();

        assert_eq!(second.diagram().node_count(), 2);
        assert_eq!(second.diagram().edge_count(), 1);
    }

    #[test]
    fn test_drain_outgoing_serializes_local_ops() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        editor
            .apply(Operation::user(OpPayload::CreateNode {
                node: node(NodeShape::Process),
            }))
            .unwrap();

        let wire = gateway.drain_outgoing(&mut editor);
        assert_eq!(wire.len(), 1);
        assert!(wire[0].contains("\"create_node\""));
        assert!(gateway.drain_outgoing(&mut editor).is_empty());
    }

    #[test]
    fn test_seen_set_is_bounded() {
        let mut gateway = RemoteGateway::new();
        let mut editor = Editor::new();

        for _ in 0..(SEEN_LIMIT + 10) {
            let op = Operation::remote(OpPayload::DeleteNode { id: CellId::new() });
            gateway.apply_remote(&mut editor, op).unwrap();
        }
        assert!(gateway.seen.len() <= SEEN_LIMIT);
        assert_eq!(gateway.seen.len(), gateway.seen_order.len());
    }
}
