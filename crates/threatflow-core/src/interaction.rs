//! Converting raw canvas interactions into operations.
//!
//! The rendering library handles drags and drops natively and tells the
//! application afterwards, so everything here becomes a retroactive
//! operation: the effect already happened on screen, the engine records it
//! and re-balances, skipping validation for that flag and nothing else.

use crate::cell::{Anchor, CellId, Edge, Node};
use crate::op::{EdgePatch, NodePatch, OpPayload, Operation};
use kurbo::{Point, Size};

/// Raw interaction events reported by the rendering collaborator.
#[derive(Debug, Clone)]
pub enum CanvasEvent {
    /// A node was dragged to a new position.
    NodeMoved { id: CellId, position: Point },
    /// A node was resized (the anchor corner may move it too).
    NodeResized {
        id: CellId,
        position: Point,
        size: Size,
    },
    /// A node was dropped into (or out of) a container.
    NodeEmbedded {
        id: CellId,
        parent: Option<CellId>,
    },
    /// An edge's waypoints were dragged.
    EdgeRerouted { id: CellId, vertices: Vec<Point> },
    /// An edge was re-plugged onto different anchors.
    EdgeRetargeted {
        id: CellId,
        source: Anchor,
        target: Anchor,
    },
    /// A cell was created by direct manipulation.
    NodeAdded { node: Node },
    EdgeAdded { edge: Edge },
}

/// The retroactive operation documenting an already-performed interaction.
pub fn operation_for(event: CanvasEvent) -> Operation {
    let payload = match event {
        CanvasEvent::NodeMoved { id, position } => OpPayload::UpdateNode {
            id,
            patch: NodePatch::position(position),
        },
        CanvasEvent::NodeResized { id, position, size } => OpPayload::UpdateNode {
            id,
            patch: NodePatch {
                position: Some(position),
                size: Some(size),
                ..NodePatch::default()
            },
        },
        CanvasEvent::NodeEmbedded { id, parent } => OpPayload::UpdateNode {
            id,
            patch: match parent {
                Some(parent) => NodePatch::embed(parent),
                None => NodePatch::detach(),
            },
        },
        CanvasEvent::EdgeRerouted { id, vertices } => OpPayload::UpdateEdge {
            id,
            patch: EdgePatch::vertices(vertices),
        },
        CanvasEvent::EdgeRetargeted { id, source, target } => OpPayload::UpdateEdge {
            id,
            patch: EdgePatch::reroute(source, target),
        },
        CanvasEvent::NodeAdded { node } => OpPayload::CreateNode { node },
        CanvasEvent::EdgeAdded { edge } => OpPayload::CreateEdge { edge },
    };
    Operation::user(payload).retroactive()
}
