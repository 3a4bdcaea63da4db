//! Data-flow connection rules.
//!
//! A fixed adjacency table decides which shape pairs may be connected; a
//! structural check rejects same-port self-loops and exact duplicates of an
//! existing edge's `(source, source port, target, target port)` tuple.

use crate::cell::{Edge, Node, NodeShape};
use crate::error::ValidationError;
use crate::graph::Diagram;

/// Fixed adjacency table. Stores and external entities exchange data only
/// through a process; boundaries, annotations and groups carry no flows.
fn shape_permits(source: NodeShape, target: NodeShape) -> bool {
    use NodeShape::*;
    match source {
        Process => matches!(target, Process | DataStore | ExternalEntity),
        DataStore | ExternalEntity => matches!(target, Process),
        TrustBoundary | FreeText | Group => false,
    }
}

/// Whether the adjacency table permits a flow between two nodes.
pub fn can_connect(source: &Node, target: &Node) -> bool {
    shape_permits(source.shape, target.shape)
}

/// Validate an edge against its (already resolved) endpoint nodes and the
/// rest of the diagram.
pub fn check_connect(
    diagram: &Diagram,
    edge: &Edge,
    source: &Node,
    target: &Node,
) -> Result<(), ValidationError> {
    if !source.has_port(&edge.source.port) {
        return Err(ValidationError::UnknownPort(edge.source.port.clone()));
    }
    if !target.has_port(&edge.target.port) {
        return Err(ValidationError::UnknownPort(edge.target.port.clone()));
    }
    if edge.source == edge.target {
        return Err(ValidationError::SelfLoop);
    }
    if !shape_permits(source.shape, target.shape) {
        return Err(ValidationError::ConnectionNotAllowed {
            from: source.shape,
            to: target.shape,
        });
    }
    let duplicate = diagram
        .edges()
        .any(|e| e.id != edge.id && e.source == edge.source && e.target == edge.target);
    if duplicate {
        return Err(ValidationError::DuplicateEdge);
    }
    Ok(())
}
