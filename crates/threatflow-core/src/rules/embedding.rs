//! Containment rules: which shapes may hold which, and cycle prevention.

use crate::cell::{Node, NodeShape};
use crate::error::ValidationError;
use crate::graph::Diagram;

/// Fixed containment table. Trust boundaries and groups are the only
/// containers; nothing nests a trust boundary.
fn shape_permits(parent: NodeShape, child: NodeShape) -> bool {
    use NodeShape::*;
    match parent {
        TrustBoundary | Group => matches!(child, Process | DataStore | ExternalEntity | FreeText | Group),
        Process | DataStore | ExternalEntity | FreeText => false,
    }
}

/// Validate embedding `child` under `parent`.
///
/// Rejects identity, shapes the containment table forbids, and any parent
/// chain that would close into a cycle.
pub fn check_embed(diagram: &Diagram, parent: &Node, child: &Node) -> Result<(), ValidationError> {
    if parent.id == child.id {
        return Err(ValidationError::SelfEmbedding);
    }
    if !shape_permits(parent.shape, child.shape) {
        return Err(ValidationError::ContainmentBreach {
            parent: parent.shape,
            child: child.shape,
        });
    }
    if diagram.is_ancestor(child.id, parent.id) {
        return Err(ValidationError::EmbeddingCycle);
    }
    Ok(())
}

/// Boolean form of [`check_embed`].
pub fn can_embed(diagram: &Diagram, parent: &Node, child: &Node) -> bool {
    check_embed(diagram, parent, child).is_ok()
}
