//! Error taxonomy for the mutation engine.

use crate::cell::{CellId, NodeShape};
use thiserror::Error;

/// Why an operation violates a structural rule. Validation failures are
/// rejected before any mutation happens and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a {from} may not connect to a {to}")]
    ConnectionNotAllowed { from: NodeShape, to: NodeShape },
    #[error("edge would loop back onto its own port")]
    SelfLoop,
    #[error("an identical edge already connects these ports")]
    DuplicateEdge,
    #[error("node has no port named {0:?}")]
    UnknownPort(String),
    #[error("a {child} may not be embedded in a {parent}")]
    ContainmentBreach { parent: NodeShape, child: NodeShape },
    #[error("embedding would create a containment cycle")]
    EmbeddingCycle,
    #[error("a node cannot be embedded in itself")]
    SelfEmbedding,
    #[error("cell {0} already exists")]
    DuplicateCell(CellId),
}

/// Top-level engine error.
///
/// `NotFound` is benign for remote and undo/redo sources (replays race local
/// deletions); `Transaction` means the mutate/re-balance sequence faulted and
/// was rolled back.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("operation rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("cell not found: {0}")]
    NotFound(CellId),
    #[error("mutation rolled back: {0}")]
    Transaction(String),
}

impl EngineError {
    /// Missing-id failures are tolerated for replayed sources.
    pub fn is_benign_for_replay(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_shapes() {
        let err = ValidationError::ConnectionNotAllowed {
            from: NodeShape::DataStore,
            to: NodeShape::DataStore,
        };
        let msg = err.to_string();
        assert!(msg.contains("data-store"));
    }

    #[test]
    fn test_not_found_is_benign() {
        assert!(EngineError::NotFound(CellId::new()).is_benign_for_replay());
        assert!(!EngineError::Validation(ValidationError::SelfLoop).is_benign_for_replay());
    }
}
