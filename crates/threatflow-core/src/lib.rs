//! ThreatFlow Core Library
//!
//! The diagram mutation and history-coordination engine beneath the
//! ThreatFlow threat-model editor. Every edit (local gesture, remote
//! collaborator operation, undo/redo replay) flows through one validated,
//! reversible executor against an in-memory scene graph, under layering,
//! embedding and connection invariants. Rendering, transport and
//! persistence are external collaborators reached through typed queues.

pub mod cell;
pub mod editor;
pub mod error;
pub mod executor;
pub mod graph;
pub mod history;
pub mod interaction;
pub mod op;
pub mod remote;
pub mod rules;
pub mod selection;

pub use cell::{Anchor, CellId, Edge, Node, NodeShape, PortId};
pub use editor::{ChangeEvent, Editor};
pub use error::{EngineError, ValidationError};
pub use executor::Applied;
pub use graph::Diagram;
pub use history::{History, HistoryEntry};
pub use interaction::{operation_for, CanvasEvent};
pub use op::{EdgePatch, NodePatch, OpId, OpPayload, OpSource, Operation, ParentPatch};
pub use remote::{CellRecord, RemoteGateway};
pub use selection::Selection;
