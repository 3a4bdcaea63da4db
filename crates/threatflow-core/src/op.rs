//! The operation model: every diagram mutation as a discrete, replayable,
//! reversible value.
//!
//! Operations are what travels between producers (pointer gestures, remote
//! collaborators, the undo stack) and the executor, and what goes out on the
//! wire to other editors. Each variant carries exactly what replay needs;
//! the executor reconstructs anything else (like a deleted node's snapshot)
//! from the store at apply time.

use crate::cell::{Anchor, CellId, Edge, Node};
use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique identifier for one operation instance. Used for remote
/// de-duplication and for linking history entries back to their origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(Uuid);

impl OpId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which producer created an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpSource {
    UserInteraction,
    Remote,
    UndoRedo,
}

/// Re-parent instruction inside a node patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentPatch {
    /// Leave containment untouched.
    #[default]
    Keep,
    /// Detach the node to the diagram root.
    Detach,
    /// Embed the node under the given parent.
    Embed(CellId),
}

impl ParentPatch {
    pub fn is_keep(&self) -> bool {
        matches!(self, ParentPatch::Keep)
    }
}

/// Partial update for a node. Unset fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<i32>,
    #[serde(default, skip_serializing_if = "ParentPatch::is_keep")]
    pub parent: ParentPatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, Value>>,
}

impl NodePatch {
    pub fn position(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn z(z: i32) -> Self {
        Self {
            z: Some(z),
            ..Self::default()
        }
    }

    pub fn embed(parent: CellId) -> Self {
        Self {
            parent: ParentPatch::Embed(parent),
            ..Self::default()
        }
    }

    pub fn detach() -> Self {
        Self {
            parent: ParentPatch::Detach,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.size.is_none()
            && self.label.is_none()
            && self.z.is_none()
            && self.parent.is_keep()
            && self.attrs.is_none()
    }
}

/// Partial update for an edge. Unset fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<i32>,
}

impl EdgePatch {
    pub fn vertices(vertices: Vec<Point>) -> Self {
        Self {
            vertices: Some(vertices),
            ..Self::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn reroute(source: Anchor, target: Anchor) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
            ..Self::default()
        }
    }
}

/// Mutation payload, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpPayload {
    CreateNode { node: Node },
    UpdateNode { id: CellId, patch: NodePatch },
    DeleteNode { id: CellId },
    CreateEdge { edge: Edge },
    UpdateEdge { id: CellId, patch: EdgePatch },
    DeleteEdge { id: CellId },
}

impl OpPayload {
    /// The primary cell this payload addresses.
    pub fn cell(&self) -> CellId {
        match self {
            OpPayload::CreateNode { node } => node.id,
            OpPayload::UpdateNode { id, .. } => *id,
            OpPayload::DeleteNode { id } => *id,
            OpPayload::CreateEdge { edge } => edge.id,
            OpPayload::UpdateEdge { id, .. } => *id,
            OpPayload::DeleteEdge { id } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OpPayload::CreateNode { .. } => "create_node",
            OpPayload::UpdateNode { .. } => "update_node",
            OpPayload::DeleteNode { .. } => "delete_node",
            OpPayload::CreateEdge { .. } => "create_edge",
            OpPayload::UpdateEdge { .. } => "update_edge",
            OpPayload::DeleteEdge { .. } => "delete_edge",
        }
    }
}

/// A discrete, validated, undoable diagram mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OpId,
    pub source: OpSource,
    #[serde(default)]
    pub priority: u8,
    /// Unix milliseconds at creation.
    pub timestamp: u64,
    /// Marks an operation recorded after its effect already happened in the
    /// rendering layer; the executor skips validation for these and nothing
    /// else.
    #[serde(default)]
    pub retroactive: bool,
    pub payload: OpPayload,
}

impl Operation {
    pub fn new(source: OpSource, payload: OpPayload) -> Self {
        Self {
            id: OpId::new(),
            source,
            priority: 0,
            timestamp: now_millis(),
            retroactive: false,
            payload,
        }
    }

    pub fn user(payload: OpPayload) -> Self {
        Self::new(OpSource::UserInteraction, payload)
    }

    pub fn remote(payload: OpPayload) -> Self {
        Self::new(OpSource::Remote, payload)
    }

    pub(crate) fn undo_redo(payload: OpPayload) -> Self {
        Self::new(OpSource::UndoRedo, payload)
    }

    /// Mark the operation retroactive.
    pub fn retroactive(mut self) -> Self {
        self.retroactive = true;
        self
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
