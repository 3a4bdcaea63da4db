//! Diagram cells: nodes, data-flow edges and their identifiers.

use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a diagram cell (node or edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(Uuid);

impl CellId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Named attachment point on a node.
pub type PortId = String;

/// The default compass port set every node starts with.
pub fn default_ports() -> Vec<PortId> {
    ["top", "right", "bottom", "left"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// Shape of a node. Drives the connection and containment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeShape {
    Process,
    DataStore,
    ExternalEntity,
    TrustBoundary,
    FreeText,
    Group,
}

impl NodeShape {
    /// Trust boundaries render behind everything else.
    pub fn is_boundary(self) -> bool {
        matches!(self, NodeShape::TrustBoundary)
    }
}

impl fmt::Display for NodeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeShape::Process => "process",
            NodeShape::DataStore => "data-store",
            NodeShape::ExternalEntity => "external-entity",
            NodeShape::TrustBoundary => "trust-boundary",
            NodeShape::FreeText => "free-text",
            NodeShape::Group => "group",
        };
        f.write_str(name)
    }
}

/// A diagram node.
///
/// The parent field is a back-reference by id; the containment index is
/// derived from it by the store, so snapshots are plain clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: CellId,
    pub shape: NodeShape,
    pub position: Point,
    pub size: Size,
    #[serde(default)]
    pub label: String,
    pub z: i32,
    #[serde(default)]
    pub parent: Option<CellId>,
    #[serde(default = "default_ports")]
    pub ports: Vec<PortId>,
    /// Free-form style/metadata bag, opaque to the engine.
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
}

impl Node {
    /// Create a node at its shape's base layer.
    pub fn new(shape: NodeShape, position: Point, size: Size) -> Self {
        Self {
            id: CellId::new(),
            shape,
            position,
            size,
            label: String::new(),
            z: crate::rules::layering::base_z(shape),
            parent: None,
            ports: default_ports(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn has_port(&self, port: &str) -> bool {
        self.ports.iter().any(|p| p == port)
    }
}

/// Endpoint of an edge: a node plus the attachment port on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub node: CellId,
    pub port: PortId,
}

impl Anchor {
    pub fn new(node: CellId, port: impl Into<PortId>) -> Self {
        Self {
            node,
            port: port.into(),
        }
    }
}

/// A data-flow edge between two node ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: CellId,
    pub source: Anchor,
    pub target: Anchor,
    /// Ordered waypoints between the endpoints.
    #[serde(default)]
    pub vertices: Vec<Point>,
    #[serde(default)]
    pub label: String,
    pub z: i32,
}

impl Edge {
    /// Create an edge. Its z settles to `max(endpoint z)` once applied.
    pub fn new(source: Anchor, target: Anchor) -> Self {
        Self {
            id: CellId::new(),
            source,
            target,
            vertices: Vec::new(),
            label: String::new(),
            z: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_vertices(mut self, vertices: Vec<Point>) -> Self {
        self.vertices = vertices;
        self
    }

    /// Whether this edge starts or ends at the given node.
    pub fn touches(&self, node: CellId) -> bool {
        self.source.node == node || self.target.node == node
    }
}
