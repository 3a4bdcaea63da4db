//! Z-order invariants.
//!
//! Trust boundaries render behind ordinary nodes, an embedded child stacks
//! above its parent (recursively), and an edge rides at the level of its
//! highest endpoint. The functions here compute the corrections needed to
//! restore those invariants; they are idempotent, so a clean graph yields
//! an empty correction list.

use crate::cell::{CellId, NodeShape};
use crate::graph::Diagram;
use std::collections::{HashMap, HashSet};

/// Layer an unembedded trust boundary always returns to.
pub const BOUNDARY_Z: i32 = 0;
/// Base layer for every other unembedded node.
pub const NODE_Z: i32 = 1;

/// Base layer for a freshly created, unembedded node of the given shape.
pub fn base_z(shape: NodeShape) -> i32 {
    if shape.is_boundary() {
        BOUNDARY_Z
    } else {
        NODE_Z
    }
}

/// A z assignment computed by a validation or re-balance pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub cell: CellId,
    pub z: i32,
}

/// The z an edge must sit at, given its endpoints' (possibly corrected) z.
pub fn edge_z(diagram: &Diagram, source: CellId, target: CellId) -> Option<i32> {
    let sz = diagram.node(source)?.z;
    let tz = diagram.node(target)?.z;
    Some(sz.max(tz))
}

/// Corrections restoring the child-above-parent cascade for `root` and its
/// subtree, plus exact `max(endpoint z)` for every edge touching it.
///
/// Node corrections only ever raise (a child may float higher than its
/// floor); edge corrections are exact in both directions.
pub fn subtree_corrections(diagram: &Diagram, root: CellId) -> Vec<Correction> {
    let mut order = vec![root];
    order.extend(diagram.descendants(root));

    let mut corrected: HashMap<CellId, i32> = HashMap::new();
    let mut out = Vec::new();

    for id in &order {
        let Some(node) = diagram.node(*id) else {
            continue;
        };
        let floor = match node.parent {
            Some(p) => match corrected.get(&p).copied().or_else(|| diagram.node(p).map(|n| n.z)) {
                Some(parent_z) => parent_z + 1,
                None => base_z(node.shape),
            },
            None => base_z(node.shape),
        };
        let z = node.z.max(floor);
        if z != node.z {
            out.push(Correction { cell: *id, z });
        }
        corrected.insert(*id, z);
    }

    let touched: HashSet<CellId> = order.into_iter().collect();
    for edge in diagram.edges() {
        if !touched.contains(&edge.source.node) && !touched.contains(&edge.target.node) {
            continue;
        }
        let sz = corrected
            .get(&edge.source.node)
            .copied()
            .or_else(|| diagram.node(edge.source.node).map(|n| n.z));
        let tz = corrected
            .get(&edge.target.node)
            .copied()
            .or_else(|| diagram.node(edge.target.node).map(|n| n.z));
        if let (Some(sz), Some(tz)) = (sz, tz) {
            let z = sz.max(tz);
            if z != edge.z {
                out.push(Correction { cell: edge.id, z });
            }
        }
    }

    out
}

/// Whole-graph validation pass.
///
/// Scans every node and edge and returns the corrections that restore the
/// layering invariants: unembedded boundaries at [`BOUNDARY_Z`] exactly,
/// unembedded ordinary nodes at [`NODE_Z`] or above, children above their
/// parent, edges at their endpoint maximum. Running the pass on a corrected
/// graph yields nothing.
pub fn validate_and_correct(diagram: &Diagram) -> Vec<Correction> {
    let mut corrected: HashMap<CellId, i32> = HashMap::new();
    let mut out = Vec::new();

    let mut queue = diagram.roots();
    let mut index = 0;
    while index < queue.len() {
        let id = queue[index];
        index += 1;
        let Some(node) = diagram.node(id) else {
            continue;
        };

        let z = match node.parent.and_then(|p| corrected.get(&p).copied()) {
            Some(parent_z) => node.z.max(parent_z + 1),
            None if node.shape.is_boundary() => BOUNDARY_Z,
            None => node.z.max(NODE_Z),
        };
        if z != node.z {
            out.push(Correction { cell: id, z });
        }
        corrected.insert(id, z);
        queue.extend(diagram.children(id));
    }

    for edge in diagram.edges() {
        let sz = corrected.get(&edge.source.node).copied();
        let tz = corrected.get(&edge.target.node).copied();
        if let (Some(sz), Some(tz)) = (sz, tz) {
            let z = sz.max(tz);
            if z != edge.z {
                out.push(Correction { cell: edge.id, z });
            }
        }
    }

    out
}

/// Write a correction list back into the diagram.
pub(crate) fn apply_corrections(diagram: &mut Diagram, corrections: &[Correction]) {
    for c in corrections {
        if let Some(node) = diagram.node_mut(c.cell) {
            node.z = c.z;
        } else if let Some(edge) = diagram.edge_mut(c.cell) {
            edge.z = c.z;
        }
    }
}
