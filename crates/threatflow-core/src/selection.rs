//! Visual selection state, kept apart from the document data so style-only
//! concerns never leak into the mutation stream.

use crate::cell::CellId;
use crate::graph::Diagram;

/// Ordered set of selected cell ids.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    selected: Vec<CellId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection with a single cell. Returns true if anything
    /// changed.
    pub fn select(&mut self, id: CellId) -> bool {
        if self.selected == [id] {
            return false;
        }
        self.selected.clear();
        self.selected.push(id);
        true
    }

    /// Add a cell to the selection.
    pub fn add(&mut self, id: CellId) -> bool {
        if self.selected.contains(&id) {
            return false;
        }
        self.selected.push(id);
        true
    }

    /// Toggle a cell's membership.
    pub fn toggle(&mut self, id: CellId) -> bool {
        if let Some(pos) = self.selected.iter().position(|s| *s == id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(id);
        }
        true
    }

    pub fn clear(&mut self) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        self.selected.clear();
        true
    }

    pub fn is_selected(&self, id: CellId) -> bool {
        self.selected.contains(&id)
    }

    pub fn ids(&self) -> &[CellId] {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Drop ids that no longer resolve to a cell. Returns true if anything
    /// was pruned.
    pub(crate) fn prune(&mut self, diagram: &Diagram) -> bool {
        let before = self.selected.len();
        self.selected.retain(|id| diagram.contains(*id));
        self.selected.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Node, NodeShape};
    use kurbo::{Point, Size};

    #[test]
    fn test_select_replaces() {
        let mut selection = Selection::new();
        let a = CellId::new();
        let b = CellId::new();

        assert!(selection.select(a));
        assert!(selection.select(b));
        assert!(!selection.is_selected(a));
        assert!(selection.is_selected(b));
    }

    #[test]
    fn test_reselect_is_noop() {
        let mut selection = Selection::new();
        let a = CellId::new();
        selection.select(a);
        assert!(!selection.select(a));
    }

    #[test]
    fn test_toggle() {
        let mut selection = Selection::new();
        let a = CellId::new();
        selection.toggle(a);
        assert!(selection.is_selected(a));
        selection.toggle(a);
        assert!(!selection.is_selected(a));
    }

    #[test]
    fn test_prune_drops_dead_cells() {
        let mut diagram = Diagram::new();
        let node = Node::new(
            NodeShape::Process,
            Point::new(0.0, 0.0),
            Size::new(100.0, 60.0),
        );
        let id = node.id;
        diagram.add_node(node);

        let mut selection = Selection::new();
        selection.select(id);
        assert!(!selection.prune(&diagram));

        diagram.remove_node(id);
        assert!(selection.prune(&diagram));
        assert!(selection.is_empty());
    }
}
