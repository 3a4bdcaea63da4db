//! Undo/redo stacks with atomic batch grouping.
//!
//! The stacks store [`HistoryEntry`] values: one user-visible step each,
//! holding the recorded forward operations and the inverse operations that
//! reverse them. Suppression (what may be recorded at all) is decided by the
//! editor; this module only stores what it is handed.

use crate::cell::CellId;
use crate::executor::Applied;
use crate::op::Operation;

/// Maximum number of history entries to keep.
const MAX_HISTORY: usize = 100;

/// One applied executor call inside an entry.
#[derive(Debug, Clone)]
pub(crate) struct AppliedStep {
    pub forward: Operation,
    pub inverse: Vec<Operation>,
    pub affected: Vec<CellId>,
}

impl From<Applied> for AppliedStep {
    fn from(applied: Applied) -> Self {
        Self {
            forward: applied.op,
            inverse: applied.inverse,
            affected: applied.affected,
        }
    }
}

/// One undoable, user-visible step: a single operation or an atomic group.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    steps: Vec<AppliedStep>,
}

impl HistoryEntry {
    /// Every cell id this entry touched.
    pub fn touched(&self) -> Vec<CellId> {
        let mut out: Vec<CellId> = self
            .steps
            .iter()
            .flat_map(|s| s.affected.iter().copied())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Operations that reverse the entry: last step first, each step's
    /// inverse list kept in its own replay order.
    pub(crate) fn undo_ops(&self) -> Vec<Operation> {
        self.steps
            .iter()
            .rev()
            .flat_map(|s| s.inverse.iter().cloned())
            .collect()
    }

    /// Operations that re-apply the entry, in original order.
    pub(crate) fn redo_ops(&self) -> Vec<Operation> {
        self.steps.iter().map(|s| s.forward.clone()).collect()
    }
}

/// Bounded undo/redo stacks.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    batch_depth: usize,
    batch: Vec<AppliedStep>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one applied operation. Inside a batch the step is buffered;
    /// otherwise it becomes its own entry. Either way a fresh recording
    /// invalidates the redo stack.
    pub(crate) fn record(&mut self, applied: Applied) {
        if self.batch_depth > 0 {
            self.batch.push(applied.into());
            return;
        }
        self.push_entry(HistoryEntry {
            steps: vec![applied.into()],
        });
    }

    /// Open an atomic group. Groups nest; only the outermost close commits.
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close an atomic group. Whatever was buffered becomes one entry, so a
    /// failed group still leaves its completed steps undoable.
    pub fn end_batch(&mut self) {
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 && !self.batch.is_empty() {
            let steps = std::mem::take(&mut self.batch);
            self.push_entry(HistoryEntry { steps });
        }
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        self.redo.clear();
        if self.undo.len() > MAX_HISTORY {
            self.undo.remove(0);
        }
    }

    pub(crate) fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    /// Park a consumed undo entry on the redo side (does not clear redo).
    pub(crate) fn restore_to_redo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Park a consumed redo entry back on the undo side (does not clear
    /// redo, unlike a fresh recording).
    pub(crate) fn restore_to_undo(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        if self.undo.len() > MAX_HISTORY {
            self.undo.remove(0);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Drop everything, including any open batch. A diagram reload makes
    /// prior entries meaningless.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.batch.clear();
        self.batch_depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Node, NodeShape};
    use crate::op::OpPayload;
    use kurbo::{Point, Size};

    fn applied() -> Applied {
        let node = Node::new(
            NodeShape::Process,
            Point::new(0.0, 0.0),
            Size::new(100.0, 60.0),
        );
        let id = node.id;
        Applied {
            op: Operation::user(OpPayload::CreateNode { node }),
            inverse: vec![Operation::undo_redo(OpPayload::DeleteNode { id })],
            affected: vec![id],
        }
    }

    #[test]
    fn test_record_pushes_entry() {
        let mut history = History::new();
        history.record(applied());
        assert!(history.can_undo());
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn test_record_clears_redo() {
        let mut history = History::new();
        history.record(applied());
        let entry = history.pop_undo().unwrap();
        history.restore_to_redo(entry);
        assert!(history.can_redo());

        history.record(applied());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_batch_collapses_to_one_entry() {
        let mut history = History::new();
        history.begin_batch();
        history.record(applied());
        history.record(applied());
        history.record(applied());
        history.end_batch();

        assert_eq!(history.undo_depth(), 1);
        let entry = history.pop_undo().unwrap();
        assert_eq!(entry.undo_ops().len(), 3);
    }

    #[test]
    fn test_nested_batches_commit_once() {
        let mut history = History::new();
        history.begin_batch();
        history.record(applied());
        history.begin_batch();
        history.record(applied());
        history.end_batch();
        assert_eq!(history.undo_depth(), 0, "inner close must not commit");
        history.end_batch();
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn test_empty_batch_records_nothing() {
        let mut history = History::new();
        history.begin_batch();
        history.end_batch();
        assert!(!history.can_undo());
    }

    #[test]
    fn test_undo_ops_reverse_step_order() {
        let mut history = History::new();
        let first = applied();
        let second = applied();
        let first_cell = first.affected[0];
        let second_cell = second.affected[0];

        history.begin_batch();
        history.record(first);
        history.record(second);
        history.end_batch();

        let entry = history.pop_undo().unwrap();
        let undo = entry.undo_ops();
        assert_eq!(undo[0].payload.cell(), second_cell);
        assert_eq!(undo[1].payload.cell(), first_cell);
    }

    #[test]
    fn test_depth_bound_evicts_oldest() {
        let mut history = History::new();
        for _ in 0..110 {
            history.record(applied());
        }
        assert_eq!(history.undo_depth(), 100);
    }

    #[test]
    fn test_clear_resets_open_batch() {
        let mut history = History::new();
        history.begin_batch();
        history.record(applied());
        history.clear();
        history.end_batch();
        assert!(!history.can_undo());
    }
}
