//! The per-diagram editing façade.
//!
//! Three producers feed the same executor: pointer gestures, remote
//! collaborator edits and the undo/redo stacks. The editor serializes them
//! through one `&mut self` entry point and decides, per suppression state,
//! which of the three fan-outs a successful result reaches: the undo stack,
//! the outbound broadcast queue, and the change-event queue for the
//! rendering collaborator.
//!
//! Suppression states are entered and exited in scoped pairs around a unit
//! of work, released on every `Result` path, so a failed operation can never
//! leave the editor stuck in a suppressed state.

use crate::cell::CellId;
use crate::error::EngineError;
use crate::executor::{self, Applied};
use crate::graph::Diagram;
use crate::history::History;
use crate::interaction::{self, CanvasEvent};
use crate::op::{OpPayload, OpSource, Operation};
use crate::selection::Selection;
use log::{debug, error, warn};

/// Change notifications for the rendering collaborator. Drained with
/// [`Editor::take_events`]; nothing is queued while a suppression state is
/// active.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    CellAdded(CellId),
    CellRemoved(CellId),
    CellChanged(CellId),
    /// Layering or containment ripple: cells the re-balance cascade moved.
    ZOrderChanged(Vec<CellId>),
    SelectionChanged(Vec<CellId>),
}

/// Which suppressed unit of work is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Loading,
    Remote,
    UndoRedo,
}

/// Independent suppression flags, one per producer that must not re-enter
/// the history.
#[derive(Debug, Clone, Copy, Default)]
struct Suppression {
    loading: bool,
    remote: bool,
    undo_redo: bool,
}

impl Suppression {
    fn any(self) -> bool {
        self.loading || self.remote || self.undo_redo
    }
}

/// Editing state for one open diagram.
#[derive(Debug, Default)]
pub struct Editor {
    diagram: Diagram,
    history: History,
    suppress: Suppression,
    /// Depth of `visual_effect` nesting; style-only work never records.
    visual_depth: usize,
    selection: Selection,
    outbound: Vec<Operation>,
    events: Vec<ChangeEvent>,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    pub(crate) fn diagram_mut(&mut self) -> &mut Diagram {
        &mut self.diagram
    }

    /// Execute one operation and fan the result out according to the current
    /// suppression state. Returns the ids of every cell touched.
    pub fn apply(&mut self, op: Operation) -> Result<Vec<CellId>, EngineError> {
        let applied = executor::execute(&mut self.diagram, &op)?;
        Ok(self.fan_out(applied))
    }

    /// Convert a raw canvas interaction into its retroactive operation and
    /// apply it.
    pub fn apply_canvas_event(&mut self, event: CanvasEvent) -> Result<Vec<CellId>, EngineError> {
        self.apply(interaction::operation_for(event))
    }

    fn fan_out(&mut self, applied: Applied) -> Vec<CellId> {
        let affected = applied.affected.clone();

        if self.selection.prune(&self.diagram) && !self.suppress.any() {
            self.events
                .push(ChangeEvent::SelectionChanged(self.selection.ids().to_vec()));
        }

        if !self.suppress.any() {
            self.emit_change_events(&applied);
            if self.visual_depth == 0 {
                if applied.op.source != OpSource::Remote {
                    self.outbound.push(applied.op.clone());
                }
                self.history.record(applied);
            }
        }

        affected
    }

    fn emit_change_events(&mut self, applied: &Applied) {
        let primary = applied.op.payload.cell();
        self.events.push(match applied.op.payload {
            OpPayload::CreateNode { .. } | OpPayload::CreateEdge { .. } => {
                ChangeEvent::CellAdded(primary)
            }
            OpPayload::UpdateNode { .. } | OpPayload::UpdateEdge { .. } => {
                ChangeEvent::CellChanged(primary)
            }
            OpPayload::DeleteNode { .. } | OpPayload::DeleteEdge { .. } => {
                ChangeEvent::CellRemoved(primary)
            }
        });

        let mut ripple = Vec::new();
        for id in &applied.affected {
            if *id == primary {
                continue;
            }
            if self.diagram.contains(*id) {
                ripple.push(*id);
            } else {
                self.events.push(ChangeEvent::CellRemoved(*id));
            }
        }
        if !ripple.is_empty() {
            self.events.push(ChangeEvent::ZOrderChanged(ripple));
        }
    }

    // --- Suppression scopes ---

    /// Run a unit of work under one suppression flag, releasing it on every
    /// return path.
    pub(crate) fn scoped<R>(
        &mut self,
        scope: Scope,
        f: impl FnOnce(&mut Self) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.enter(scope);
        let result = f(self);
        self.exit(scope);
        result
    }

    fn enter(&mut self, scope: Scope) {
        debug!("enter {scope:?}");
        match scope {
            Scope::Loading => self.suppress.loading = true,
            Scope::Remote => self.suppress.remote = true,
            Scope::UndoRedo => self.suppress.undo_redo = true,
        }
    }

    fn exit(&mut self, scope: Scope) {
        match scope {
            Scope::Loading => self.suppress.loading = false,
            Scope::Remote => self.suppress.remote = false,
            Scope::UndoRedo => self.suppress.undo_redo = false,
        }
        debug!("exit {scope:?}");
    }

    /// Whether any suppression state is active.
    pub fn is_suppressed(&self) -> bool {
        self.suppress.any()
    }

    // --- History ---

    /// Collapse every operation applied inside `f` into one undoable step.
    pub fn atomic<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.history.begin_batch();
        let result = f(self);
        self.history.end_batch();
        result
    }

    /// Run style-only work. Whatever it applies is kept out of the undo
    /// stack and the outbound queue, independent of suppression state.
    pub fn visual_effect<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.visual_depth += 1;
        let result = f(self);
        self.visual_depth -= 1;
        result
    }

    /// Reverse the most recent history entry. Returns false on an empty
    /// stack.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.pop_undo() else {
            return false;
        };
        let ops = entry.undo_ops();
        let result = self.scoped(Scope::UndoRedo, |ed| {
            for op in &ops {
                match executor::execute(&mut ed.diagram, op) {
                    Ok(_) => {}
                    Err(err) if err.is_benign_for_replay() => {
                        warn!("undo step on missing cell skipped: {err}");
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        });
        self.selection.prune(&self.diagram);
        match result {
            Ok(()) => {
                self.history.restore_to_redo(entry);
                true
            }
            Err(err) => {
                error!("undo abandoned: {err}");
                false
            }
        }
    }

    /// Re-apply the most recently undone entry. Returns false on an empty
    /// stack.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.history.pop_redo() else {
            return false;
        };
        let ops = entry.redo_ops();
        let result = self.scoped(Scope::UndoRedo, |ed| {
            for op in &ops {
                match executor::execute(&mut ed.diagram, op) {
                    Ok(_) => {}
                    Err(err) if err.is_benign_for_replay() => {
                        warn!("redo step on missing cell skipped: {err}");
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        });
        self.selection.prune(&self.diagram);
        match result {
            Ok(()) => {
                self.history.restore_to_undo(entry);
                true
            }
            Err(err) => {
                error!("redo abandoned: {err}");
                false
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    pub(crate) fn clear_history(&mut self) {
        self.history.clear();
    }

    // --- Selection ---

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn select(&mut self, id: CellId) {
        if self.selection.select(id) {
            self.emit_selection_changed();
        }
    }

    pub fn toggle_selection(&mut self, id: CellId) {
        if self.selection.toggle(id) {
            self.emit_selection_changed();
        }
    }

    pub fn clear_selection(&mut self) {
        if self.selection.clear() {
            self.emit_selection_changed();
        }
    }

    fn emit_selection_changed(&mut self) {
        if !self.suppress.any() {
            self.events
                .push(ChangeEvent::SelectionChanged(self.selection.ids().to_vec()));
        }
    }

    // --- Queues ---

    /// Drain queued change notifications for the rendering collaborator.
    pub fn take_events(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain operations queued for broadcast to collaborators.
    pub fn take_outbound(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.outbound)
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }
}
