//! The open canvas: board, undo history, edit session, workspace and sync
//! engine behind one facade.
//!
//! Every user operation updates the board, takes a history checkpoint at
//! discrete boundaries and tells the engine something changed. Effects the
//! session can satisfy locally (cache writes, applying remote content) are
//! absorbed here; the rest are returned for the driver to execute.

use std::sync::Arc;
use std::time::Instant;

use corkboard_core::board::{Board, DeleteOutcome, NoteBox};
use corkboard_core::camera::{CanvasTransform, WheelInput};
use corkboard_core::clock::StampClock;
use corkboard_core::document::DocumentEditor;
use corkboard_core::edit_session::{EditSession, ExternalOutcome};
use corkboard_core::history::History;
use corkboard_core::storage::{self, LocalStore};
use corkboard_core::workspace::{Workspace, WorkspaceError};
use corkboard_types::{BoxId, CollectionId, NoteId, Point};
use tracing::{debug, info};

use crate::engine::{Effect, EngineConfig, FetchReason, SyncEngine};
use crate::protocol::{NotePayload, ServerMessage};
use crate::remote::{RemoteError, RemoteNote};

pub struct CanvasSession {
    workspace: Workspace,
    board: Board,
    history: History,
    edit: EditSession,
    engine: SyncEngine,
    clock: StampClock,
    store: Arc<dyn LocalStore>,
    viewport: Point,
}

impl CanvasSession {
    pub fn new(
        workspace: Workspace,
        store: Arc<dyn LocalStore>,
        engine: EngineConfig,
        history_capacity: usize,
        clock: StampClock,
        now: Instant,
    ) -> Self {
        Self {
            workspace,
            board: Board::new(),
            history: History::new(history_capacity),
            edit: EditSession::new(),
            engine: SyncEngine::new(engine, now),
            clock,
            store,
            viewport: Point::ORIGIN,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn edit_session(&self) -> &EditSession {
        &self.edit
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn clock_mut(&mut self) -> &mut StampClock {
        &mut self.clock
    }

    /// Size of the visible canvas area, used to place boxes created
    /// without a position.
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = Point::new(width, height);
    }

    pub fn viewport_center(&self) -> Point {
        let center = Point::new(self.viewport.x / 2.0, self.viewport.y / 2.0);
        self.board.transform().screen_to_canvas(center, Point::ORIGIN)
    }

    /// What a write of the active note would carry right now.
    pub fn payload(&self) -> NotePayload {
        let transform = self.board.transform();
        NotePayload {
            boxes: self.board.boxes().to_vec(),
            zoom: transform.scale,
            pan: transform.pan_offset(),
        }
    }

    // ── Note lifecycle ────────────────────────────────────────────────

    /// Close the current note and load `note_id` onto the board.
    pub fn open_note(
        &mut self,
        collection_id: CollectionId,
        note_id: NoteId,
        now: Instant,
    ) -> Result<Vec<Effect>, WorkspaceError> {
        self.workspace.note(&collection_id, &note_id)?;
        self.close_note();
        self.workspace
            .set_active(Some(collection_id), Some(note_id.clone()))?;
        let Some(note) = self.workspace.current_note() else {
            return Err(WorkspaceError::UnknownNote(note_id));
        };
        let version = note.version;
        self.board = Board::from_parts(
            note.boxes.clone(),
            CanvasTransform::new(note.pan, note.zoom),
        );
        self.history.clear();
        self.history.checkpoint(&self.board);
        self.edit.discard();
        storage::save_board(self.store.as_ref(), &self.board);
        info!(note_id = %note_id, version, boxes = self.board.boxes().len(), "Opened note");

        let payload = self.payload();
        let effects = self.engine.activate(note_id, version, &payload, now);
        Ok(self.absorb(effects))
    }

    /// Commit any draft, write the board back into its note and stop
    /// syncing it.
    pub fn close_note(&mut self) {
        if self.engine.active_note().is_none() {
            return;
        }
        self.edit.end(&mut self.board);
        self.persist_local();
        self.engine.deactivate();
        self.workspace.active.note_id = None;
    }

    fn persist_local(&mut self) {
        let now = self.clock.now_utc();
        self.workspace.save_board_to_note(&self.board, now);
        let store = self.store.as_ref();
        storage::save_workspace(store, &self.workspace);
        storage::save_board(store, &self.board);
    }

    fn changed(&mut self, now: Instant, checkpoint: bool) {
        if checkpoint {
            self.history.checkpoint(&self.board);
        }
        self.engine.local_change(now);
    }

    // ── Board operations ──────────────────────────────────────────────

    pub fn add_box(&mut self, at: Point, now: Instant) -> BoxId {
        let id = self.board.add_box(at, &mut self.clock);
        self.changed(now, true);
        id
    }

    /// Add a box under a pointer given in screen coordinates.
    pub fn add_box_at_screen(&mut self, screen: Point, origin: Point, now: Instant) -> BoxId {
        let at = self.board.transform().screen_to_canvas(screen, origin);
        self.add_box(at, now)
    }

    pub fn add_box_with_text(&mut self, text: &str, at: Point, now: Instant) -> BoxId {
        let id = self.board.add_box(at, &mut self.clock);
        self.board.replace_content(&id, text);
        self.changed(now, true);
        id
    }

    /// End of a drag.
    pub fn move_box(&mut self, id: &BoxId, at: Point, now: Instant) -> bool {
        let moved = self.board.move_box(id, at);
        if moved {
            self.changed(now, true);
        }
        moved
    }

    /// End of a resize gesture.
    pub fn resize_box(&mut self, id: &BoxId, width: f64, height: f64, now: Instant) -> bool {
        let resized = self.board.resize_box(id, width, height);
        if resized {
            self.changed(now, true);
        }
        resized
    }

    /// Content-driven growth; not an undo step.
    pub fn auto_grow(&mut self, id: &BoxId, content_height: f64, now: Instant) -> bool {
        let grew = self.board.auto_grow(id, content_height);
        if grew {
            self.changed(now, false);
        }
        grew
    }

    pub fn delete_box(&mut self, id: &BoxId, confirmed: bool, now: Instant) -> DeleteOutcome {
        let outcome = self.board.delete_box(id, confirmed);
        if outcome == DeleteOutcome::Deleted {
            if self.edit.editing_box() == Some(id) {
                self.edit.discard();
            }
            self.changed(now, true);
        }
        outcome
    }

    pub fn duplicate_box(&mut self, id: &BoxId, now: Instant) -> Option<BoxId> {
        let copy = self.board.duplicate_box(id, &mut self.clock)?;
        self.changed(now, true);
        Some(copy)
    }

    pub fn bring_to_front(&mut self, id: &BoxId, now: Instant) -> bool {
        let raised = self.board.bring_to_front(id);
        if raised {
            self.changed(now, true);
        }
        raised
    }

    pub fn send_to_back(&mut self, id: &BoxId, now: Instant) -> bool {
        let lowered = self.board.send_to_back(id);
        if lowered {
            self.changed(now, true);
        }
        lowered
    }

    pub fn select(&mut self, id: Option<BoxId>) -> bool {
        self.board.select(id)
    }

    /// Run a board mutation as one undo step.
    pub(crate) fn mutate_board(&mut self, now: Instant, op: impl FnOnce(&mut Board) -> bool) -> bool {
        let changed = op(&mut self.board);
        if changed {
            self.changed(now, true);
        }
        changed
    }

    pub fn wheel(&mut self, input: WheelInput, now: Instant) -> bool {
        let editing = self.edit.is_editing();
        let moved = self.board.transform_mut().wheel(input, editing);
        if moved {
            self.changed(now, false);
        }
        moved
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64, now: Instant) {
        self.board.transform_mut().pan_by(dx, dy);
        self.changed(now, false);
    }

    pub fn undo(&mut self, now: Instant) -> bool {
        self.end_edit(now);
        let undone = self.history.undo(&mut self.board);
        if undone {
            self.changed(now, false);
        }
        undone
    }

    pub fn redo(&mut self, now: Instant) -> bool {
        self.end_edit(now);
        let redone = self.history.redo(&mut self.board);
        if redone {
            self.changed(now, false);
        }
        redone
    }

    // ── Text editing ──────────────────────────────────────────────────

    /// Start editing `id`, closing any other draft as its own undo step.
    pub fn begin_edit(&mut self, id: &BoxId, now: Instant) -> bool {
        if self.edit.editing_box() != Some(id) {
            self.end_edit(now);
        }
        self.edit.begin(&mut self.board, id);
        self.edit.editing_box() == Some(id)
    }

    /// Run an editor operation on the open draft.
    pub fn edit<R>(&mut self, now: Instant, op: impl FnOnce(&mut DocumentEditor) -> R) -> Option<R> {
        let (result, changed) = self.edit.apply(&mut self.board, op)?;
        if changed {
            self.engine.local_change(now);
        }
        Some(result)
    }

    /// Commit the draft. The whole edit becomes one undo step.
    pub fn end_edit(&mut self, now: Instant) -> bool {
        if !self.edit.is_editing() {
            return false;
        }
        let changed = self.edit.end(&mut self.board);
        if changed {
            self.engine.local_change(now);
        }
        // Drafts write through as they go, so compare against the last step.
        if !self.history.matches(&self.board) {
            self.history.checkpoint(&self.board);
        }
        changed
    }

    // ── Sync plumbing ─────────────────────────────────────────────────

    pub fn next_deadline(&self) -> Option<Instant> {
        self.engine.next_deadline()
    }

    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let payload = self.payload();
        let effects = self.engine.tick(now, move || payload);
        self.absorb(effects)
    }

    pub fn handle_push(&mut self, msg: ServerMessage, now: Instant) -> Vec<Effect> {
        let effects = self.engine.push_message(msg, now);
        self.absorb(effects)
    }

    pub fn handle_put(
        &mut self,
        note_id: &NoteId,
        ticket: u64,
        result: Result<u64, RemoteError>,
        now: Instant,
    ) -> Vec<Effect> {
        let effects = self.engine.put_result(note_id, ticket, result, now);
        self.absorb(effects)
    }

    pub fn handle_fetch(
        &mut self,
        note_id: &NoteId,
        reason: FetchReason,
        result: Result<RemoteNote, RemoteError>,
        now: Instant,
    ) -> Vec<Effect> {
        let effects = self.engine.fetch_result(note_id, reason, result, now);
        self.absorb(effects)
    }

    pub fn set_online(&mut self, online: bool, now: Instant) {
        self.engine.set_online(online, now);
    }

    fn absorb(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        let mut outbound = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                Effect::PersistLocal => self.persist_local(),
                Effect::ApplyRemote {
                    note_id,
                    boxes,
                    version,
                } => self.apply_remote(note_id, boxes, version),
                Effect::RecordVersion { note_id, version } => {
                    if let Some(note) = self.workspace.find_note_mut(&note_id) {
                        note.observe_version(version);
                    }
                }
                other => outbound.push(other),
            }
        }
        outbound
    }

    fn apply_remote(&mut self, note_id: NoteId, boxes: Vec<NoteBox>, version: u64) {
        let cleared = self.board.replace_boxes(boxes.clone());
        if cleared.selected.is_some() || cleared.editing.is_some() {
            debug!(note_id = %note_id, ?cleared, "Remote update removed focused boxes");
        }
        match self.edit.external_update(&self.board) {
            ExternalOutcome::Diverged => {
                info!(note_id = %note_id, "Remote update diverged from open draft");
            }
            ExternalOutcome::Discarded | ExternalOutcome::Unaffected => {}
        }
        let now = self.clock.now_utc();
        self.workspace
            .apply_remote_update(&note_id, boxes, version, now);
        let store = self.store.as_ref();
        storage::save_workspace(store, &self.workspace);
        storage::save_board(store, &self.board);
        self.engine.mark_synced(self.payload().hash());
        info!(note_id = %note_id, version, "Applied remote update");
    }
}
