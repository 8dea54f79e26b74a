//! Draft vs committed content of the box under edit.
//!
//! While a box is being edited its editor holds a draft with its own
//! selection. The draft is written through to the board on every change, and
//! external updates to the board never overwrite it; they only move the
//! session to [`EditState::Reconciling`]. Ending the edit commits the draft.

use corkboard_types::BoxId;
use tracing::{debug, warn};

use crate::board::Board;
use crate::document::DocumentEditor;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum EditState {
    #[default]
    Idle,
    Editing {
        box_id: BoxId,
        draft: DocumentEditor,
    },
    /// The board changed underneath an open draft.
    Reconciling {
        box_id: BoxId,
        draft: DocumentEditor,
    },
}

/// What an external board update did to the open draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalOutcome {
    Unaffected,
    Diverged,
    /// The edited box is gone; the draft was dropped.
    Discarded,
}

#[derive(Debug, Clone, Default)]
pub struct EditSession {
    state: EditState,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn is_editing(&self) -> bool {
        !matches!(self.state, EditState::Idle)
    }

    pub fn editing_box(&self) -> Option<&BoxId> {
        match &self.state {
            EditState::Idle => None,
            EditState::Editing { box_id, .. } | EditState::Reconciling { box_id, .. } => {
                Some(box_id)
            }
        }
    }

    pub fn draft(&self) -> Option<&DocumentEditor> {
        match &self.state {
            EditState::Idle => None,
            EditState::Editing { draft, .. } | EditState::Reconciling { draft, .. } => Some(draft),
        }
    }

    /// Start editing `box_id`, committing any other open draft first.
    /// Returns whether that earlier commit changed the board.
    pub fn begin(&mut self, board: &mut Board, box_id: &BoxId) -> bool {
        if self.editing_box() == Some(box_id) {
            return false;
        }
        let committed = self.end(board);
        let Some(content) = board.get(box_id).map(|b| b.content.clone()) else {
            warn!(box_id = %box_id, "Cannot edit missing box");
            return committed;
        };
        board.set_editing(Some(box_id.clone()));
        self.state = EditState::Editing {
            box_id: box_id.clone(),
            draft: DocumentEditor::new(content),
        };
        debug!(box_id = %box_id, "Editing started");
        committed
    }

    /// Run an editor operation on the draft and write the result through.
    /// Returns the operation's result and whether the board changed.
    pub fn apply<R>(
        &mut self,
        board: &mut Board,
        op: impl FnOnce(&mut DocumentEditor) -> R,
    ) -> Option<(R, bool)> {
        let (box_id, draft) = match &mut self.state {
            EditState::Idle => return None,
            EditState::Editing { box_id, draft } | EditState::Reconciling { box_id, draft } => {
                (box_id, draft)
            }
        };
        let result = op(draft);
        let changed = board.set_content(box_id, draft.document().clone());
        Some((result, changed))
    }

    /// React to the board having been replaced from outside.
    pub fn external_update(&mut self, board: &Board) -> ExternalOutcome {
        let outcome = match &self.state {
            EditState::Idle => ExternalOutcome::Unaffected,
            EditState::Editing { box_id, draft } | EditState::Reconciling { box_id, draft } => {
                match board.get(box_id) {
                    None => ExternalOutcome::Discarded,
                    Some(b) if &b.content != draft.document() => ExternalOutcome::Diverged,
                    Some(_) => ExternalOutcome::Unaffected,
                }
            }
        };
        match outcome {
            ExternalOutcome::Discarded => {
                if let Some(id) = self.editing_box() {
                    debug!(box_id = %id, "Edited box removed remotely, dropping draft");
                }
                self.state = EditState::Idle;
            }
            ExternalOutcome::Diverged => {
                self.state = match std::mem::take(&mut self.state) {
                    EditState::Editing { box_id, draft } => {
                        EditState::Reconciling { box_id, draft }
                    }
                    other => other,
                };
            }
            ExternalOutcome::Unaffected => {}
        }
        outcome
    }

    /// Commit the draft and return to idle. Returns whether the board changed.
    pub fn end(&mut self, board: &mut Board) -> bool {
        let (box_id, draft) = match std::mem::take(&mut self.state) {
            EditState::Idle => return false,
            EditState::Editing { box_id, draft } | EditState::Reconciling { box_id, draft } => {
                (box_id, draft)
            }
        };
        let changed = board.set_content(&box_id, draft.into_document());
        if board.editing() == Some(&box_id) {
            board.set_editing(None);
        }
        debug!(box_id = %box_id, changed, "Editing ended");
        changed
    }

    /// Drop the draft without committing (note switch, box deleted).
    pub fn discard(&mut self) {
        self.state = EditState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::StampClock;
    use crate::document::{Document, Selection, TextPoint};
    use corkboard_types::Point;

    fn board_with_box() -> (Board, BoxId) {
        let mut board = Board::new();
        let mut clock = StampClock::manual(10);
        let id = board.add_box(Point::ORIGIN, &mut clock);
        board.replace_content(&id, "hello");
        (board, id)
    }

    fn type_text(session: &mut EditSession, board: &mut Board, text: &str) -> bool {
        let (_, changed) = session
            .apply(board, |ed| {
                ed.select(Some(Selection::collapsed(TextPoint::new(0, usize::MAX))));
                ed.insert_text(text)
            })
            .unwrap();
        changed
    }

    #[test]
    fn draft_writes_through() {
        let (mut board, id) = board_with_box();
        let mut session = EditSession::new();
        session.begin(&mut board, &id);
        assert_eq!(board.editing(), Some(&id));

        assert!(type_text(&mut session, &mut board, "!"));
        assert_eq!(board.get(&id).unwrap().content.plain_text(), "hello!");
        session.end(&mut board);
        assert_eq!(session.state(), &EditState::Idle);
        assert_eq!(board.editing(), None);
    }

    #[test]
    fn external_update_never_clobbers_draft() {
        let (mut board, id) = board_with_box();
        let mut session = EditSession::new();
        session.begin(&mut board, &id);
        type_text(&mut session, &mut board, " world");

        let mut remote = board.boxes().to_vec();
        remote[0].content = Document::paragraph("remote");
        board.replace_boxes(remote);
        assert_eq!(session.external_update(&board), ExternalOutcome::Diverged);
        assert!(matches!(session.state(), EditState::Reconciling { .. }));
        assert_eq!(
            session.draft().unwrap().document().plain_text(),
            "hello world"
        );

        assert!(session.end(&mut board));
        assert_eq!(
            board.get(&id).unwrap().content.plain_text(),
            "hello world"
        );
    }

    #[test]
    fn removed_box_discards_draft() {
        let (mut board, id) = board_with_box();
        let mut session = EditSession::new();
        session.begin(&mut board, &id);
        board.replace_boxes(vec![]);
        assert_eq!(session.external_update(&board), ExternalOutcome::Discarded);
        assert!(!session.is_editing());
        assert!(!session.end(&mut board));
    }

    #[test]
    fn begin_on_missing_box_stays_idle() {
        let (mut board, _) = board_with_box();
        let mut session = EditSession::new();
        session.begin(&mut board, &BoxId::new("nope"));
        assert!(!session.is_editing());
        assert!(session.apply(&mut board, |_| ()).is_none());
    }
}
