//! Linear undo/redo over full-board snapshots.

use std::collections::VecDeque;

use corkboard_types::BoxId;

use crate::board::{Board, NoteBox};
use crate::camera::CanvasTransform;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Deep copy of the board taken at a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub boxes: Vec<NoteBox>,
    pub selected: Option<BoxId>,
    pub transform: CanvasTransform,
}

impl Snapshot {
    pub fn capture(board: &Board) -> Self {
        Self {
            boxes: board.boxes().to_vec(),
            selected: board.selected().cloned(),
            transform: *board.transform(),
        }
    }
}

/// Snapshot stack with a cursor.
///
/// `cursor` is `None` before the first checkpoint, otherwise the index of
/// the snapshot matching the board.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Snapshot>,
    cursor: Option<usize>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        match self.cursor {
            Some(c) => c + 1 < self.entries.len(),
            None => false,
        }
    }

    /// Record the board, dropping any redo tail and the oldest entries past
    /// capacity.
    pub fn checkpoint(&mut self, board: &Board) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push_back(Snapshot::capture(board));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Whether the snapshot under the cursor already holds `board`'s boxes.
    pub fn matches(&self, board: &Board) -> bool {
        self.cursor
            .and_then(|c| self.entries.get(c))
            .is_some_and(|s| s.boxes == board.boxes())
    }

    /// Restore the previous snapshot. Restoring never records a checkpoint.
    pub fn undo(&mut self, board: &mut Board) -> bool {
        let Some(cursor) = self.cursor.filter(|&c| c > 0) else {
            return false;
        };
        self.apply(cursor - 1, board)
    }

    pub fn redo(&mut self, board: &mut Board) -> bool {
        let Some(cursor) = self.cursor.filter(|&c| c + 1 < self.entries.len()) else {
            return false;
        };
        self.apply(cursor + 1, board)
    }

    fn apply(&mut self, index: usize, board: &mut Board) -> bool {
        let Some(snapshot) = self.entries.get(index) else {
            return false;
        };
        let snapshot = snapshot.clone();
        board.restore(snapshot.boxes, snapshot.selected, snapshot.transform);
        self.cursor = Some(index);
        true
    }

    /// Forget everything, e.g. when switching notes.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::StampClock;
    use corkboard_types::Point;

    fn setup() -> (Board, History, StampClock) {
        let board = Board::new();
        let mut history = History::default();
        history.checkpoint(&board);
        (board, history, StampClock::manual(1))
    }

    #[test]
    fn undo_at_first_entry_is_noop() {
        let (mut board, mut history, _) = setup();
        assert_eq!(history.cursor(), Some(0));
        assert!(!history.undo(&mut board));
        assert_eq!(history.cursor(), Some(0));
    }

    #[test]
    fn undo_redo_restores_boards() {
        let (mut board, mut history, mut clock) = setup();
        let id = board.add_box(Point::new(1.0, 2.0), &mut clock);
        history.checkpoint(&board);

        assert!(history.undo(&mut board));
        assert!(board.boxes().is_empty());
        assert!(!history.can_undo());

        assert!(history.redo(&mut board));
        assert!(board.contains(&id));
        assert_eq!(board.selected(), Some(&id));
        assert!(!history.redo(&mut board));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn checkpoint_after_undo_truncates() {
        let (mut board, mut history, mut clock) = setup();
        board.add_box(Point::ORIGIN, &mut clock);
        history.checkpoint(&board);
        board.add_box(Point::ORIGIN, &mut clock);
        history.checkpoint(&board);

        history.undo(&mut board);
        history.undo(&mut board);
        board.add_box(Point::new(5.0, 5.0), &mut clock);
        history.checkpoint(&board);

        assert_eq!(history.len(), 2);
        assert!(!history.can_redo());
        assert!(!history.redo(&mut board));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let (mut board, _, mut clock) = setup();
        let mut history = History::new(3);
        for _ in 0..5 {
            board.add_box(Point::ORIGIN, &mut clock);
            history.checkpoint(&board);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), Some(2));
        history.undo(&mut board);
        history.undo(&mut board);
        assert!(!history.undo(&mut board));
        assert_eq!(board.boxes().len(), 3);
    }

    #[test]
    fn restore_does_not_grow_history() {
        let (mut board, mut history, mut clock) = setup();
        board.add_box(Point::ORIGIN, &mut clock);
        history.checkpoint(&board);
        for _ in 0..10 {
            history.undo(&mut board);
            history.redo(&mut board);
        }
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn snapshots_are_deep() {
        let (mut board, mut history, mut clock) = setup();
        let id = board.add_box(Point::ORIGIN, &mut clock);
        history.checkpoint(&board);
        board.replace_content(&id, "changed");
        history.checkpoint(&board);
        history.undo(&mut board);
        assert_eq!(
            board.get(&id).unwrap().content,
            crate::document::Document::placeholder()
        );
    }

    #[test]
    fn matches_tracks_the_cursor_snapshot() {
        let (mut board, _, mut clock) = setup();
        let mut history = History::new(5);
        assert!(!history.matches(&board));
        history.checkpoint(&board);
        assert!(history.matches(&board));
        board.add_box(Point::ORIGIN, &mut clock);
        assert!(!history.matches(&board));
    }
}
