//! Box operations available to the assistant.
//!
//! These go through [`CanvasSession`] exactly like user edits: each
//! mutation is an undo step and schedules a flush.

use std::time::Instant;

use corkboard_core::board::{Board, NoteBox};
use corkboard_types::{BoxId, Point};
use serde::Serialize;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

use crate::session::CanvasSession;

pub const PREVIEW_GRAPHEMES: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxCandidate {
    pub id: BoxId,
    pub title: String,
    pub preview: String,
}

impl BoxCandidate {
    fn of(b: &NoteBox) -> Self {
        Self {
            id: b.id.clone(),
            title: b.title(),
            preview: preview(&b.content.plain_text()),
        }
    }
}

/// Which box an operation is aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoxTarget {
    Id(BoxId),
    /// Free text matched against box contents.
    Description(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    #[default]
    Replace,
    /// Append to the last paragraph.
    Append,
    /// Add a new paragraph at the end.
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantOutcome {
    Updated(BoxId),
    Created(BoxId),
    /// Several boxes matched; the caller must pick one.
    Disambiguation(Vec<BoxCandidate>),
    NotFound,
}

/// Single-line excerpt of at most [`PREVIEW_GRAPHEMES`] graphemes.
fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.graphemes(true).count() <= PREVIEW_GRAPHEMES {
        return flat;
    }
    let mut cut: String = flat.graphemes(true).take(PREVIEW_GRAPHEMES - 1).collect();
    cut.push('…');
    cut
}

/// Boxes whose text contains `query`, ignoring case, topmost first.
pub fn find_boxes(board: &Board, query: &str) -> Vec<BoxCandidate> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut hits: Vec<&NoteBox> = board
        .boxes()
        .iter()
        .filter(|b| b.content.plain_text().to_lowercase().contains(&needle))
        .collect();
    hits.sort_by(|a, b| b.z_index.cmp(&a.z_index));
    hits.into_iter().map(BoxCandidate::of).collect()
}

/// Resolve a target to a single box id, or the outcome to report instead.
pub fn resolve_target(board: &Board, target: &BoxTarget) -> Result<BoxId, AssistantOutcome> {
    match target {
        BoxTarget::Id(id) if board.contains(id) => Ok(id.clone()),
        BoxTarget::Id(_) => Err(AssistantOutcome::NotFound),
        BoxTarget::Description(query) => {
            let mut hits = find_boxes(board, query);
            match hits.len() {
                0 => Err(AssistantOutcome::NotFound),
                1 => Ok(hits.remove(0).id),
                _ => Err(AssistantOutcome::Disambiguation(hits)),
            }
        }
    }
}

impl CanvasSession {
    pub fn find_boxes(&self, query: &str) -> Vec<BoxCandidate> {
        find_boxes(self.board(), query)
    }

    pub fn update_box_content(
        &mut self,
        target: &BoxTarget,
        text: &str,
        mode: UpdateMode,
        now: Instant,
    ) -> AssistantOutcome {
        let id = match resolve_target(self.board(), target) {
            Ok(id) => id,
            Err(outcome) => {
                debug!(?target, ?outcome, "Assistant target not resolved");
                return outcome;
            }
        };
        if self.edit_session().editing_box() == Some(&id) {
            self.end_edit(now);
        }
        let applied = self.mutate_board(now, |board| match mode {
            UpdateMode::Replace => board.replace_content(&id, text),
            UpdateMode::Append => board.append_text(&id, text),
            UpdateMode::Insert => board.insert_paragraph(&id, text),
        });
        if !applied {
            return AssistantOutcome::NotFound;
        }
        info!(box_id = %id, ?mode, "Assistant updated box");
        AssistantOutcome::Updated(id)
    }

    /// Create a box holding `text`, at `at` or the middle of the viewport.
    pub fn create_box(&mut self, text: &str, at: Option<Point>, now: Instant) -> AssistantOutcome {
        let at = at.unwrap_or_else(|| self.viewport_center());
        let id = self.add_box_with_text(text, at, now);
        info!(box_id = %id, "Assistant created box");
        AssistantOutcome::Created(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use corkboard_core::clock::StampClock;
    use corkboard_core::storage::MemoryStore;
    use corkboard_core::workspace::Workspace;

    use crate::engine::{Effect, EngineConfig};

    const MS: Duration = Duration::from_millis(1);

    fn board_with(texts: &[&str]) -> (Board, Vec<BoxId>) {
        let mut board = Board::new();
        let mut clock = StampClock::manual(1);
        let ids = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let id = board.add_box(Point::new(i as f64 * 10.0, 0.0), &mut clock);
                board.replace_content(&id, text);
                id
            })
            .collect();
        (board, ids)
    }

    #[test]
    fn find_is_case_insensitive_and_topmost_first() {
        let (board, ids) = board_with(&["Buy MILK", "call mom", "milk the cow"]);
        let hits = find_boxes(&board, "milk");
        let found: Vec<&BoxId> = hits.iter().map(|c| &c.id).collect();
        assert_eq!(found, vec![&ids[2], &ids[0]]);
        assert_eq!(hits[1].title, "Buy MILK");
        assert!(find_boxes(&board, "   ").is_empty());
    }

    #[test]
    fn ambiguous_description_asks_instead_of_guessing() {
        let (board, ids) = board_with(&["draft intro", "draft outro", "budget"]);
        match resolve_target(&board, &BoxTarget::Description("draft".into())) {
            Err(AssistantOutcome::Disambiguation(c)) => assert_eq!(c.len(), 2),
            other => panic!("expected disambiguation, got {other:?}"),
        }
        assert_eq!(
            resolve_target(&board, &BoxTarget::Description("budget".into())),
            Ok(ids[2].clone())
        );
        assert_eq!(
            resolve_target(&board, &BoxTarget::Id("nope".into())),
            Err(AssistantOutcome::NotFound)
        );
    }

    #[test]
    fn preview_is_bounded_in_graphemes() {
        let long = "é".repeat(200);
        let p = preview(&long);
        assert_eq!(p.graphemes(true).count(), PREVIEW_GRAPHEMES);
        assert!(p.ends_with('…'));
        assert_eq!(preview("a\n\nb"), "a b");
    }

    // ── Session write path ────────────────────────────────────────────

    fn open_session(texts: &[&str]) -> (CanvasSession, Vec<BoxId>, Instant) {
        let t0 = Instant::now();
        let mut workspace = Workspace::new();
        workspace.create_collection("c".into(), "Inbox").unwrap();
        workspace
            .create_note(&"c".into(), "n".into(), "Plan", StampClock::manual(0).now_utc())
            .unwrap();
        let config = EngineConfig {
            push_enabled: false,
            ..EngineConfig::default()
        };
        let mut session = CanvasSession::new(
            workspace,
            Arc::new(MemoryStore::new()),
            config,
            50,
            StampClock::manual(1_700_000_000_000),
            t0,
        );
        session.open_note("c".into(), "n".into(), t0).unwrap();
        let ids = texts
            .iter()
            .enumerate()
            .map(|(i, text)| session.add_box_with_text(text, Point::new(i as f64 * 400.0, 0.0), t0))
            .collect();
        (session, ids, t0)
    }

    /// The write dispatched by the next debounce, as `(ticket, version)`.
    fn flushed_write(session: &mut CanvasSession, at: Instant) -> Option<(u64, u64)> {
        session.tick(at).iter().find_map(|e| match e {
            Effect::Put {
                ticket, version, ..
            } => Some((*ticket, *version)),
            _ => None,
        })
    }

    #[test]
    fn every_update_mode_is_an_undo_step_and_a_write() {
        let (mut s, ids, t0) = open_session(&["groceries"]);
        let target = BoxTarget::Id(ids[0].clone());
        let modes = [
            (UpdateMode::Replace, "eggs"),
            (UpdateMode::Append, "milk"),
            (UpdateMode::Insert, "bread"),
        ];
        for (step, (mode, text)) in modes.into_iter().enumerate() {
            let at = t0 + (step as u32 + 1) * 2000 * MS;
            let steps_before = s.history().len();
            assert_eq!(
                s.update_box_content(&target, text, mode, at),
                AssistantOutcome::Updated(ids[0].clone())
            );
            assert_eq!(s.history().len(), steps_before + 1);

            let (ticket, version) =
                flushed_write(&mut s, at + 1000 * MS).expect("update schedules a write");
            s.handle_put(&"n".into(), ticket, Ok(version + 1), at + 1100 * MS);
        }

        let text = s.board().get(&ids[0]).unwrap().content.plain_text();
        assert!(!text.contains("groceries"));
        for word in ["eggs", "milk", "bread"] {
            assert!(text.contains(word), "{word} missing from {text:?}");
        }
        assert_eq!(s.workspace().current_note().unwrap().version, 4);
    }

    #[test]
    fn update_of_box_under_edit_commits_the_draft_first() {
        let (mut s, ids, t0) = open_session(&["notes"]);
        assert!(s.begin_edit(&ids[0], t0));
        s.edit(t0, |ed| {
            ed.select_all();
            ed.insert_text("typed by hand");
        });

        let outcome = s.update_box_content(
            &BoxTarget::Id(ids[0].clone()),
            "from the assistant",
            UpdateMode::Insert,
            t0 + 10 * MS,
        );
        assert_eq!(outcome, AssistantOutcome::Updated(ids[0].clone()));
        assert!(s.edit_session().editing_box().is_none());

        let text = s.board().get(&ids[0]).unwrap().content.plain_text();
        assert!(text.contains("typed by hand"));
        assert!(text.contains("from the assistant"));

        // Undo drops the assistant paragraph but keeps the committed draft.
        assert!(s.undo(t0 + 20 * MS));
        let text = s.board().get(&ids[0]).unwrap().content.plain_text();
        assert!(text.contains("typed by hand"));
        assert!(!text.contains("from the assistant"));
    }

    #[test]
    fn created_box_lands_in_the_viewport_center() {
        let (mut s, _, t0) = open_session(&[]);
        s.set_viewport(800.0, 600.0);
        s.pan_by(100.0, -50.0, t0);
        let steps_before = s.history().len();

        let id = match s.create_box("hello", None, t0) {
            AssistantOutcome::Created(id) => id,
            other => panic!("expected a new box, got {other:?}"),
        };
        let created = s.board().get(&id).unwrap();
        assert_eq!(created.position(), s.viewport_center());
        assert_eq!(created.content.plain_text(), "hello");
        assert_eq!(s.history().len(), steps_before + 1);
        assert!(flushed_write(&mut s, t0 + 1000 * MS).is_some());
    }

    #[test]
    fn ambiguous_update_leaves_the_board_alone() {
        let (mut s, _, t0) = open_session(&["draft intro", "draft outro"]);
        let before = s.board().boxes().to_vec();
        let steps_before = s.history().len();
        // Flush the setup so only the assistant call could schedule a write.
        let (ticket, version) = flushed_write(&mut s, t0 + 1000 * MS).unwrap();
        s.handle_put(&"n".into(), ticket, Ok(version + 1), t0 + 1100 * MS);

        let outcome = s.update_box_content(
            &BoxTarget::Description("draft".into()),
            "replaced",
            UpdateMode::Replace,
            t0 + 2000 * MS,
        );
        match outcome {
            AssistantOutcome::Disambiguation(candidates) => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().all(|c| c.preview.starts_with("draft")));
            }
            other => panic!("expected disambiguation, got {other:?}"),
        }
        assert_eq!(s.board().boxes(), before.as_slice());
        assert_eq!(s.history().len(), steps_before);
        assert!(flushed_write(&mut s, t0 + 3000 * MS).is_none());
    }
}
