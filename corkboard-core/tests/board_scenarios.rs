//! End-to-end board scenarios across the camera, board, editor and history.

use corkboard_core::camera::WheelInput;
use corkboard_core::document::{MarkKind, Marks, PLACEHOLDER_TEXT};
use corkboard_core::{
    extract_plain_text, Board, DocumentEditor, EditSession, History, MemoryStore, Selection,
    StampClock, TextPoint, Workspace,
};
use corkboard_core::{storage, Point};

const ORIGIN: Point = Point::ORIGIN;

#[test]
fn box_created_at_pointer_stays_anchored_through_zoom() {
    let mut board = Board::new();
    let mut clock = StampClock::manual(1_000);

    let pointer = Point::new(120.0, 80.0);
    let at = board.transform().screen_to_canvas(pointer, ORIGIN);
    let id = board.add_box(at, &mut clock);
    let b = board.get(&id).unwrap().clone();
    assert_eq!((b.x, b.y), (120.0, 80.0));

    let zoomed = board.transform_mut().wheel(
        WheelInput {
            delta_x: 0.0,
            delta_y: -100.0,
            modifier: false,
            pointer,
        },
        false,
    );
    assert!(zoomed);
    assert!((board.transform().scale - 1.1).abs() < 1e-9);

    let screen = board.transform().canvas_to_screen(b.position(), ORIGIN);
    assert!((screen.x - 120.0).abs() < 1e-9);
    assert!((screen.y - 80.0).abs() < 1e-9);
}

#[test]
fn fresh_box_text_is_placeholder() {
    let mut board = Board::new();
    let mut clock = StampClock::manual(1);
    let id = board.add_box(ORIGIN, &mut clock);
    let content = &board.get(&id).unwrap().content;
    assert_eq!(extract_plain_text(content), PLACEHOLDER_TEXT);
    assert!(!content.has_meaningful_content());

    let copy = content.clone();
    assert_eq!(&copy, content);
    assert!(!std::ptr::eq(&copy, content));
}

#[test]
fn bold_on_empty_selection_is_noop() {
    let mut editor = DocumentEditor::new(corkboard_core::Document::paragraph("hello"));
    assert!(!editor.toggle_mark(MarkKind::Bold));

    editor.select(Some(Selection::collapsed(TextPoint::new(0, 2))));
    assert!(!editor.toggle_mark(MarkKind::Bold));
    assert_eq!(editor.active_marks(), Marks::default());
}

#[test]
fn sequential_bring_to_front_orders_last_on_top() {
    let mut board = Board::new();
    let mut clock = StampClock::manual(50);
    let a = board.add_box(ORIGIN, &mut clock);
    let b = board.add_box(ORIGIN, &mut clock);
    let c = board.add_box(ORIGIN, &mut clock);

    board.bring_to_front(&a);
    board.bring_to_front(&b);
    let z = |id| board.get(id).unwrap().z_index;
    assert!(z(&b) > z(&a));
    assert!(z(&a) > z(&c));
}

#[test]
fn editing_session_commits_and_undoes_as_one_step() {
    let mut board = Board::new();
    let mut history = History::default();
    let mut clock = StampClock::manual(10);
    history.checkpoint(&board);

    let id = board.add_box(ORIGIN, &mut clock);
    board.replace_content(&id, "draft");
    history.checkpoint(&board);

    let mut session = EditSession::new();
    session.begin(&mut board, &id);
    for word in [" one", " two"] {
        session.apply(&mut board, |ed| {
            ed.select(Some(Selection::collapsed(TextPoint::new(0, usize::MAX))));
            ed.insert_text(word)
        });
    }
    session.end(&mut board);
    history.checkpoint(&board);
    assert_eq!(
        board.get(&id).unwrap().content.plain_text(),
        "draft one two"
    );

    history.undo(&mut board);
    assert_eq!(board.get(&id).unwrap().content.plain_text(), "draft");
    history.undo(&mut board);
    assert!(board.boxes().is_empty());
}

#[test]
fn board_survives_local_cache_round_trip() {
    let store = MemoryStore::new();
    let mut board = Board::new();
    let mut clock = StampClock::manual(7);
    let id = board.add_box(Point::new(10.0, 20.0), &mut clock);
    board.replace_content(&id, "cached");
    board.transform_mut().zoom(-1.0, ORIGIN);

    assert!(storage::save_board(&store, &board));
    let restored = storage::load_board(&store).unwrap();
    assert_eq!(restored.boxes(), board.boxes());
    assert_eq!(restored.transform(), board.transform());

    let mut ws = Workspace::new();
    ws.create_collection("c".into(), "Inbox").unwrap();
    ws.create_note(&"c".into(), "n".into(), "Scratch", clock.now_utc())
        .unwrap();
    ws.set_active(Some("c".into()), Some("n".into())).unwrap();
    assert!(ws.save_board_to_note(&restored, clock.now_utc()));
    assert_eq!(ws.current_note().unwrap().boxes.len(), 1);
}
