//! Writers sharing one in-memory server converge after version conflicts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use corkboard_core::board::NoteBox;
use corkboard_core::clock::StampClock;
use corkboard_core::storage::MemoryStore;
use corkboard_core::workspace::{Note, Workspace};
use corkboard_sync::{
    CanvasSession, Effect, EngineConfig, NoteApi, NotePayload, Notice, RemoteError, RemoteNote,
    ServerMessage, SyncDriver,
};
use corkboard_types::{NoteId, Point};
use parking_lot::Mutex;

const MS: Duration = Duration::from_millis(1);

/// Optimistic-concurrency note store: a write must name the current version.
#[derive(Default)]
struct FakeServer {
    notes: Mutex<HashMap<NoteId, (NotePayload, u64)>>,
    /// Simulates a dropped link: every call fails as `Offline`.
    unreachable: AtomicBool,
}

impl FakeServer {
    fn with_note(id: &str, version: u64) -> Arc<Self> {
        let server = Self::default();
        let empty = NotePayload {
            boxes: vec![],
            zoom: 1.0,
            pan: Point::ORIGIN,
        };
        server.notes.lock().insert(id.into(), (empty, version));
        Arc::new(server)
    }

    fn snapshot(&self, id: &str) -> (Vec<NoteBox>, u64) {
        let notes = self.notes.lock();
        let (payload, version) = &notes[&NoteId::new(id)];
        (payload.boxes.clone(), *version)
    }
}

#[async_trait]
impl NoteApi for FakeServer {
    async fn get_note(&self, id: &NoteId) -> Result<RemoteNote, RemoteError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Offline);
        }
        let notes = self.notes.lock();
        let (payload, version) = notes.get(id).ok_or(RemoteError::Status {
            status: 404,
            body: String::new(),
        })?;
        Ok(RemoteNote {
            id: id.clone(),
            title: None,
            boxes: payload.boxes.clone(),
            version: *version,
            zoom: Some(payload.zoom),
            pan: Some(payload.pan),
        })
    }

    async fn put_note(
        &self,
        id: &NoteId,
        payload: &NotePayload,
        version: u64,
    ) -> Result<u64, RemoteError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Offline);
        }
        let mut notes = self.notes.lock();
        let entry = notes.get_mut(id).ok_or(RemoteError::Offline)?;
        if entry.1 != version {
            return Err(RemoteError::Conflict {
                current_version: Some(entry.1),
            });
        }
        *entry = (payload.clone(), version + 1);
        Ok(version + 1)
    }
}

fn session_at(version: u64, config: EngineConfig, now: Instant) -> CanvasSession {
    let mut workspace = Workspace::new();
    workspace.create_collection("c".into(), "Inbox").unwrap();
    let mut note = Note::new("n".into(), "Plan", StampClock::manual(0).now_utc());
    note.version = version;
    workspace.insert_note(&"c".into(), note).unwrap();
    let mut session = CanvasSession::new(
        workspace,
        Arc::new(MemoryStore::new()),
        config,
        50,
        StampClock::manual(1_700_000_000_000),
        now,
    );
    session.open_note("c".into(), "n".into(), now).unwrap();
    session
}

fn rest_only() -> EngineConfig {
    EngineConfig {
        push_enabled: false,
        ..EngineConfig::default()
    }
}

/// Execute network effects against `server` until the session settles.
/// Returns every notice raised on the way.
fn pump(
    session: &mut CanvasSession,
    server: &FakeServer,
    mut effects: Vec<Effect>,
    now: Instant,
) -> Vec<Notice> {
    let mut notices = Vec::new();
    while !effects.is_empty() {
        let mut next = Vec::new();
        for effect in effects {
            match effect {
                Effect::Put {
                    ticket,
                    note_id,
                    payload,
                    version,
                } => {
                    let result =
                        futures::executor::block_on(server.put_note(&note_id, &payload, version));
                    next.extend(session.handle_put(&note_id, ticket, result, now));
                }
                Effect::Fetch { note_id, reason } => {
                    let result = futures::executor::block_on(server.get_note(&note_id));
                    next.extend(session.handle_fetch(&note_id, reason, result, now));
                }
                Effect::Notice(notice) => notices.push(notice),
                _ => {}
            }
        }
        effects = next;
    }
    notices
}

#[test]
fn stale_writer_adopts_server_version_and_wins() {
    let t0 = Instant::now();
    let server = FakeServer::with_note("n", 5);
    let mut session = session_at(3, rest_only(), t0);

    let id = session.add_box_with_text("from the client", Point::new(40.0, 40.0), t0);
    let effects = session.tick(t0 + 1000 * MS);
    assert!(matches!(effects.as_slice(), [Effect::Put { version: 3, .. }]));

    let notices = pump(&mut session, &server, effects, t0 + 1000 * MS);
    assert!(notices.contains(&Notice::Saved {
        note_id: "n".into(),
        version: 6
    }));

    let (boxes, version) = server.snapshot("n");
    assert_eq!(version, 6);
    assert_eq!(boxes, session.board().boxes());
    assert_eq!(boxes[0].id, id);
    assert_eq!(session.workspace().current_note().unwrap().version, 6);
    assert_eq!(session.engine().unresolved_conflicts(), 0);
}

#[test]
fn two_writers_converge_on_the_last_write() {
    let t0 = Instant::now();
    let server = FakeServer::with_note("n", 1);
    let mut alice = session_at(1, rest_only(), t0);
    let mut bob = session_at(1, rest_only(), t0);

    alice.add_box_with_text("alice", Point::ORIGIN, t0);
    let effects = alice.tick(t0 + 1000 * MS);
    pump(&mut alice, &server, effects, t0 + 1000 * MS);
    assert_eq!(server.snapshot("n").1, 2);

    bob.add_box_with_text("bob", Point::new(300.0, 0.0), t0);
    let effects = bob.tick(t0 + 1000 * MS);
    let notices = pump(&mut bob, &server, effects, t0 + 1000 * MS);
    assert!(notices.iter().any(|n| matches!(n, Notice::Saved { version: 3, .. })));

    let (boxes, version) = server.snapshot("n");
    assert_eq!(version, 3);
    assert_eq!(boxes, bob.board().boxes());

    // The server broadcasts bob's write; alice's board follows.
    let update = ServerMessage::NoteUpdated {
        note_id: "n".into(),
        content: serde_json::to_value(&boxes).unwrap(),
        version,
    };
    alice.handle_push(update, t0 + 1100 * MS);
    assert_eq!(alice.board().boxes(), bob.board().boxes());
    assert_eq!(alice.engine().version(), 3);

    // Nothing left to write on either side.
    assert!(alice.tick(t0 + 16_000 * MS).is_empty());
    assert!(bob
        .tick(t0 + 16_000 * MS)
        .iter()
        .all(|e| !matches!(e, Effect::Put { .. })));
}

#[tokio::test]
async fn driver_flushes_edits_to_the_server() {
    let server = FakeServer::with_note("n", 1);
    let config = EngineConfig {
        debounce: 20 * MS,
        autosave_interval: Duration::from_secs(30),
        ack_fallback: 50 * MS,
        refresh_fallback: 100 * MS,
        push_enabled: false,
    };
    let session = Arc::new(Mutex::new(session_at(1, config, Instant::now())));
    let driver = SyncDriver::new(Arc::clone(&session), server.clone(), None);
    let waker = driver.waker();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(driver.run(None, async move {
        let _ = stop_rx.await;
    }));

    session
        .lock()
        .add_box_with_text("saved by the driver", Point::ORIGIN, Instant::now());
    waker.notify_one();

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.lock().engine().version() < 2 && Instant::now() < deadline {
        tokio::time::sleep(10 * MS).await;
    }
    let _ = stop_tx.send(());
    task.await.unwrap().unwrap();

    let (boxes, version) = server.snapshot("n");
    assert_eq!(version, 2);
    assert_eq!(boxes[0].content.plain_text(), "saved by the driver");
    assert_eq!(session.lock().workspace().find_note(&"n".into()).unwrap().1.version, 2);
}

#[tokio::test]
async fn driver_goes_offline_and_recovers_when_the_server_returns() {
    let server = FakeServer::with_note("n", 1);
    server.unreachable.store(true, Ordering::SeqCst);
    let config = EngineConfig {
        debounce: 20 * MS,
        autosave_interval: Duration::from_secs(30),
        ack_fallback: 50 * MS,
        refresh_fallback: 100 * MS,
        push_enabled: false,
    };
    let session = Arc::new(Mutex::new(session_at(1, config, Instant::now())));
    let driver = SyncDriver::new(Arc::clone(&session), server.clone(), None)
        .with_probe_backoff(10 * MS, 40 * MS);
    let waker = driver.waker();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(driver.run(None, async move {
        let _ = stop_rx.await;
    }));

    session
        .lock()
        .add_box_with_text("written while offline", Point::ORIGIN, Instant::now());
    waker.notify_one();

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.lock().engine().is_online() && Instant::now() < deadline {
        tokio::time::sleep(5 * MS).await;
    }
    assert!(!session.lock().engine().is_online());
    assert_eq!(server.snapshot("n").1, 1);

    server.unreachable.store(false, Ordering::SeqCst);
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.lock().engine().version() < 2 && Instant::now() < deadline {
        tokio::time::sleep(10 * MS).await;
    }
    let _ = stop_tx.send(());
    task.await.unwrap().unwrap();

    assert!(session.lock().engine().is_online());
    let (boxes, version) = server.snapshot("n");
    assert_eq!(version, 2);
    assert_eq!(boxes[0].content.plain_text(), "written while offline");
}
