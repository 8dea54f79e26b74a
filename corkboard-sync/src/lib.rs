//! # corkboard-sync
//!
//! Keeps the open note in step with the server.
//!
//! [`SyncEngine`] is a deterministic state machine: it takes edits, timer
//! ticks, push messages and REST results and answers with [`Effect`]s.
//! [`CanvasSession`] wraps it together with the board, history and
//! workspace, and [`SyncDriver`] runs a session on tokio with the
//! WebSocket [`PushClient`] and the REST [`RestClient`].

pub mod assistant;
pub mod driver;
pub mod engine;
pub mod protocol;
pub mod push;
pub mod remote;
pub mod scheduler;
pub mod session;

pub use assistant::{AssistantOutcome, BoxCandidate, BoxTarget, UpdateMode};
pub use driver::SyncDriver;
pub use engine::{Effect, EngineConfig, FetchReason, Notice, SyncEngine, WriteTicket};
pub use protocol::{ClientMessage, NotePayload, ServerMessage};
pub use push::{PushClient, PushError, PushHandle};
pub use remote::{NoteApi, RemoteCollection, RemoteError, RemoteNote, RemoteNoteSummary, RestClient};
pub use session::CanvasSession;
