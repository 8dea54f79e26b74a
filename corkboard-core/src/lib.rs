//! # corkboard-core
//!
//! Core library for the corkboard infinite-canvas notes.
//!
//! This crate provides the rich-text document model, the board of boxes with
//! its camera, undo history, the workspace aggregate and the local cache.
//! Nothing here performs network I/O; see `corkboard-sync` for that.

pub mod assistant;
pub mod board;
pub mod camera;
pub mod clock;
pub mod config;
pub mod document;
pub mod edit_session;
pub mod history;
pub mod storage;
pub mod workspace;

pub use assistant::{AiStatus, AssistantState, ChatMessage, Role};
pub use board::{Board, DeleteOutcome, NoteBox};
pub use camera::CanvasTransform;
pub use clock::StampClock;
pub use config::CorkboardConfig;
pub use document::{extract_plain_text, Document, DocumentEditor, Selection, TextPoint};
pub use edit_session::{EditSession, EditState};
pub use history::History;
pub use storage::{FileStore, LocalStore, MemoryStore, StorageKey};
pub use workspace::{Collection, Note, Workspace, WorkspaceError};

pub use corkboard_types::{BoxId, CollectionId, NoteId, Point};
