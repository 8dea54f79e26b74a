//! Local key/value cache used offline and as a fallback for the remote store.
//!
//! Failures never escape to callers of the typed helpers: unreadable or
//! malformed entries are logged and treated as absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::board::{Board, NoteBox};
use crate::camera::CanvasTransform;
use crate::workspace::Workspace;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Workspace,
    Board,
    Ai,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Workspace => "whiteboard.workspace.v1",
            StorageKey::Board => "whiteboard-state",
            StorageKey::Ai => "whiteboard.ai.v1",
        }
    }
}

pub trait LocalStore: Send + Sync {
    fn read(&self, key: StorageKey) -> Result<Option<String>, StorageError>;
    fn write(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: StorageKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl LocalStore for FileStore {
    fn read(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(key)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn read(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(&key).cloned())
    }

    fn write(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        self.entries.lock().remove(&key);
        Ok(())
    }
}

/// Read and parse an entry; malformed data is logged and dropped.
pub fn load<T: DeserializeOwned>(store: &dyn LocalStore, key: StorageKey) -> Option<T> {
    let raw = match store.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(key = key.as_str(), ?err, "Failed to read local storage");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key = key.as_str(), ?err, "Dropping malformed local storage entry");
            None
        }
    }
}

/// Serialize and write an entry. Returns false (after logging) on failure.
pub fn save<T: Serialize>(store: &dyn LocalStore, key: StorageKey, value: &T) -> bool {
    let result = serde_json::to_string(value)
        .map_err(StorageError::from)
        .and_then(|json| store.write(key, &json));
    match result {
        Ok(()) => {
            debug!(key = key.as_str(), "Saved to local storage");
            true
        }
        Err(err) => {
            warn!(key = key.as_str(), ?err, "Failed to save local storage");
            false
        }
    }
}

/// Persisted shape of the open board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    #[serde(default)]
    pub note_boxes: Vec<NoteBox>,
    #[serde(default)]
    pub canvas_transform: CanvasTransform,
}

impl BoardState {
    pub fn capture(board: &Board) -> Self {
        Self {
            note_boxes: board.boxes().to_vec(),
            canvas_transform: *board.transform(),
        }
    }

    /// Selection is never restored.
    pub fn into_board(self) -> Board {
        Board::from_parts(self.note_boxes, self.canvas_transform)
    }
}

/// Load the cached workspace. The active pointer is always cleared and an
/// inconsistent cache is discarded.
pub fn load_workspace(store: &dyn LocalStore) -> Workspace {
    let Some(mut workspace) = load::<Workspace>(store, StorageKey::Workspace) else {
        return Workspace::default();
    };
    if let Err(err) = workspace.validate() {
        warn!(?err, "Discarding inconsistent cached workspace");
        return Workspace::default();
    }
    workspace.clear_active();
    workspace
}

pub fn save_workspace(store: &dyn LocalStore, workspace: &Workspace) -> bool {
    save(store, StorageKey::Workspace, workspace)
}

pub fn load_board(store: &dyn LocalStore) -> Option<Board> {
    load::<BoardState>(store, StorageKey::Board).map(BoardState::into_board)
}

pub fn save_board(store: &dyn LocalStore, board: &Board) -> bool {
    save(store, StorageKey::Board, &BoardState::capture(board))
}
