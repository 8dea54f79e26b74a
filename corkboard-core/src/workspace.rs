//! Collections, notes and the active-note pointer.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use corkboard_types::{CollectionId, NoteId, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::board::{Board, NoteBox};

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(CollectionId),

    #[error("Unknown note: {0}")]
    UnknownNote(NoteId),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid workspace data: {0}")]
    InvalidImport(String),

    #[error("Failed to parse workspace JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

fn default_zoom() -> f64 {
    1.0
}

fn default_version() -> u64 {
    1
}

/// A canvas of boxes plus its saved camera and sync version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,

    #[serde(default)]
    pub boxes: Vec<NoteBox>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,

    #[serde(default = "default_zoom")]
    pub zoom: f64,

    #[serde(default)]
    pub pan: Point,

    /// Remote version used for conflict detection. Never decreases.
    #[serde(default = "default_version")]
    pub version: u64,
}

impl Note {
    pub fn new(id: NoteId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            boxes: Vec::new(),
            created_at: now,
            updated_at: now,
            zoom: default_zoom(),
            pan: Point::ORIGIN,
            version: default_version(),
        }
    }

    /// Raise the version, ignoring stale values.
    pub fn observe_version(&mut self, version: u64) -> bool {
        if version > self.version {
            self.version = version;
            true
        } else {
            false
        }
    }
}

/// Partial note update; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub boxes: Option<Vec<NoteBox>>,
    pub zoom: Option<f64>,
    pub pan: Option<Point>,
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub title: String,
    #[serde(default)]
    pub note_order: Vec<NoteId>,
    #[serde(default)]
    pub notes: BTreeMap<NoteId, Note>,
}

impl Collection {
    pub fn new(id: CollectionId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            note_order: Vec::new(),
            notes: BTreeMap::new(),
        }
    }

    /// Notes in display order.
    pub fn ordered_notes(&self) -> impl Iterator<Item = &Note> {
        self.note_order.iter().filter_map(|id| self.notes.get(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveNote {
    pub collection_id: Option<CollectionId>,
    pub note_id: Option<NoteId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    #[serde(default)]
    pub collection_order: Vec<CollectionId>,
    #[serde(default)]
    pub collections: BTreeMap<CollectionId, Collection>,
    #[serde(default)]
    pub active: ActiveNote,
}

fn check_permutation<T: std::hash::Hash + Eq>(current: &[T], proposed: &[T]) -> Result<()> {
    let current_set: HashSet<&T> = current.iter().collect();
    let proposed_set: HashSet<&T> = proposed.iter().collect();
    if proposed_set.len() != proposed.len() {
        return Err(WorkspaceError::InvalidOrder("order contains duplicates".into()));
    }
    if current_set != proposed_set {
        return Err(WorkspaceError::InvalidOrder(
            "order must contain exactly the existing ids".into(),
        ));
    }
    Ok(())
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, id: &CollectionId) -> Result<&Collection> {
        self.collections
            .get(id)
            .ok_or_else(|| WorkspaceError::UnknownCollection(id.clone()))
    }

    fn collection_mut(&mut self, id: &CollectionId) -> Result<&mut Collection> {
        self.collections
            .get_mut(id)
            .ok_or_else(|| WorkspaceError::UnknownCollection(id.clone()))
    }

    /// Collections in display order.
    pub fn ordered_collections(&self) -> impl Iterator<Item = &Collection> {
        self.collection_order
            .iter()
            .filter_map(|id| self.collections.get(id))
    }

    pub fn note(&self, collection_id: &CollectionId, note_id: &NoteId) -> Result<&Note> {
        self.collection(collection_id)?
            .notes
            .get(note_id)
            .ok_or_else(|| WorkspaceError::UnknownNote(note_id.clone()))
    }

    pub fn note_mut(&mut self, collection_id: &CollectionId, note_id: &NoteId) -> Result<&mut Note> {
        self.collection_mut(collection_id)?
            .notes
            .get_mut(note_id)
            .ok_or_else(|| WorkspaceError::UnknownNote(note_id.clone()))
    }

    /// Locate a note in any collection.
    pub fn find_note_mut(&mut self, note_id: &NoteId) -> Option<&mut Note> {
        self.collections
            .values_mut()
            .find_map(|c| c.notes.get_mut(note_id))
    }

    pub fn find_note(&self, note_id: &NoteId) -> Option<(&CollectionId, &Note)> {
        self.collections
            .values()
            .find_map(|c| c.notes.get(note_id).map(|n| (&c.id, n)))
    }

    // ── Collections ───────────────────────────────────────────────────

    pub fn create_collection(&mut self, id: CollectionId, title: &str) -> Result<()> {
        if self.collections.contains_key(&id) {
            return Err(WorkspaceError::DuplicateId(id.to_string()));
        }
        self.collection_order.push(id.clone());
        self.collections
            .insert(id.clone(), Collection::new(id, title));
        Ok(())
    }

    pub fn rename_collection(&mut self, id: &CollectionId, title: &str) -> Result<()> {
        self.collection_mut(id)?.title = title.to_string();
        Ok(())
    }

    pub fn delete_collection(&mut self, id: &CollectionId) -> Result<Collection> {
        let removed = self
            .collections
            .remove(id)
            .ok_or_else(|| WorkspaceError::UnknownCollection(id.clone()))?;
        self.collection_order.retain(|c| c != id);
        if self.active.collection_id.as_ref() == Some(id) {
            self.active = ActiveNote::default();
        }
        Ok(removed)
    }

    pub fn reorder_collections(&mut self, order: Vec<CollectionId>) -> Result<()> {
        check_permutation(&self.collection_order, &order)?;
        self.collection_order = order;
        Ok(())
    }

    // ── Notes ─────────────────────────────────────────────────────────

    /// Append a note to a collection. A note id lives in one collection only.
    pub fn insert_note(&mut self, collection_id: &CollectionId, note: Note) -> Result<()> {
        self.collection(collection_id)?;
        if self.find_note(&note.id).is_some() {
            return Err(WorkspaceError::DuplicateId(note.id.to_string()));
        }
        let collection = self.collection_mut(collection_id)?;
        collection.note_order.push(note.id.clone());
        collection.notes.insert(note.id.clone(), note);
        Ok(())
    }

    pub fn create_note(
        &mut self,
        collection_id: &CollectionId,
        note_id: NoteId,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.insert_note(collection_id, Note::new(note_id, title, now))
    }

    pub fn update_note(
        &mut self,
        collection_id: &CollectionId,
        note_id: &NoteId,
        update: NoteUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let note = self.note_mut(collection_id, note_id)?;
        if let Some(title) = update.title {
            note.title = title;
        }
        if let Some(boxes) = update.boxes {
            note.boxes = boxes;
        }
        if let Some(zoom) = update.zoom {
            note.zoom = zoom;
        }
        if let Some(pan) = update.pan {
            note.pan = pan;
        }
        if let Some(version) = update.version {
            note.observe_version(version);
        }
        note.updated_at = now;
        Ok(())
    }

    pub fn delete_note(&mut self, collection_id: &CollectionId, note_id: &NoteId) -> Result<Note> {
        let collection = self.collection_mut(collection_id)?;
        let removed = collection
            .notes
            .remove(note_id)
            .ok_or_else(|| WorkspaceError::UnknownNote(note_id.clone()))?;
        collection.note_order.retain(|n| n != note_id);
        if self.active.note_id.as_ref() == Some(note_id) {
            self.active.note_id = None;
        }
        Ok(removed)
    }

    pub fn reorder_notes(&mut self, collection_id: &CollectionId, order: Vec<NoteId>) -> Result<()> {
        let collection = self.collection_mut(collection_id)?;
        check_permutation(&collection.note_order, &order)?;
        collection.note_order = order;
        Ok(())
    }

    /// Copy a note as `"<title> (Copy)"` right after the original.
    pub fn duplicate_note(
        &mut self,
        collection_id: &CollectionId,
        note_id: &NoteId,
        new_id: NoteId,
        now: DateTime<Utc>,
    ) -> Result<NoteId> {
        if self.find_note(&new_id).is_some() {
            return Err(WorkspaceError::DuplicateId(new_id.to_string()));
        }
        let collection = self.collection_mut(collection_id)?;
        let source = collection
            .notes
            .get(note_id)
            .ok_or_else(|| WorkspaceError::UnknownNote(note_id.clone()))?;
        let mut copy = Note::new(new_id.clone(), format!("{} (Copy)", source.title), now);
        copy.boxes = source.boxes.clone();

        let position = collection
            .note_order
            .iter()
            .position(|n| n == note_id)
            .map_or(collection.note_order.len(), |i| i + 1);
        collection.note_order.insert(position, new_id.clone());
        collection.notes.insert(new_id.clone(), copy);
        Ok(new_id)
    }

    // ── Active note ───────────────────────────────────────────────────

    pub fn set_active(
        &mut self,
        collection_id: Option<CollectionId>,
        note_id: Option<NoteId>,
    ) -> Result<()> {
        match (&collection_id, &note_id) {
            (Some(c), Some(n)) => {
                self.note(c, n)?;
            }
            (Some(c), None) => {
                self.collection(c)?;
            }
            (None, Some(n)) => return Err(WorkspaceError::UnknownNote(n.clone())),
            (None, None) => {}
        }
        self.active = ActiveNote {
            collection_id,
            note_id,
        };
        Ok(())
    }

    pub fn current_note(&self) -> Option<&Note> {
        let collection = self.active.collection_id.as_ref()?;
        let note = self.active.note_id.as_ref()?;
        self.collections.get(collection)?.notes.get(note)
    }

    pub fn current_note_mut(&mut self) -> Option<&mut Note> {
        let collection = self.active.collection_id.clone()?;
        let note = self.active.note_id.clone()?;
        self.collections.get_mut(&collection)?.notes.get_mut(&note)
    }

    /// Copy the live board into the active note.
    pub fn save_board_to_note(&mut self, board: &Board, now: DateTime<Utc>) -> bool {
        let Some(note) = self.current_note_mut() else {
            return false;
        };
        note.boxes = board.boxes().to_vec();
        note.zoom = board.transform().scale;
        note.pan = board.transform().pan_offset();
        note.updated_at = now;
        true
    }

    /// Merge boxes and version pushed for `note_id` from elsewhere.
    pub fn apply_remote_update(
        &mut self,
        note_id: &NoteId,
        boxes: Vec<NoteBox>,
        version: u64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(note) = self.find_note_mut(note_id) else {
            debug!(note_id = %note_id, "Remote update for unknown note");
            return false;
        };
        note.boxes = boxes;
        note.observe_version(version);
        note.updated_at = now;
        true
    }

    /// Forget the active pointer, as done when loading from storage.
    pub fn clear_active(&mut self) {
        self.active = ActiveNote::default();
    }

    // ── Export / import ───────────────────────────────────────────────

    /// Check the order/membership invariants, note ids unique across
    /// collections and box ids unique within each note.
    pub fn validate(&self) -> Result<()> {
        let mut seen_notes: HashSet<&NoteId> = HashSet::new();
        let keys: Vec<CollectionId> = self.collections.keys().cloned().collect();
        check_permutation(&keys, &self.collection_order)
            .map_err(|e| WorkspaceError::InvalidImport(format!("collectionOrder: {e}")))?;
        for (key, collection) in &self.collections {
            if &collection.id != key {
                return Err(WorkspaceError::InvalidImport(format!(
                    "collection key {key} does not match id {}",
                    collection.id
                )));
            }
            let note_keys: Vec<NoteId> = collection.notes.keys().cloned().collect();
            check_permutation(&note_keys, &collection.note_order).map_err(|e| {
                WorkspaceError::InvalidImport(format!("noteOrder of {key}: {e}"))
            })?;
            for (note_key, note) in &collection.notes {
                if &note.id != note_key {
                    return Err(WorkspaceError::InvalidImport(format!(
                        "note key {note_key} does not match id {}",
                        note.id
                    )));
                }
                if note.version < 1 {
                    return Err(WorkspaceError::InvalidImport(format!(
                        "note {note_key} has version 0"
                    )));
                }
                if !seen_notes.insert(note_key) {
                    return Err(WorkspaceError::InvalidImport(format!(
                        "note {note_key} appears in more than one collection"
                    )));
                }
                let mut seen_boxes = HashSet::new();
                if let Some(dup) = note.boxes.iter().find(|b| !seen_boxes.insert(&b.id)) {
                    return Err(WorkspaceError::InvalidImport(format!(
                        "note {note_key} has duplicate box id {}",
                        dup.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replace the whole workspace with parsed `data`. On error nothing
    /// changes.
    pub fn import_json(&mut self, data: &str) -> Result<()> {
        let imported: Workspace = serde_json::from_str(data)
            .map_err(|e| WorkspaceError::InvalidImport(e.to_string()))?;
        imported.validate()?;
        info!(
            collections = imported.collections.len(),
            "Workspace imported"
        );
        *self = imported;
        Ok(())
    }
}
