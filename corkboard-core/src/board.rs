//! Boxes on the canvas of the active note.
//!
//! The [`Board`] owns the live box list, the selected and editing box ids and
//! the camera. Every mutation runs to completion; callers decide when to
//! checkpoint history and when to schedule a flush.

use corkboard_types::{BoxId, Point};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::CanvasTransform;
use crate::clock::StampClock;
use crate::document::Document;

pub const DEFAULT_BOX_WIDTH: f64 = 300.0;
/// Content area plus header.
pub const DEFAULT_BOX_HEIGHT: f64 = 72.0;
pub const BOX_HEADER_HEIGHT: f64 = 32.0;
pub const MIN_BOX_WIDTH: f64 = 200.0;
pub const MIN_BOX_HEIGHT: f64 = 100.0;
pub const AUTO_GROW_MIN_HEIGHT: f64 = 120.0;
pub const DUPLICATE_OFFSET: f64 = 20.0;

/// A positioned rich-text box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteBox {
    pub id: BoxId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z_index: i64,
    #[serde(default)]
    pub content: Document,
}

impl NoteBox {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// First non-empty line of the box text.
    pub fn title(&self) -> String {
        self.content
            .block_texts()
            .iter()
            .flat_map(|t| t.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The box holds real content and the caller has not confirmed.
    NeedsConfirmation,
    NotFound,
}

/// Ids cleared by [`Board::replace_boxes`] because their box disappeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidated {
    pub selected: Option<BoxId>,
    pub editing: Option<BoxId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    boxes: Vec<NoteBox>,
    selected: Option<BoxId>,
    editing: Option<BoxId>,
    transform: CanvasTransform,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(boxes: Vec<NoteBox>, transform: CanvasTransform) -> Self {
        Self {
            boxes,
            selected: None,
            editing: None,
            transform,
        }
    }

    pub fn boxes(&self) -> &[NoteBox] {
        &self.boxes
    }

    /// Boxes in paint order, lowest zIndex first.
    pub fn boxes_by_z(&self) -> Vec<&NoteBox> {
        let mut sorted: Vec<_> = self.boxes.iter().collect();
        sorted.sort_by_key(|b| b.z_index);
        sorted
    }

    pub fn get(&self, id: &BoxId) -> Option<&NoteBox> {
        self.boxes.iter().find(|b| &b.id == id)
    }

    fn get_mut(&mut self, id: &BoxId) -> Option<&mut NoteBox> {
        self.boxes.iter_mut().find(|b| &b.id == id)
    }

    pub fn contains(&self, id: &BoxId) -> bool {
        self.get(id).is_some()
    }

    pub fn selected(&self) -> Option<&BoxId> {
        self.selected.as_ref()
    }

    pub fn editing(&self) -> Option<&BoxId> {
        self.editing.as_ref()
    }

    pub fn transform(&self) -> &CanvasTransform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut CanvasTransform {
        &mut self.transform
    }

    pub fn set_transform(&mut self, transform: CanvasTransform) {
        self.transform = transform;
    }

    pub fn max_z(&self) -> Option<i64> {
        self.boxes.iter().map(|b| b.z_index).max()
    }

    pub fn min_z(&self) -> Option<i64> {
        self.boxes.iter().map(|b| b.z_index).min()
    }

    /// Create a placeholder box at a canvas point and select it.
    pub fn add_box(&mut self, at: Point, clock: &mut StampClock) -> BoxId {
        self.add_box_with_content(at, Document::placeholder(), clock)
    }

    pub fn add_box_with_content(
        &mut self,
        at: Point,
        content: Document,
        clock: &mut StampClock,
    ) -> BoxId {
        let mut stamp = clock.next_stamp();
        let mut id = BoxId::new(format!("box-{stamp}"));
        while self.contains(&id) {
            stamp = clock.next_stamp();
            id = BoxId::new(format!("box-{stamp}"));
        }
        let z_index = self.max_z().map_or(stamp, |max| stamp.max(max + 1));
        self.boxes.push(NoteBox {
            id: id.clone(),
            x: at.x,
            y: at.y,
            width: DEFAULT_BOX_WIDTH,
            height: DEFAULT_BOX_HEIGHT,
            z_index,
            content,
        });
        self.selected = Some(id.clone());
        debug!(box_id = %id, z_index, "Box created");
        id
    }

    pub fn move_box(&mut self, id: &BoxId, at: Point) -> bool {
        let Some(b) = self.get_mut(id) else {
            return false;
        };
        b.x = at.x;
        b.y = at.y;
        true
    }

    /// Manual resize, floored at the minimum box size.
    pub fn resize_box(&mut self, id: &BoxId, width: f64, height: f64) -> bool {
        let Some(b) = self.get_mut(id) else {
            return false;
        };
        b.width = width.max(MIN_BOX_WIDTH);
        b.height = height.max(MIN_BOX_HEIGHT);
        true
    }

    /// Fit the box height to its measured content height. Returns whether the
    /// height changed.
    pub fn auto_grow(&mut self, id: &BoxId, content_height: f64) -> bool {
        let Some(b) = self.get_mut(id) else {
            return false;
        };
        let height = (content_height + BOX_HEADER_HEIGHT).max(AUTO_GROW_MIN_HEIGHT);
        if (b.height - height).abs() < f64::EPSILON {
            return false;
        }
        b.height = height;
        b.width = b.width.max(MIN_BOX_WIDTH);
        true
    }

    pub fn set_content(&mut self, id: &BoxId, content: Document) -> bool {
        match self.get_mut(id) {
            Some(b) if b.content != content => {
                b.content = content;
                true
            }
            _ => false,
        }
    }

    pub fn delete_box(&mut self, id: &BoxId, confirmed: bool) -> DeleteOutcome {
        let Some(b) = self.get(id) else {
            return DeleteOutcome::NotFound;
        };
        if !confirmed && b.content.has_meaningful_content() {
            return DeleteOutcome::NeedsConfirmation;
        }
        self.boxes.retain(|b| &b.id != id);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        if self.editing.as_ref() == Some(id) {
            self.editing = None;
        }
        debug!(box_id = %id, "Box deleted");
        DeleteOutcome::Deleted
    }

    /// Deep copy offset down-right, on top of everything, and selected.
    pub fn duplicate_box(&mut self, id: &BoxId, clock: &mut StampClock) -> Option<BoxId> {
        let source = self.get(id)?.clone();
        let new_id = self.add_box_with_content(
            Point::new(source.x + DUPLICATE_OFFSET, source.y + DUPLICATE_OFFSET),
            source.content,
            clock,
        );
        if let Some(copy) = self.get_mut(&new_id) {
            copy.width = source.width;
            copy.height = source.height;
        }
        Some(new_id)
    }

    pub fn bring_to_front(&mut self, id: &BoxId) -> bool {
        let Some(max) = self.max_z() else {
            return false;
        };
        match self.get_mut(id) {
            Some(b) => {
                b.z_index = max + 1;
                true
            }
            None => false,
        }
    }

    pub fn send_to_back(&mut self, id: &BoxId) -> bool {
        let Some(min) = self.min_z() else {
            return false;
        };
        match self.get_mut(id) {
            Some(b) => {
                b.z_index = min - 1;
                true
            }
            None => false,
        }
    }

    /// Select a box (or clear with `None`). Unknown ids are ignored.
    pub fn select(&mut self, id: Option<BoxId>) -> bool {
        match id {
            Some(id) if !self.contains(&id) => false,
            id => {
                self.selected = id;
                true
            }
        }
    }

    pub fn set_editing(&mut self, id: Option<BoxId>) -> bool {
        match id {
            Some(id) if !self.contains(&id) => false,
            id => {
                self.editing = id;
                true
            }
        }
    }

    /// Swap in a box list received from elsewhere (remote update, undo),
    /// clearing selection and editing ids that no longer exist.
    pub fn replace_boxes(&mut self, boxes: Vec<NoteBox>) -> Invalidated {
        self.boxes = boxes;
        let mut cleared = Invalidated::default();
        if let Some(id) = self.selected.take() {
            if self.contains(&id) {
                self.selected = Some(id);
            } else {
                cleared.selected = Some(id);
            }
        }
        if let Some(id) = self.editing.take() {
            if self.contains(&id) {
                self.editing = Some(id);
            } else {
                cleared.editing = Some(id);
            }
        }
        cleared
    }

    /// Restore selection without validation; used by history restore where
    /// the snapshot is self-consistent.
    pub(crate) fn restore(
        &mut self,
        boxes: Vec<NoteBox>,
        selected: Option<BoxId>,
        transform: CanvasTransform,
    ) {
        self.boxes = boxes;
        self.selected = selected.filter(|id| self.boxes.iter().any(|b| &b.id == id));
        if let Some(id) = &self.editing {
            if !self.boxes.iter().any(|b| &b.id == id) {
                self.editing = None;
            }
        }
        self.transform = transform;
    }

    pub fn insert_paragraph(&mut self, id: &BoxId, text: &str) -> bool {
        let Some(b) = self.get_mut(id) else {
            return false;
        };
        if b.content.has_meaningful_content() {
            b.content.append_paragraph(text);
        } else {
            b.content = Document::from_plain_text(text);
        }
        true
    }

    pub fn replace_content(&mut self, id: &BoxId, text: &str) -> bool {
        let Some(b) = self.get_mut(id) else {
            return false;
        };
        b.content = Document::from_plain_text(text);
        true
    }

    pub fn append_text(&mut self, id: &BoxId, text: &str) -> bool {
        let Some(b) = self.get_mut(id) else {
            return false;
        };
        if b.content.has_meaningful_content() {
            b.content.append_text(text);
        } else {
            b.content = Document::from_plain_text(text);
        }
        true
    }
}
