//! Selection-addressed editing.
//!
//! Points address text blocks (paragraph-like blocks and list items) by their
//! ordinal in document order and characters by offset within the block's
//! concatenated text. That addressing survives run splits, link wrapping and
//! block retyping, so a selection stays valid across every operation here.

use serde::{Deserialize, Serialize};

use super::image::to_data_uri;
use super::link::validate_url;
use super::{
    normalize_inlines, Block, BlockType, Document, DocumentError, Inline, List, ListItem,
    ListKind, MarkKind, Marks, TextBlock, TextBlockKind, TextRun, DEFAULT_FONT_SIZE,
};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TextPoint {
    pub block: usize,
    pub offset: usize,
}

impl TextPoint {
    pub fn new(block: usize, offset: usize) -> Self {
        Self { block, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: TextPoint,
    pub focus: TextPoint,
}

impl Selection {
    pub fn collapsed(point: TextPoint) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn range(anchor: TextPoint, focus: TextPoint) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn start(&self) -> TextPoint {
        self.anchor.min(self.focus)
    }

    pub fn end(&self) -> TextPoint {
        self.anchor.max(self.focus)
    }
}

fn block_len(inlines: &[Inline]) -> usize {
    inlines.iter().map(Inline::char_len).sum()
}

/// Split so a run boundary falls at `offset`; returns the index of the first
/// inline at or after it. Images are never split.
fn split_at(inlines: &mut Vec<Inline>, offset: usize) -> usize {
    let mut pos = 0;
    for i in 0..inlines.len() {
        if offset <= pos {
            return i;
        }
        let len = inlines[i].char_len();
        if offset < pos + len {
            if inlines[i].is_image() {
                return i + 1;
            }
            let run = inlines[i].run_mut();
            let byte = run
                .text
                .char_indices()
                .nth(offset - pos)
                .map_or(run.text.len(), |(b, _)| b);
            let tail = run.text.split_off(byte);
            let mut right = inlines[i].clone();
            right.run_mut().text = tail;
            inlines.insert(i + 1, right);
            return i + 1;
        }
        pos += len;
    }
    inlines.len()
}

/// Index of the link covering `offset`. With `inclusive`, a cursor sitting
/// on either edge of the link counts as inside it.
fn link_index(inlines: &[Inline], offset: usize, inclusive: bool) -> Option<usize> {
    let mut pos = 0;
    for (i, inline) in inlines.iter().enumerate() {
        let len = inline.char_len();
        let inside = if inclusive {
            pos <= offset && offset <= pos + len
        } else {
            pos < offset && offset < pos + len
        };
        if inside && inline.link_url().is_some() {
            return Some(i);
        }
        pos += len;
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Text(TextBlockKind),
    Item { kind: ListKind, group: usize },
}

/// A text block with list membership made explicit, used while retyping.
struct Line {
    kind: LineKind,
    children: Vec<Inline>,
}

fn flatten(blocks: Vec<Block>) -> Vec<Line> {
    let mut lines = Vec::new();
    for (group, block) in blocks.into_iter().enumerate() {
        match block {
            Block::Text(t) => lines.push(Line {
                kind: LineKind::Text(t.kind),
                children: t.children,
            }),
            Block::List(list) => lines.extend(list.items.into_iter().map(|item| Line {
                kind: LineKind::Item {
                    kind: list.kind,
                    group,
                },
                children: item.children,
            })),
        }
    }
    lines
}

fn rebuild(lines: Vec<Line>) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut open_group = None;
    for line in lines {
        match line.kind {
            LineKind::Text(kind) => {
                open_group = None;
                blocks.push(Block::Text(TextBlock {
                    kind,
                    children: line.children,
                }));
            }
            LineKind::Item { kind, group } => {
                let item = ListItem {
                    children: line.children,
                };
                if open_group == Some(group) {
                    if let Some(Block::List(list)) = blocks.last_mut() {
                        list.items.push(item);
                        continue;
                    }
                }
                open_group = Some(group);
                blocks.push(Block::List(List {
                    kind,
                    items: vec![item],
                }));
            }
        }
    }
    blocks
}

/// A document plus the user's selection inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEditor {
    document: Document,
    selection: Option<Selection>,
}

impl DocumentEditor {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            selection: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Set the selection, clamping both points into the document.
    pub fn select(&mut self, selection: Option<Selection>) {
        self.selection = selection.map(|s| Selection {
            anchor: self.clamp(s.anchor),
            focus: self.clamp(s.focus),
        });
    }

    pub fn select_all(&mut self) {
        let last = self.document.text_block_count().saturating_sub(1);
        let end = self.clamp(TextPoint::new(last, usize::MAX));
        self.selection = Some(Selection::range(TextPoint::default(), end));
    }

    fn clamp(&self, point: TextPoint) -> TextPoint {
        let blocks = self.document.text_blocks();
        let Some(last) = blocks.len().checked_sub(1) else {
            return TextPoint::default();
        };
        let block = point.block.min(last);
        TextPoint::new(block, point.offset.min(block_len(blocks[block])))
    }

    /// Apply `f` to every inline inside the selection, splitting runs at the
    /// selection edges first.
    fn map_selected<F: FnMut(&mut Inline)>(&mut self, sel: Selection, mut f: F) {
        let (start, end) = (sel.start(), sel.end());
        for (ordinal, inlines) in self.document.text_blocks_mut().into_iter().enumerate() {
            if ordinal < start.block || ordinal > end.block {
                continue;
            }
            let len = block_len(inlines);
            let s = if ordinal == start.block { start.offset.min(len) } else { 0 };
            let e = if ordinal == end.block { end.offset.min(len) } else { len };
            if s >= e {
                continue;
            }
            let first = split_at(inlines, s);
            let last = split_at(inlines, e);
            inlines[first..last].iter_mut().for_each(&mut f);
            normalize_inlines(inlines);
        }
    }

    /// Inlines with at least one character inside the selection.
    fn selected_inlines(&self, sel: Selection) -> Vec<&Inline> {
        let (start, end) = (sel.start(), sel.end());
        let mut out = Vec::new();
        for (ordinal, inlines) in self.document.text_blocks().into_iter().enumerate() {
            if ordinal < start.block || ordinal > end.block {
                continue;
            }
            let s = if ordinal == start.block { start.offset } else { 0 };
            let e = if ordinal == end.block { end.offset } else { usize::MAX };
            let mut pos = 0;
            for inline in inlines {
                let len = inline.char_len();
                if len > 0 && pos < e && pos + len > s {
                    out.push(inline);
                }
                pos += len;
            }
        }
        out
    }

    /// Formatting of the character before `point` (or the block's first run).
    fn marks_at(&self, point: TextPoint) -> Marks {
        let blocks = self.document.text_blocks();
        let Some(inlines) = blocks.get(point.block) else {
            return Marks::default();
        };
        let mut pos = 0;
        for inline in inlines.iter() {
            let len = inline.char_len();
            if !inline.is_image() && pos < point.offset && point.offset <= pos + len {
                return inline.run().marks.clone();
            }
            pos += len;
        }
        inlines
            .iter()
            .find(|i| !i.is_image())
            .map(|i| i.run().marks.clone())
            .unwrap_or_default()
    }

    /// Marks in effect at the cursor, for toolbar state.
    pub fn active_marks(&self) -> Marks {
        match self.selection {
            Some(sel) if sel.is_collapsed() => self.marks_at(sel.focus),
            Some(sel) => self
                .selected_inlines(sel)
                .into_iter()
                .find(|i| !i.is_image())
                .map(|i| i.run().marks.clone())
                .unwrap_or_default(),
            None => Marks::default(),
        }
    }

    pub fn is_mark_active(&self, kind: MarkKind) -> bool {
        match self.selection {
            None => false,
            Some(sel) if sel.is_collapsed() => self.marks_at(sel.focus).get(kind),
            Some(sel) => {
                let runs: Vec<_> = self
                    .selected_inlines(sel)
                    .into_iter()
                    .filter(|i| !i.is_image())
                    .collect();
                !runs.is_empty() && runs.iter().all(|i| i.run().marks.get(kind))
            }
        }
    }

    /// Flip `kind` across the selection. No-op without a non-empty range.
    pub fn toggle_mark(&mut self, kind: MarkKind) -> bool {
        let Some(sel) = self.selection.filter(|s| !s.is_collapsed()) else {
            return false;
        };
        let on = !self.is_mark_active(kind);
        self.map_selected(sel, |inline| {
            if !inline.is_image() {
                inline.run_mut().marks.set(kind, on);
            }
        });
        true
    }

    pub fn current_font_size(&self) -> u32 {
        self.active_marks().font_size()
    }

    pub fn set_font_size(&mut self, size: u32) -> bool {
        let Some(sel) = self.selection.filter(|s| !s.is_collapsed()) else {
            return false;
        };
        self.map_selected(sel, |inline| {
            if !inline.is_image() {
                inline.run_mut().marks.set_font_size(size);
            }
        });
        true
    }

    /// Whether any selected text block already has `block_type`.
    pub fn is_block_active(&self, block_type: BlockType) -> bool {
        let Some(sel) = self.selection else {
            return false;
        };
        let (start, end) = (sel.start().block, sel.end().block);
        let mut ordinal = 0;
        for block in self.document.blocks() {
            let (count, matches) = match block {
                Block::Text(t) => (1, block_type.text_kind() == Some(t.kind)),
                Block::List(list) => (list.items.len(), block_type.list_kind() == Some(list.kind)),
            };
            let overlaps = ordinal <= end && ordinal + count > start;
            if overlaps && matches {
                return true;
            }
            ordinal += count;
        }
        false
    }

    /// Retype every selected text block, or turn it back into a paragraph
    /// when the type is already active. Lists split around lifted items.
    pub fn toggle_block(&mut self, block_type: BlockType) -> bool {
        let Some(sel) = self.selection else {
            return false;
        };
        let active = self.is_block_active(block_type);
        let (start, end) = (sel.start().block, sel.end().block);

        // Flattened lines use block indices as list groups.
        let fresh_group = self.document.blocks().len();
        let mut lines = flatten(std::mem::take(self.document.blocks_mut()));
        let target = match (active, block_type.list_kind()) {
            (true, _) => LineKind::Text(TextBlockKind::Paragraph),
            (false, Some(kind)) => LineKind::Item {
                kind,
                group: fresh_group,
            },
            (false, None) => {
                LineKind::Text(block_type.text_kind().unwrap_or(TextBlockKind::Paragraph))
            }
        };
        for line in lines.iter_mut().skip(start).take(end + 1 - start) {
            line.kind = target;
        }

        *self.document.blocks_mut() = rebuild(lines);
        self.document.normalize();
        true
    }

    pub fn is_link_active(&self) -> bool {
        match self.selection {
            None => false,
            Some(sel) if sel.is_collapsed() => {
                let point = sel.focus;
                self.document
                    .text_blocks()
                    .get(point.block)
                    .is_some_and(|inlines| link_index(inlines, point.offset, false).is_some())
            }
            Some(sel) => self
                .selected_inlines(sel)
                .iter()
                .any(|i| i.link_url().is_some()),
        }
    }

    /// Insert or wrap a link. Invalid URLs are rejected before anything
    /// changes.
    pub fn insert_link(
        &mut self,
        url: &str,
        display_text: Option<&str>,
    ) -> Result<bool, DocumentError> {
        let url = validate_url(url)?;
        let Some(sel) = self.selection else {
            return Ok(false);
        };
        if self.is_link_active() {
            self.remove_link();
        }

        if sel.is_collapsed() {
            let label = display_text
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map_or_else(|| url.clone(), str::to_string);
            let label_len = label.chars().count();
            let point = self.clamp(sel.focus);
            if let Some(inlines) = self.document.text_blocks_mut().into_iter().nth(point.block) {
                let idx = split_at(inlines, point.offset);
                inlines.insert(
                    idx,
                    Inline::Link {
                        url,
                        text: TextRun::plain(label),
                    },
                );
                normalize_inlines(inlines);
            }
            self.selection = Some(Selection::collapsed(TextPoint::new(
                point.block,
                point.offset + label_len,
            )));
        } else {
            self.map_selected(sel, |inline| {
                if let Inline::Text(run) = inline {
                    let text = std::mem::take(run);
                    *inline = Inline::Link {
                        url: url.clone(),
                        text,
                    };
                }
            });
            self.selection = Some(Selection::collapsed(self.clamp(sel.end())));
        }
        Ok(true)
    }

    /// Unwrap the link under the cursor, or the selected part of any links.
    pub fn remove_link(&mut self) -> bool {
        let Some(sel) = self.selection else {
            return false;
        };
        if !sel.is_collapsed() {
            let mut changed = false;
            self.map_selected(sel, |inline| {
                if let Inline::Link { text, .. } = inline {
                    let run = std::mem::take(text);
                    *inline = Inline::Text(run);
                    changed = true;
                }
            });
            return changed;
        }

        let point = self.clamp(sel.focus);
        let Some(inlines) = self.document.text_blocks_mut().into_iter().nth(point.block) else {
            return false;
        };
        let Some(idx) = link_index(inlines, point.offset, true) else {
            return false;
        };
        let url = inlines[idx].link_url().map(str::to_string);
        let same_link = |i: &Inline| url.is_some() && i.link_url() == url.as_deref();
        let mut first = idx;
        while first > 0 && same_link(&inlines[first - 1]) {
            first -= 1;
        }
        let mut last = idx;
        while last + 1 < inlines.len() && same_link(&inlines[last + 1]) {
            last += 1;
        }
        for inline in &mut inlines[first..=last] {
            let run = std::mem::take(inline.run_mut());
            *inline = Inline::Text(run);
        }
        normalize_inlines(inlines);
        true
    }

    /// Insert an inline image at the cursor.
    pub fn insert_image(&mut self, bytes: &[u8]) -> Result<bool, DocumentError> {
        let url = to_data_uri(bytes)?;
        let Some(sel) = self.selection else {
            return Ok(false);
        };
        let point = self.clamp(sel.end());
        if let Some(inlines) = self.document.text_blocks_mut().into_iter().nth(point.block) {
            let idx = split_at(inlines, point.offset);
            inlines.insert(
                idx,
                Inline::Image {
                    url,
                    text: TextRun::default(),
                },
            );
            normalize_inlines(inlines);
        }
        self.selection = Some(Selection::collapsed(point));
        Ok(true)
    }

    /// Type `text` at the end of the selection, inheriting the formatting of
    /// the run before the cursor.
    pub fn insert_text(&mut self, text: &str) -> bool {
        let Some(sel) = self.selection else {
            return false;
        };
        if text.is_empty() {
            return false;
        }
        let point = self.clamp(sel.end());
        let Some(inlines) = self.document.text_blocks_mut().into_iter().nth(point.block) else {
            return false;
        };
        let idx = split_at(inlines, point.offset);
        let before = idx.checked_sub(1).and_then(|i| inlines.get_mut(i));
        match before {
            Some(Inline::Text(run)) => run.text.push_str(text),
            _ => match inlines.get_mut(idx) {
                Some(Inline::Text(run)) => run.text.insert_str(0, text),
                _ => inlines.insert(idx, Inline::Text(TextRun::plain(text))),
            },
        }
        normalize_inlines(inlines);
        self.selection = Some(Selection::collapsed(TextPoint::new(
            point.block,
            point.offset + text.chars().count(),
        )));
        true
    }
}

impl Default for DocumentEditor {
    fn default() -> Self {
        Self::new(Document::placeholder())
    }
}

/// Font sizes offered by the toolbar, default included.
pub const FONT_SIZES: [u32; 8] = [10, 12, DEFAULT_FONT_SIZE, 16, 18, 24, 32, 48];
