//! Rich-text content of a single note box.
//!
//! A [`Document`] is a sequence of [`Block`]s. Text blocks and list items own
//! a run of [`Inline`]s; links and images carry exactly one [`TextRun`]. The
//! editor wire format (the JSON node tree the remote store persists) lives in
//! [`wire`]; selection-based editing lives in [`editor`].

pub mod editor;
pub mod image;
pub mod link;
pub mod wire;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use editor::{DocumentEditor, Selection, TextPoint};
pub use wire::{WireError, WireNode};

/// Text shown in a freshly created box.
pub const PLACEHOLDER_TEXT: &str = "Start typing...";

/// Font size that means "inherit"; setting it clears the mark.
pub const DEFAULT_FONT_SIZE: u32 = 14;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Please enter a valid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported image format")]
    UnsupportedImage,

    #[error("Empty image data")]
    EmptyImage,
}

/// Boolean marks toggled by the toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Formatting carried by a text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marks {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
}

impl Marks {
    pub fn get(&self, kind: MarkKind) -> bool {
        match kind {
            MarkKind::Bold => self.bold,
            MarkKind::Italic => self.italic,
            MarkKind::Underline => self.underline,
            MarkKind::Strikethrough => self.strikethrough,
            MarkKind::Code => self.code,
        }
    }

    pub fn set(&mut self, kind: MarkKind, on: bool) {
        match kind {
            MarkKind::Bold => self.bold = on,
            MarkKind::Italic => self.italic = on,
            MarkKind::Underline => self.underline = on,
            MarkKind::Strikethrough => self.strikethrough = on,
            MarkKind::Code => self.code = on,
        }
    }

    /// Store a font size, treating the default (or zero) as unset.
    pub fn set_font_size(&mut self, size: u32) {
        self.font_size = if size == 0 || size == DEFAULT_FONT_SIZE {
            None
        } else {
            Some(size)
        };
    }

    pub fn font_size(&self) -> u32 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }
}

/// A string with uniform formatting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub marks: Marks,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(TextRun),
    Link { url: String, text: TextRun },
    Image { url: String, text: TextRun },
}

impl Inline {
    pub fn run(&self) -> &TextRun {
        match self {
            Inline::Text(run) => run,
            Inline::Link { text, .. } | Inline::Image { text, .. } => text,
        }
    }

    pub fn run_mut(&mut self) -> &mut TextRun {
        match self {
            Inline::Text(run) => run,
            Inline::Link { text, .. } | Inline::Image { text, .. } => text,
        }
    }

    pub fn char_len(&self) -> usize {
        self.run().char_len()
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Inline::Image { .. })
    }

    pub fn link_url(&self) -> Option<&str> {
        match self {
            Inline::Link { url, .. } => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextBlockKind {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    BlockQuote,
    CodeBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub kind: TextBlockKind,
    pub children: Vec<Inline>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Bulleted,
    Numbered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub children: Vec<Inline>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List {
    pub kind: ListKind,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(TextBlock),
    List(List),
}

/// Block formats offered by the toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    BlockQuote,
    CodeBlock,
    BulletedList,
    NumberedList,
}

impl BlockType {
    pub fn list_kind(self) -> Option<ListKind> {
        match self {
            BlockType::BulletedList => Some(ListKind::Bulleted),
            BlockType::NumberedList => Some(ListKind::Numbered),
            _ => None,
        }
    }

    pub fn text_kind(self) -> Option<TextBlockKind> {
        match self {
            BlockType::Paragraph => Some(TextBlockKind::Paragraph),
            BlockType::HeadingOne => Some(TextBlockKind::HeadingOne),
            BlockType::HeadingTwo => Some(TextBlockKind::HeadingTwo),
            BlockType::BlockQuote => Some(TextBlockKind::BlockQuote),
            BlockType::CodeBlock => Some(TextBlockKind::CodeBlock),
            BlockType::BulletedList | BlockType::NumberedList => None,
        }
    }
}

/// Rich-text content of one box. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<WireNode>", into = "Vec<WireNode>")]
pub struct Document {
    blocks: Vec<Block>,
}

impl Default for Document {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl Document {
    /// Build a document from blocks, substituting the placeholder for an
    /// empty sequence.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut doc = Self { blocks };
        doc.normalize();
        doc
    }

    /// The content of a freshly created box.
    pub fn placeholder() -> Self {
        Self::paragraph(PLACEHOLDER_TEXT)
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![paragraph_block(text.into())],
        }
    }

    /// One paragraph per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        let blocks = text.lines().map(|l| paragraph_block(l.to_string())).collect();
        Self::from_blocks(blocks)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of addressable text blocks (text blocks and list items).
    pub fn text_block_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| match b {
                Block::Text(_) => 1,
                Block::List(list) => list.items.len(),
            })
            .sum()
    }

    /// Inline children of every text block and list item, in order.
    pub fn text_blocks(&self) -> Vec<&[Inline]> {
        let mut out = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Text(t) => out.push(t.children.as_slice()),
                Block::List(list) => {
                    out.extend(list.items.iter().map(|i| i.children.as_slice()))
                }
            }
        }
        out
    }

    pub(crate) fn text_blocks_mut(&mut self) -> Vec<&mut Vec<Inline>> {
        let mut out = Vec::new();
        for block in &mut self.blocks {
            match block {
                Block::Text(t) => out.push(&mut t.children),
                Block::List(list) => out.extend(list.items.iter_mut().map(|i| &mut i.children)),
            }
        }
        out
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    /// Text of each text block, one entry per block.
    pub fn block_texts(&self) -> Vec<String> {
        self.text_blocks()
            .into_iter()
            .map(|inlines| inlines.iter().map(|i| i.run().text.as_str()).collect())
            .collect()
    }

    /// Depth-first concatenation of every run, trimmed.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for inlines in self.text_blocks() {
            for inline in inlines {
                out.push_str(&inline.run().text);
            }
        }
        out.trim().to_string()
    }

    /// True when the box holds text other than the untouched placeholder.
    pub fn has_meaningful_content(&self) -> bool {
        let text = self.plain_text();
        !text.is_empty() && text != PLACEHOLDER_TEXT
    }

    /// Append `text` as a new paragraph after the last block.
    pub fn append_paragraph(&mut self, text: &str) {
        self.blocks.push(paragraph_block(text.to_string()));
    }

    /// Append `text` to the last run of the last text block, newline-joined.
    pub fn append_text(&mut self, text: &str) {
        if self.text_block_count() == 0 {
            self.append_paragraph(text);
            return;
        }
        let mut slots = self.text_blocks_mut();
        let Some(last) = slots.pop() else {
            return;
        };
        match last.iter_mut().rev().find(|i| !i.is_image()) {
            Some(inline) => {
                let run = inline.run_mut();
                if run.text.is_empty() {
                    run.text.push_str(text);
                } else {
                    run.text.push('\n');
                    run.text.push_str(text);
                }
            }
            None => last.push(Inline::Text(TextRun::plain(text))),
        }
    }

    /// Restore structural invariants after a mutation.
    pub(crate) fn normalize(&mut self) {
        self.blocks.retain(|b| match b {
            Block::Text(_) => true,
            Block::List(list) => !list.items.is_empty(),
        });
        if self.blocks.is_empty() {
            self.blocks.push(paragraph_block(PLACEHOLDER_TEXT.to_string()));
        }
        for inlines in self.text_blocks_mut() {
            normalize_inlines(inlines);
        }
    }
}

/// Plain text projection used for placeholder detection and assistant context.
pub fn extract_plain_text(document: &Document) -> String {
    document.plain_text()
}

fn paragraph_block(text: String) -> Block {
    Block::Text(TextBlock {
        kind: TextBlockKind::Paragraph,
        children: vec![Inline::Text(TextRun::plain(text))],
    })
}

/// Drop empty runs, merge neighbours with identical formatting, and keep at
/// least one run per block.
pub(crate) fn normalize_inlines(inlines: &mut Vec<Inline>) {
    let mut out: Vec<Inline> = Vec::with_capacity(inlines.len());
    for inline in inlines.drain(..) {
        let empty = inline.run().text.is_empty();
        match inline {
            Inline::Text(_) | Inline::Link { .. } if empty => continue,
            Inline::Text(run) => match out.last_mut() {
                Some(Inline::Text(prev)) if prev.marks == run.marks => {
                    prev.text.push_str(&run.text)
                }
                _ => out.push(Inline::Text(run)),
            },
            Inline::Link { url, text } => match out.last_mut() {
                Some(Inline::Link {
                    url: prev_url,
                    text: prev,
                }) if *prev_url == url && prev.marks == text.marks => {
                    prev.text.push_str(&text.text)
                }
                _ => out.push(Inline::Link { url, text }),
            },
            image @ Inline::Image { .. } => out.push(image),
        }
    }
    if out.iter().all(|i| i.is_image()) {
        out.push(Inline::Text(TextRun::default()));
    }
    *inlines = out;
}
