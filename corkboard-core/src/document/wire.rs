//! Editor JSON node tree.
//!
//! Elements look like `{"type": "paragraph", "children": [...]}` (links and
//! images add `"url"`); leaves look like `{"text": "...", "bold": true}`.
//! Parsing into [`Document`] is fallible so malformed content never reaches
//! the board.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Block, Document, Inline, List, ListItem, ListKind, Marks, TextBlock, TextBlockKind, TextRun,
    DEFAULT_FONT_SIZE,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Unknown node type: {0}")]
    UnknownType(String),

    #[error("Node has neither a type nor text")]
    EmptyNode,

    #[error("Element '{0}' is missing children")]
    MissingChildren(String),

    #[error("Element '{0}' is missing a url")]
    MissingUrl(String),

    #[error("List contains a non list-item child: {0}")]
    InvalidListChild(String),

    #[error("Block element '{0}' nested inside inline content")]
    NestedBlock(String),
}

/// One node of the editor tree, element or leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<WireNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(flatten)]
    pub marks: Marks,
}

impl WireNode {
    fn element(kind: &str, children: Vec<WireNode>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            children: Some(children),
            ..Default::default()
        }
    }

    fn leaf(run: TextRun) -> Self {
        Self {
            text: Some(run.text),
            marks: run.marks,
            ..Default::default()
        }
    }
}

fn text_kind_name(kind: TextBlockKind) -> &'static str {
    match kind {
        TextBlockKind::Paragraph => "paragraph",
        TextBlockKind::HeadingOne => "heading-one",
        TextBlockKind::HeadingTwo => "heading-two",
        TextBlockKind::BlockQuote => "block-quote",
        TextBlockKind::CodeBlock => "code-block",
    }
}

fn parse_text_kind(name: &str) -> Option<TextBlockKind> {
    match name {
        "paragraph" => Some(TextBlockKind::Paragraph),
        "heading-one" => Some(TextBlockKind::HeadingOne),
        "heading-two" => Some(TextBlockKind::HeadingTwo),
        "block-quote" => Some(TextBlockKind::BlockQuote),
        "code-block" => Some(TextBlockKind::CodeBlock),
        _ => None,
    }
}

fn list_kind_name(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Bulleted => "bulleted-list",
        ListKind::Numbered => "numbered-list",
    }
}

fn parse_list_kind(name: &str) -> Option<ListKind> {
    match name {
        "bulleted-list" => Some(ListKind::Bulleted),
        "numbered-list" => Some(ListKind::Numbered),
        _ => None,
    }
}

fn leaf_run(node: WireNode) -> TextRun {
    let mut marks = node.marks;
    if marks.font_size == Some(DEFAULT_FONT_SIZE) || marks.font_size == Some(0) {
        marks.font_size = None;
    }
    TextRun {
        text: node.text.unwrap_or_default(),
        marks,
    }
}

fn children_of(node: &mut WireNode, name: &str) -> Result<Vec<WireNode>, WireError> {
    node.children
        .take()
        .ok_or_else(|| WireError::MissingChildren(name.to_string()))
}

/// Parse inline content. Multi-run links are split into one link per run.
fn parse_inlines(nodes: Vec<WireNode>) -> Result<Vec<Inline>, WireError> {
    let mut out = Vec::with_capacity(nodes.len());
    for mut node in nodes {
        let Some(kind) = node.kind.clone() else {
            if node.text.is_none() {
                return Err(WireError::EmptyNode);
            }
            out.push(Inline::Text(leaf_run(node)));
            continue;
        };
        match kind.as_str() {
            "link" | "image" => {
                let url = node
                    .url
                    .take()
                    .ok_or_else(|| WireError::MissingUrl(kind.clone()))?;
                let runs: Vec<TextRun> = node
                    .children
                    .take()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|child| child.kind.is_none())
                    .map(leaf_run)
                    .collect();
                if kind == "image" {
                    let text = runs.into_iter().next().unwrap_or_default();
                    out.push(Inline::Image { url, text });
                } else if runs.is_empty() {
                    out.push(Inline::Link {
                        url,
                        text: TextRun::default(),
                    });
                } else {
                    out.extend(runs.into_iter().map(|text| Inline::Link {
                        url: url.clone(),
                        text,
                    }));
                }
            }
            other if parse_text_kind(other).is_some() || parse_list_kind(other).is_some() => {
                return Err(WireError::NestedBlock(other.to_string()));
            }
            "list-item" => return Err(WireError::NestedBlock(kind)),
            other => return Err(WireError::UnknownType(other.to_string())),
        }
    }
    Ok(out)
}

fn parse_list_item(mut node: WireNode) -> Result<ListItem, WireError> {
    match node.kind.as_deref() {
        Some("list-item") => Ok(ListItem {
            children: parse_inlines(children_of(&mut node, "list-item")?)?,
        }),
        other => Err(WireError::InvalidListChild(
            other.unwrap_or("text").to_string(),
        )),
    }
}

fn parse_block(mut node: WireNode) -> Result<Block, WireError> {
    let Some(kind) = node.kind.clone() else {
        return Err(WireError::EmptyNode);
    };
    if let Some(text_kind) = parse_text_kind(&kind) {
        return Ok(Block::Text(TextBlock {
            kind: text_kind,
            children: parse_inlines(children_of(&mut node, &kind)?)?,
        }));
    }
    if let Some(list_kind) = parse_list_kind(&kind) {
        let items = children_of(&mut node, &kind)?
            .into_iter()
            .map(parse_list_item)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Block::List(List {
            kind: list_kind,
            items,
        }));
    }
    match kind.as_str() {
        // A lone list item keeps its content as a single-item bulleted list.
        "list-item" => Ok(Block::List(List {
            kind: ListKind::Bulleted,
            items: vec![parse_list_item(node)?],
        })),
        "link" | "image" => Ok(Block::Text(TextBlock {
            kind: TextBlockKind::Paragraph,
            children: parse_inlines(vec![node])?,
        })),
        other => Err(WireError::UnknownType(other.to_string())),
    }
}

fn inline_node(inline: Inline) -> WireNode {
    match inline {
        Inline::Text(run) => WireNode::leaf(run),
        Inline::Link { url, text } => WireNode {
            url: Some(url),
            ..WireNode::element("link", vec![WireNode::leaf(text)])
        },
        Inline::Image { url, text } => WireNode {
            url: Some(url),
            ..WireNode::element("image", vec![WireNode::leaf(text)])
        },
    }
}

fn inline_nodes(inlines: Vec<Inline>) -> Vec<WireNode> {
    inlines.into_iter().map(inline_node).collect()
}

impl TryFrom<Vec<WireNode>> for Document {
    type Error = WireError;

    fn try_from(nodes: Vec<WireNode>) -> Result<Self, Self::Error> {
        let blocks = nodes
            .into_iter()
            .map(parse_block)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Document::from_blocks(blocks))
    }
}

impl From<Document> for Vec<WireNode> {
    fn from(doc: Document) -> Self {
        doc.blocks
            .into_iter()
            .map(|block| match block {
                Block::Text(t) => WireNode::element(text_kind_name(t.kind), inline_nodes(t.children)),
                Block::List(list) => WireNode::element(
                    list_kind_name(list.kind),
                    list.items
                        .into_iter()
                        .map(|item| WireNode::element("list-item", inline_nodes(item.children)))
                        .collect(),
                ),
            })
            .collect()
    }
}

/// Parse a document from an arbitrary JSON value, dropping malformed input.
pub fn document_from_value(value: serde_json::Value) -> Option<Document> {
    match serde_json::from_value::<Document>(value) {
        Ok(doc) => Some(doc),
        Err(err) => {
            tracing::warn!(?err, "Dropping malformed document content");
            None
        }
    }
}
