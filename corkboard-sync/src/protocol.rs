//! Push-channel messages and the payload adapters shared with the REST API.
//!
//! Inbound data is untrusted: everything is parsed defensively and malformed
//! frames are dropped with a warning.

use corkboard_core::board::NoteBox;
use corkboard_types::{NoteId, Point};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join { note_id: NoteId },

    #[serde(rename = "note:update", rename_all = "camelCase")]
    NoteUpdate {
        note_id: NoteId,
        content: Vec<NoteBox>,
        version: u64,
    },
}

impl ClientMessage {
    pub fn note_id(&self) -> &NoteId {
        match self {
            ClientMessage::Join { note_id } | ClientMessage::NoteUpdate { note_id, .. } => note_id,
        }
    }
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Another writer changed the note. `content` is left raw until the
    /// message is known to target the active note.
    #[serde(rename = "note:updated", rename_all = "camelCase")]
    NoteUpdated {
        note_id: NoteId,
        content: Value,
        version: u64,
    },

    #[serde(rename = "note:ack", rename_all = "camelCase")]
    NoteAck { note_id: NoteId, version: u64 },

    #[serde(rename = "note:conflict", rename_all = "camelCase")]
    NoteConflict {
        note_id: NoteId,
        current_version: u64,
    },

    #[serde(rename = "note:error", rename_all = "camelCase")]
    NoteError { note_id: NoteId, code: String },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    /// Parse a text frame, dropping anything malformed.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(msg) => Some(msg),
            Err(err) => {
                warn!(?err, "Dropping malformed push message");
                None
            }
        }
    }
}

/// Canonicalize note content from the wire. Servers send either a bare box
/// array or `{"boxes": [...]}`.
pub fn decode_boxes(content: Value) -> Result<Vec<NoteBox>, String> {
    let boxes = match content {
        Value::Array(_) => content,
        Value::Object(mut map) => match map.remove("boxes") {
            Some(boxes @ Value::Array(_)) => boxes,
            _ => return Err("content object without a boxes array".to_string()),
        },
        Value::Null => return Ok(Vec::new()),
        other => return Err(format!("unexpected content shape: {other}")),
    };
    serde_json::from_value(boxes).map_err(|e| e.to_string())
}

/// The persisted subset of the active note: what gets hashed and written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotePayload {
    pub boxes: Vec<NoteBox>,
    pub zoom: f64,
    pub pan: Point,
}

impl NotePayload {
    /// Content address of the payload. Serialization is stable because
    /// struct fields serialize in declaration order.
    pub fn hash(&self) -> blake3::Hash {
        // Plain data with string keys; serialization cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_messages_use_wire_tags() {
        let join = ClientMessage::Join {
            note_id: "n1".into(),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({"type": "join", "noteId": "n1"})
        );

        let update = ClientMessage::NoteUpdate {
            note_id: "n1".into(),
            content: vec![],
            version: 3,
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"type": "note:update", "noteId": "n1", "content": [], "version": 3})
        );
    }

    #[test]
    fn inbound_messages_parse() {
        let msg = ServerMessage::parse(r#"{"type":"note:conflict","noteId":"n","currentVersion":5}"#);
        assert_eq!(
            msg,
            Some(ServerMessage::NoteConflict {
                note_id: "n".into(),
                current_version: 5
            })
        );
        assert!(ServerMessage::parse(r#"{"type":"note:ack","noteId":"n"}"#).is_none());
        assert!(ServerMessage::parse("not json").is_none());
        assert!(ServerMessage::parse(r#"{"type":"presence"}"#).is_none());
    }

    #[test]
    fn content_accepts_both_shapes() {
        let bx = json!({
            "id": "box-1", "x": 1.0, "y": 2.0, "width": 300.0, "height": 72.0,
            "zIndex": 1, "content": [{"type": "paragraph", "children": [{"text": "hi"}]}]
        });
        let bare = decode_boxes(json!([bx.clone()])).unwrap();
        let wrapped = decode_boxes(json!({"boxes": [bx]})).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare[0].content.plain_text(), "hi");

        assert!(decode_boxes(json!({"items": []})).is_err());
        assert!(decode_boxes(json!("boxes")).is_err());
        assert!(decode_boxes(json!([{"id": "x"}])).is_err());
        assert_eq!(decode_boxes(Value::Null).unwrap(), vec![]);
    }

    #[test]
    fn payload_hash_tracks_content() {
        let a = NotePayload {
            boxes: vec![],
            zoom: 1.0,
            pan: Point::ORIGIN,
        };
        let mut b = a.clone();
        assert_eq!(a.hash(), b.hash());
        b.pan = Point::new(1.0, 0.0);
        assert_ne!(a.hash(), b.hash());
    }
}
