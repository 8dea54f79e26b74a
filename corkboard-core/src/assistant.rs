//! Chat state for the note assistant.
//!
//! Natural-language interpretation lives with the remote model; this module
//! keeps per-note chat history, tracks service health, and classifies
//! failures into fixed user-facing messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use corkboard_types::NoteId;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::board::Board;
use crate::storage::{self, LocalStore, StorageKey};

/// Preamble sent before the first message of a conversation.
pub const SYSTEM_PREAMBLE: &str = "Context: You are an AI assistant helping with note-taking. \
You can read note content, suggest edits, and when asked to make changes, you can format \
responses with commands like \"update title to 'New Title'\" or \"replace content with \
'New Content'\" (when a box is selected).";

const GENERIC_FAILURE: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiStatus {
    Available,
    Error,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Quota,
    Authentication,
    RateLimit,
    Network,
    Other,
}

impl FailureKind {
    pub fn title(&self) -> &'static str {
        match self {
            FailureKind::Quota => "Quota Exceeded",
            FailureKind::Authentication => "Authentication Failed",
            FailureKind::RateLimit => "Rate Limit Exceeded",
            FailureKind::Network => "Connection Error",
            FailureKind::Other => "AI Error",
        }
    }
}

/// A classified generation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Map a status code, service error code and message to a failure kind and
/// the message shown to the user.
pub fn classify_failure(status: Option<u16>, code: Option<&str>, message: &str) -> AiFailure {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    let kind = if code == Some("QUOTA_EXCEEDED") || status == Some(429) || has("429") || has("quota")
    {
        FailureKind::Quota
    } else if code == Some("AUTHENTICATION_FAILED")
        || status == Some(401)
        || has("401")
        || has("unauthorized")
    {
        FailureKind::Authentication
    } else if code == Some("RATE_LIMIT_EXCEEDED") || has("rate limit") {
        FailureKind::RateLimit
    } else if code == Some("NETWORK_ERROR") || has("network") || has("fetch") {
        FailureKind::Network
    } else {
        FailureKind::Other
    };

    let message = match kind {
        FailureKind::Quota => "AI service is temporarily unavailable due to usage limits. \
Please try again later or check your OpenAI account."
            .to_string(),
        FailureKind::Authentication => {
            "AI service authentication failed. Please check the API configuration.".to_string()
        }
        FailureKind::RateLimit => {
            "AI service rate limit exceeded. Please try again in a few moments.".to_string()
        }
        FailureKind::Network => {
            "Unable to connect to AI service. Please check your internet connection.".to_string()
        }
        FailureKind::Other => strip_service_prefix(message),
    };
    AiFailure { kind, message }
}

fn strip_service_prefix(message: &str) -> String {
    const PREFIX: &str = "ai service error: ";
    let trimmed = message.trim();
    let stripped = match trimmed.get(..PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(PREFIX) => &trimmed[PREFIX.len()..],
        _ => trimmed,
    };
    if stripped.is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        stripped.to_string()
    }
}

fn default_true() -> bool {
    true
}

/// Per-note chat histories plus assistant preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantState {
    #[serde(default)]
    pub chat_histories: BTreeMap<NoteId, Vec<ChatMessage>>,

    #[serde(default = "default_true")]
    pub include_context: bool,

    #[serde(default)]
    pub ai_status: AiStatus,

    #[serde(skip)]
    pub current_input: String,

    #[serde(skip)]
    pub is_generating: bool,
}

impl Default for AssistantState {
    fn default() -> Self {
        Self {
            chat_histories: BTreeMap::new(),
            include_context: true,
            ai_status: AiStatus::Unknown,
            current_input: String::new(),
            is_generating: false,
        }
    }
}

impl AssistantState {
    pub fn load(store: &dyn LocalStore) -> Self {
        storage::load(store, StorageKey::Ai).unwrap_or_default()
    }

    pub fn save(&self, store: &dyn LocalStore) -> bool {
        storage::save(store, StorageKey::Ai, self)
    }

    pub fn history(&self, note_id: &NoteId) -> &[ChatMessage] {
        self.chat_histories
            .get(note_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn add_message(
        &mut self,
        note_id: &NoteId,
        role: Role,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> &ChatMessage {
        let messages = self.chat_histories.entry(note_id.clone()).or_default();
        messages.push(ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: now,
        });
        &messages[messages.len() - 1]
    }

    pub fn clear_history(&mut self, note_id: &NoteId) {
        self.chat_histories.remove(note_id);
    }

    /// Record the user's message and mark generation in progress. Returns
    /// the messages to send, or `None` if the input is empty or a
    /// generation is already running.
    pub fn begin_generation(
        &mut self,
        note_id: &NoteId,
        input: &str,
        now: DateTime<Utc>,
    ) -> Option<Vec<ChatMessage>> {
        let input = input.trim();
        if input.is_empty() || self.is_generating {
            return None;
        }
        let first = self.history(note_id).is_empty();
        self.add_message(note_id, Role::User, input, now);
        self.current_input.clear();
        self.is_generating = true;

        let mut request = Vec::new();
        if first {
            request.push(ChatMessage {
                id: "system".to_string(),
                role: Role::User,
                content: SYSTEM_PREAMBLE.to_string(),
                timestamp: DateTime::<Utc>::default(),
            });
        }
        request.extend(self.history(note_id).iter().cloned());
        Some(request)
    }

    /// Record the outcome of a generation.
    pub fn finish_generation(
        &mut self,
        note_id: &NoteId,
        outcome: Result<String, AiFailure>,
        now: DateTime<Utc>,
    ) {
        self.is_generating = false;
        match outcome {
            Ok(reply) => {
                self.ai_status = AiStatus::Available;
                self.add_message(note_id, Role::Assistant, reply, now);
            }
            Err(failure) => {
                warn!(note_id = %note_id, kind = ?failure.kind, "Assistant generation failed");
                self.ai_status = AiStatus::Error;
                self.add_message(
                    note_id,
                    Role::Assistant,
                    format!("Error: {}", failure.message),
                    now,
                );
            }
        }
    }
}

/// Plain-text context for a request: the note title plus every box, or only
/// the selected box when there is one.
pub fn build_context(note_title: &str, board: &Board) -> String {
    let selected = board.selected().and_then(|id| board.get(id));
    let mut out = format!("Note: {note_title}\n");
    match selected {
        Some(b) => {
            out.push_str("Selected box:\n");
            out.push_str(&b.content.block_texts().join("\n"));
            out.push('\n');
        }
        None => {
            for b in board.boxes_by_z() {
                out.push_str(&format!("[{}] ", b.id));
                out.push_str(&b.content.block_texts().join("\n"));
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::StampClock;
    use crate::storage::MemoryStore;
    use corkboard_types::Point;

    #[test]
    fn classifies_known_failures() {
        assert_eq!(
            classify_failure(Some(429), None, "too many").kind,
            FailureKind::Quota
        );
        assert_eq!(
            classify_failure(None, Some("AUTHENTICATION_FAILED"), "").kind,
            FailureKind::Authentication
        );
        assert_eq!(
            classify_failure(None, None, "Rate limit hit").kind,
            FailureKind::RateLimit
        );
        assert_eq!(
            classify_failure(None, None, "Failed to fetch").kind,
            FailureKind::Network
        );
        let other = classify_failure(Some(500), None, "AI service error: model overloaded");
        assert_eq!(other.kind, FailureKind::Other);
        assert_eq!(other.message, "model overloaded");
        assert_eq!(classify_failure(None, None, "").message, GENERIC_FAILURE);
    }

    #[test]
    fn generation_flow_tracks_status() {
        let note = NoteId::new("n1");
        let mut state = AssistantState::default();
        let now = Utc::now();

        let request = state.begin_generation(&note, "  summarize  ", now).unwrap();
        assert_eq!(request.len(), 2);
        assert_eq!(request[0].content, SYSTEM_PREAMBLE);
        assert_eq!(request[1].content, "summarize");
        assert!(state.begin_generation(&note, "again", now).is_none());

        state.finish_generation(&note, Ok("done".into()), now);
        assert_eq!(state.ai_status, AiStatus::Available);

        let request = state.begin_generation(&note, "more", now).unwrap();
        assert_eq!(request.len(), 3);
        let failure = classify_failure(Some(401), None, "");
        state.finish_generation(&note, Err(failure), now);
        assert_eq!(state.ai_status, AiStatus::Error);
        assert!(state.history(&note).last().unwrap().content.starts_with("Error: "));
    }

    #[test]
    fn persistence_skips_transient_fields() {
        let store = MemoryStore::new();
        let mut state = AssistantState::default();
        state.current_input = "draft".into();
        state.is_generating = true;
        state.include_context = false;
        assert!(state.save(&store));

        let raw = store.read(StorageKey::Ai).unwrap().unwrap();
        assert!(!raw.contains("currentInput"));
        let loaded = AssistantState::load(&store);
        assert!(!loaded.include_context);
        assert!(!loaded.is_generating);
        assert!(loaded.current_input.is_empty());
    }

    #[test]
    fn context_prefers_selected_box() {
        let mut board = Board::new();
        let mut clock = StampClock::manual(1);
        let a = board.add_box(Point::ORIGIN, &mut clock);
        let b = board.add_box(Point::ORIGIN, &mut clock);
        board.replace_content(&a, "alpha");
        board.replace_content(&b, "beta");

        board.select(None);
        let all = build_context("Plan", &board);
        assert!(all.contains("alpha") && all.contains("beta"));

        board.select(Some(a));
        let only = build_context("Plan", &board);
        assert!(only.contains("alpha") && !only.contains("beta"));
    }
}
