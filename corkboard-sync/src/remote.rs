//! REST client for the remote note store.

use std::time::Duration;

use async_trait::async_trait;
use corkboard_core::board::NoteBox;
use corkboard_core::config::CorkboardConfig;
use corkboard_types::{CollectionId, NoteId, Point};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::protocol::{decode_boxes, NotePayload};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Version conflict (server at {current_version:?})")]
    Conflict { current_version: Option<u64> },

    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Offline")]
    Offline,
}

impl RemoteError {
    /// Worth retrying on the next flush cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Status { status, .. } => *status >= 500 || *status == 429,
            RemoteError::Transport(_) | RemoteError::Offline => true,
            _ => false,
        }
    }

    /// The server could not be reached at all, as opposed to answering with
    /// an error.
    pub fn is_unreachable(&self) -> bool {
        match self {
            RemoteError::Offline => true,
            RemoteError::Transport(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}

/// A note as read back from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNote {
    pub id: NoteId,
    pub title: Option<String>,
    pub boxes: Vec<NoteBox>,
    pub version: u64,
    pub zoom: Option<f64>,
    pub pan: Option<Point>,
}

impl RemoteNote {
    /// Normalize a `GET /notes/:id` body. Missing versions count as 1.
    pub fn from_value(id: &NoteId, value: Value) -> Result<Self, RemoteError> {
        let Value::Object(mut map) = value else {
            return Err(RemoteError::Malformed("note is not an object".into()));
        };
        let boxes = decode_boxes(map.remove("content").unwrap_or(Value::Null))
            .map_err(RemoteError::Malformed)?;
        let version = map
            .get("version")
            .and_then(Value::as_u64)
            .filter(|v| *v > 0)
            .unwrap_or(1);
        let pan = map
            .remove("pan")
            .and_then(|p| serde_json::from_value(p).ok());
        Ok(Self {
            id: map
                .get("id")
                .and_then(Value::as_str)
                .map(NoteId::from)
                .unwrap_or_else(|| id.clone()),
            title: map.get("title").and_then(Value::as_str).map(str::to_string),
            boxes,
            version,
            zoom: map.get("zoom").and_then(Value::as_f64),
            pan,
        })
    }
}

/// Summary rows returned by the list endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCollection {
    pub id: CollectionId,
    #[serde(alias = "name")]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNoteSummary {
    pub id: NoteId,
    pub title: String,
    #[serde(default)]
    pub collection_id: Option<CollectionId>,
    #[serde(default = "first_version")]
    pub version: u64,
}

fn first_version() -> u64 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PutBody<'a> {
    content: &'a [NoteBox],
    version: u64,
    zoom: f64,
    pan: Point,
}

/// The two calls the sync engine needs. Implemented over HTTP by
/// [`RestClient`] and in memory by tests.
#[async_trait]
pub trait NoteApi: Send + Sync {
    async fn get_note(&self, id: &NoteId) -> Result<RemoteNote, RemoteError>;

    /// Write `payload` on top of `version`; returns the new server version.
    async fn put_note(
        &self,
        id: &NoteId,
        payload: &NotePayload,
        version: u64,
    ) -> Result<u64, RemoteError>;
}

/// Unwrap list responses sent as a bare array or `{data: [...]}`.
fn list_items(value: Value) -> Result<Vec<Value>, RemoteError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(RemoteError::Malformed("list without data array".into())),
        },
        _ => Err(RemoteError::Malformed("unexpected list shape".into())),
    }
}

fn parse_list<T: serde::de::DeserializeOwned>(value: Value) -> Result<Vec<T>, RemoteError> {
    let items = list_items(value)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value(item) {
            Ok(parsed) => out.push(parsed),
            Err(err) => warn!(?err, "Skipping malformed list entry"),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder().timeout(timeout).build()?;
        // A trailing slash makes Url::join append instead of replace.
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self { http, base, token })
    }

    pub fn from_config(config: &CorkboardConfig) -> Result<Self, RemoteError> {
        Self::new(
            config.api_base(),
            config.auth_token.clone(),
            config.sync.request_timeout(),
        )
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
        let url = self.base.join(path.trim_start_matches('/'))?;
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, RemoteError> {
        let response = builder.send().await.map_err(|err| {
            if err.is_connect() {
                RemoteError::Offline
            } else {
                RemoteError::Transport(err)
            }
        })?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let current_version = body
                .get("currentVersion")
                .or_else(|| body.get("version"))
                .and_then(Value::as_u64);
            return Err(RemoteError::Conflict { current_version });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RemoteError::Malformed(e.to_string()))
    }

    // ── Collections ───────────────────────────────────────────────────

    pub async fn list_collections(&self) -> Result<Vec<RemoteCollection>, RemoteError> {
        parse_list(self.send(self.request(Method::GET, "collections")?).await?)
    }

    pub async fn create_collection(&self, title: &str) -> Result<RemoteCollection, RemoteError> {
        let body = json!({ "name": title });
        let value = self
            .send(self.request(Method::POST, "collections")?.json(&body))
            .await?;
        serde_json::from_value(value).map_err(|e| RemoteError::Malformed(e.to_string()))
    }

    pub async fn rename_collection(&self, id: &CollectionId, title: &str) -> Result<(), RemoteError> {
        let body = json!({ "name": title });
        self.send(
            self.request(Method::PUT, &format!("collections/{id}"))?
                .json(&body),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_collection(&self, id: &CollectionId) -> Result<(), RemoteError> {
        self.send(self.request(Method::DELETE, &format!("collections/{id}"))?)
            .await?;
        Ok(())
    }

    // ── Notes ─────────────────────────────────────────────────────────

    pub async fn list_notes(
        &self,
        collection_id: &CollectionId,
    ) -> Result<Vec<RemoteNoteSummary>, RemoteError> {
        let builder = self
            .request(Method::GET, "notes")?
            .query(&[("collectionId", collection_id.as_str())]);
        parse_list(self.send(builder).await?)
    }

    pub async fn create_note(
        &self,
        collection_id: &CollectionId,
        title: &str,
    ) -> Result<RemoteNote, RemoteError> {
        let body = json!({ "title": title, "content": [], "collectionId": collection_id });
        let value = self
            .send(self.request(Method::POST, "notes")?.json(&body))
            .await?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map(NoteId::from)
            .ok_or_else(|| RemoteError::Malformed("created note has no id".into()))?;
        RemoteNote::from_value(&id, value)
    }

    pub async fn delete_note(&self, id: &NoteId) -> Result<(), RemoteError> {
        self.send(self.request(Method::DELETE, &format!("notes/{id}"))?)
            .await?;
        Ok(())
    }

    pub async fn duplicate_note(&self, id: &NoteId) -> Result<RemoteNote, RemoteError> {
        let value = self
            .send(
                self.request(Method::POST, &format!("notes/{id}/duplicate"))?
                    .json(&json!({})),
            )
            .await?;
        let new_id = value
            .get("id")
            .and_then(Value::as_str)
            .map(NoteId::from)
            .ok_or_else(|| RemoteError::Malformed("duplicated note has no id".into()))?;
        RemoteNote::from_value(&new_id, value)
    }
}

#[async_trait]
impl NoteApi for RestClient {
    async fn get_note(&self, id: &NoteId) -> Result<RemoteNote, RemoteError> {
        debug!(note_id = %id, "GET note");
        let value = self
            .send(self.request(Method::GET, &format!("notes/{id}"))?)
            .await?;
        RemoteNote::from_value(id, value)
    }

    async fn put_note(
        &self,
        id: &NoteId,
        payload: &NotePayload,
        version: u64,
    ) -> Result<u64, RemoteError> {
        debug!(note_id = %id, version, "PUT note");
        let body = PutBody {
            content: &payload.boxes,
            version,
            zoom: payload.zoom,
            pan: payload.pan,
        };
        let value = self
            .send(self.request(Method::PUT, &format!("notes/{id}"))?.json(&body))
            .await?;
        // Servers that omit the version are assumed to have bumped it.
        Ok(value
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(version + 1))
    }
}
