//! Sync engine for the active note.
//!
//! The engine performs no I/O. Callers feed it events (local edits, timer
//! ticks, push messages, REST completions, connectivity changes) together
//! with the current `Instant`, and it answers with [`Effect`]s to execute.
//!
//! # Write path
//!
//! ```text
//! local change ──► debounce (1s) ─┐
//! periodic (15s) ─────────────────┴─► flush ──► hash == last saved? ──► skip
//!                                              │
//!                                              ▼
//!                                  push note:update + arm ack fallback (500ms)
//!                                              │ no ack
//!                                              ▼
//!                                       PUT /notes/:id
//!                                              │ 409 / note:conflict
//!                                              ▼
//!                                 GET, adopt version, retry once
//! ```
//!
//! Only one write per note is in flight at a time. A flush requested while
//! a write is pending is deferred until that write resolves.

use std::time::{Duration, Instant};

use corkboard_core::board::NoteBox;
use corkboard_core::config::CorkboardConfig;
use corkboard_types::NoteId;
use tracing::{debug, info, warn};

use crate::protocol::{decode_boxes, ClientMessage, NotePayload, ServerMessage};
use crate::remote::{RemoteError, RemoteNote};
use crate::scheduler::{earliest, Debounce, Ticker, Timeout};

/// Unresolved conflicts in a row before the user is told.
pub const CONFLICT_NOTICE_THRESHOLD: u32 = 2;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub debounce: Duration,
    pub autosave_interval: Duration,
    pub ack_fallback: Duration,
    pub refresh_fallback: Duration,
    /// Without a push channel every write goes straight to REST.
    pub push_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&CorkboardConfig::default())
    }
}

impl EngineConfig {
    pub fn from_config(config: &CorkboardConfig) -> Self {
        Self {
            debounce: config.sync.debounce(),
            autosave_interval: config.sync.autosave_interval(),
            ack_fallback: config.sync.ack_fallback(),
            refresh_fallback: config.sync.refresh_fallback(),
            push_enabled: config.ws_enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// Adopt the server version, then retry the write with this ticket id.
    ConflictRetry { ticket: u64 },
    /// No confirmation arrived in time.
    Refresh,
}

/// Status worth surfacing to the user or the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Saved { note_id: NoteId, version: u64 },
    Confirmed { note_id: NoteId, version: u64 },
    ConflictUnresolved { note_id: NoteId },
    ServerError { note_id: NoteId, code: String },
    FlushFailed { note_id: NoteId, transient: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Push(ClientMessage),
    Put {
        ticket: u64,
        note_id: NoteId,
        payload: NotePayload,
        version: u64,
    },
    Fetch {
        note_id: NoteId,
        reason: FetchReason,
    },
    /// Write the active board to the local cache.
    PersistLocal,
    /// Replace the board's boxes with remote content.
    ApplyRemote {
        note_id: NoteId,
        boxes: Vec<NoteBox>,
        version: u64,
    },
    /// Raise the stored version of a note, active or not.
    RecordVersion { note_id: NoteId, version: u64 },
    Notice(Notice),
}

/// A dispatched write awaiting resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteTicket {
    pub id: u64,
    pub note_id: NoteId,
    pub base_version: u64,
    pub hash: blake3::Hash,
    pub payload: NotePayload,
    pub retried: bool,
    refetching: bool,
    rest_sent: bool,
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: EngineConfig,
    note: Option<NoteId>,
    version: u64,
    pending_version: Option<u64>,
    online: bool,
    local_dirty: bool,
    flush_deferred: bool,
    last_saved: Option<blake3::Hash>,
    in_flight: Option<WriteTicket>,
    next_ticket: u64,
    unresolved_conflicts: u32,
    debounce: Debounce,
    autosave: Ticker,
    ack_fallback: Timeout,
    refresh_fallback: Timeout,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, now: Instant) -> Self {
        Self {
            debounce: Debounce::new(config.debounce),
            autosave: Ticker::new(config.autosave_interval, now),
            config,
            note: None,
            version: 1,
            pending_version: None,
            online: true,
            local_dirty: false,
            flush_deferred: false,
            last_saved: None,
            in_flight: None,
            next_ticket: 1,
            unresolved_conflicts: 0,
            ack_fallback: Timeout::default(),
            refresh_fallback: Timeout::default(),
        }
    }

    pub fn active_note(&self) -> Option<&NoteId> {
        self.note.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pending_version(&self) -> Option<u64> {
        self.pending_version
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.pending_version.is_some()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn in_flight(&self) -> Option<&WriteTicket> {
        self.in_flight.as_ref()
    }

    pub fn unresolved_conflicts(&self) -> u32 {
        self.unresolved_conflicts
    }

    /// When the caller should next call [`tick`](Self::tick).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.note.as_ref()?;
        earliest([
            self.debounce.deadline(),
            Some(self.autosave.deadline()),
            self.ack_fallback.deadline(),
            self.refresh_fallback.deadline(),
        ])
    }

    fn is_active(&self, note_id: &NoteId) -> bool {
        self.note.as_ref() == Some(note_id)
    }

    // ── Activation ────────────────────────────────────────────────────

    /// Track `note_id` as the active note, dropping every timer and ticket
    /// tied to the previous one. `payload` is the note as loaded, which
    /// counts as saved.
    pub fn activate(
        &mut self,
        note_id: NoteId,
        version: u64,
        payload: &NotePayload,
        now: Instant,
    ) -> Vec<Effect> {
        self.deactivate();
        info!(note_id = %note_id, version, "Sync activated");
        self.version = version.max(1);
        self.last_saved = Some(payload.hash());
        self.autosave.reset(now);
        let mut effects = Vec::new();
        if self.config.push_enabled {
            effects.push(Effect::Push(ClientMessage::Join {
                note_id: note_id.clone(),
            }));
        }
        self.note = Some(note_id);
        effects
    }

    pub fn deactivate(&mut self) {
        if let Some(ticket) = self.in_flight.take() {
            debug!(note_id = %ticket.note_id, ticket = ticket.id, "Abandoning in-flight write");
        }
        self.note = None;
        self.pending_version = None;
        self.local_dirty = false;
        self.flush_deferred = false;
        self.last_saved = None;
        self.unresolved_conflicts = 0;
        self.debounce.cancel();
        self.ack_fallback.disarm();
        self.refresh_fallback.disarm();
    }

    // ── Local input ───────────────────────────────────────────────────

    pub fn local_change(&mut self, now: Instant) {
        if self.note.is_none() {
            return;
        }
        self.local_dirty = true;
        self.debounce.poke(now);
    }

    /// The board now matches `hash` on the server (after applying remote
    /// content).
    pub fn mark_synced(&mut self, hash: blake3::Hash) {
        self.last_saved = Some(hash);
    }

    pub fn set_online(&mut self, online: bool, now: Instant) {
        if self.online == online {
            return;
        }
        self.online = online;
        info!(online, "Connectivity changed");
        if online && self.note.is_some() {
            // Whatever was in flight when the link dropped is presumed lost.
            if let Some(ticket) = self.in_flight.take() {
                debug!(ticket = ticket.id, "Dropping write issued before going offline");
                self.ack_fallback.disarm();
            }
            self.debounce.poke(now);
        }
    }

    /// Advance timers. `payload` is only evaluated when a flush is due.
    pub fn tick(&mut self, now: Instant, payload: impl FnOnce() -> NotePayload) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(note_id) = self.note.clone() else {
            return effects;
        };

        if self.ack_fallback.fire(now) && self.online {
            if let Some(ticket) = self.in_flight.as_mut().filter(|t| !t.rest_sent) {
                debug!(note_id = %note_id, ticket = ticket.id, "No push ack, falling back to REST");
                ticket.rest_sent = true;
                effects.push(Effect::Put {
                    ticket: ticket.id,
                    note_id: note_id.clone(),
                    payload: ticket.payload.clone(),
                    version: ticket.base_version,
                });
            }
        }

        if self.refresh_fallback.fire(now) && self.pending_version.is_some() && self.online {
            debug!(note_id = %note_id, "No confirmation, refreshing note");
            effects.push(Effect::Fetch {
                note_id: note_id.clone(),
                reason: FetchReason::Refresh,
            });
        }

        let debounced = self.debounce.fire(now);
        let periodic = self.autosave.fire(now);
        if debounced || periodic {
            self.flush(note_id, now, payload(), &mut effects);
        }
        effects
    }

    fn flush(
        &mut self,
        note_id: NoteId,
        now: Instant,
        payload: NotePayload,
        effects: &mut Vec<Effect>,
    ) {
        if std::mem::take(&mut self.local_dirty) {
            effects.push(Effect::PersistLocal);
        }
        if !self.online {
            debug!(note_id = %note_id, "Offline, skipping flush");
            return;
        }
        let hash = payload.hash();
        if self.last_saved == Some(hash) {
            return;
        }
        if let Some(ticket) = &self.in_flight {
            if ticket.hash != hash {
                debug!(note_id = %note_id, ticket = ticket.id, "Write in flight, deferring flush");
                self.flush_deferred = true;
            }
            return;
        }
        let ticket = WriteTicket {
            id: self.next_ticket,
            note_id,
            base_version: self.version,
            hash,
            payload,
            retried: false,
            refetching: false,
            rest_sent: false,
        };
        self.next_ticket += 1;
        self.dispatch(ticket, now, effects);
    }

    fn dispatch(&mut self, mut ticket: WriteTicket, now: Instant, effects: &mut Vec<Effect>) {
        let version = ticket.base_version;
        debug!(
            note_id = %ticket.note_id,
            ticket = ticket.id,
            version,
            retried = ticket.retried,
            "Dispatching write"
        );
        if self.config.push_enabled {
            effects.push(Effect::Push(ClientMessage::NoteUpdate {
                note_id: ticket.note_id.clone(),
                content: ticket.payload.boxes.clone(),
                version,
            }));
            self.ack_fallback.arm(now, self.config.ack_fallback);
        } else {
            ticket.rest_sent = true;
            effects.push(Effect::Put {
                ticket: ticket.id,
                note_id: ticket.note_id.clone(),
                payload: ticket.payload.clone(),
                version,
            });
        }
        let expected = version + 1;
        self.pending_version = Some(self.pending_version.map_or(expected, |p| p.max(expected)));
        self.refresh_fallback.arm(now, self.config.refresh_fallback);
        self.in_flight = Some(ticket);
    }

    // ── Resolution ────────────────────────────────────────────────────

    /// Raise the known version of `note_id`. Never lowers it.
    fn observe_version(&mut self, note_id: &NoteId, version: u64, effects: &mut Vec<Effect>) {
        if !self.is_active(note_id) {
            effects.push(Effect::RecordVersion {
                note_id: note_id.clone(),
                version,
            });
            return;
        }
        if version > self.version {
            self.version = version;
            effects.push(Effect::RecordVersion {
                note_id: note_id.clone(),
                version,
            });
        }
        if self.pending_version.is_some_and(|p| version >= p) {
            self.pending_version = None;
            self.refresh_fallback.disarm();
            effects.push(Effect::Notice(Notice::Confirmed {
                note_id: note_id.clone(),
                version,
            }));
        }
    }

    fn resolve(&mut self, version: u64, now: Instant, effects: &mut Vec<Effect>) {
        let Some(ticket) = self.in_flight.take() else {
            return;
        };
        debug!(note_id = %ticket.note_id, ticket = ticket.id, version, "Write saved");
        self.last_saved = Some(ticket.hash);
        self.unresolved_conflicts = 0;
        self.ack_fallback.disarm();
        effects.push(Effect::Notice(Notice::Saved {
            note_id: ticket.note_id,
            version,
        }));
        self.after_ticket(now);
    }

    /// Drop the in-flight write; its content stays unsaved for the next
    /// cycle.
    fn abandon(&mut self, now: Instant) -> Option<WriteTicket> {
        let ticket = self.in_flight.take()?;
        self.ack_fallback.disarm();
        self.after_ticket(now);
        Some(ticket)
    }

    fn after_ticket(&mut self, now: Instant) {
        if std::mem::take(&mut self.flush_deferred) {
            self.debounce.poke(now);
        }
    }

    fn conflict(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        let Some(ticket) = self.in_flight.as_mut() else {
            return;
        };
        if ticket.refetching {
            return;
        }
        if ticket.retried {
            let note_id = ticket.note_id.clone();
            self.abandon(now);
            self.unresolved_conflicts += 1;
            warn!(
                note_id = %note_id,
                unresolved = self.unresolved_conflicts,
                "Write conflicted again after retry"
            );
            if self.unresolved_conflicts >= CONFLICT_NOTICE_THRESHOLD {
                effects.push(Effect::Notice(Notice::ConflictUnresolved { note_id }));
            }
            return;
        }
        info!(note_id = %ticket.note_id, ticket = ticket.id, "Version conflict, refetching");
        ticket.refetching = true;
        self.ack_fallback.disarm();
        effects.push(Effect::Fetch {
            note_id: ticket.note_id.clone(),
            reason: FetchReason::ConflictRetry { ticket: ticket.id },
        });
    }

    fn is_current_ticket(&self, id: u64) -> bool {
        self.in_flight.as_ref().is_some_and(|t| t.id == id)
    }

    // ── Inbound ───────────────────────────────────────────────────────

    pub fn push_message(&mut self, msg: ServerMessage, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        match msg {
            ServerMessage::NoteAck { note_id, version } => {
                self.observe_version(&note_id, version, &mut effects);
                if self.is_active(&note_id)
                    && self
                        .in_flight
                        .as_ref()
                        .is_some_and(|t| version > t.base_version)
                {
                    self.resolve(version, now, &mut effects);
                }
            }
            ServerMessage::NoteConflict {
                note_id,
                current_version,
            } => {
                if !self.is_active(&note_id) {
                    self.observe_version(&note_id, current_version, &mut effects);
                } else if self
                    .in_flight
                    .as_ref()
                    .is_some_and(|t| current_version > t.base_version)
                {
                    self.conflict(now, &mut effects);
                } else {
                    debug!(note_id = %note_id, current_version, "Conflict for a settled write");
                }
            }
            ServerMessage::NoteUpdated {
                note_id,
                content,
                version,
            } => {
                if !self.is_active(&note_id) {
                    debug!(note_id = %note_id, "Update for inactive note ignored");
                } else if version <= self.version {
                    debug!(note_id = %note_id, version, known = self.version, "Stale update ignored");
                } else {
                    match decode_boxes(content) {
                        Ok(boxes) => {
                            self.observe_version(&note_id, version, &mut effects);
                            effects.push(Effect::ApplyRemote {
                                note_id,
                                boxes,
                                version,
                            });
                        }
                        Err(err) => {
                            warn!(note_id = %note_id, %err, "Dropping malformed note update");
                        }
                    }
                }
            }
            ServerMessage::NoteError { note_id, code } => {
                warn!(note_id = %note_id, %code, "Server rejected note update");
                if self.is_active(&note_id) {
                    self.abandon(now);
                }
                effects.push(Effect::Notice(Notice::ServerError { note_id, code }));
            }
            ServerMessage::Error { message } => {
                warn!(%message, "Push channel error");
            }
        }
        effects
    }

    pub fn put_result(
        &mut self,
        note_id: &NoteId,
        ticket: u64,
        result: Result<u64, RemoteError>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let current = self.is_active(note_id) && self.is_current_ticket(ticket);
        match result {
            Ok(version) => {
                self.observe_version(note_id, version, &mut effects);
                if current {
                    self.resolve(version, now, &mut effects);
                }
            }
            Err(RemoteError::Conflict { .. }) if current => self.conflict(now, &mut effects),
            Err(RemoteError::Conflict { current_version }) => {
                debug!(note_id = %note_id, ticket, ?current_version, "Conflict for a settled write");
            }
            Err(err) => {
                let transient = err.is_transient();
                warn!(note_id = %note_id, ticket, ?err, transient, "Note write failed");
                if current {
                    self.abandon(now);
                    effects.push(Effect::Notice(Notice::FlushFailed {
                        note_id: note_id.clone(),
                        transient,
                    }));
                }
            }
        }
        effects
    }

    pub fn fetch_result(
        &mut self,
        note_id: &NoteId,
        reason: FetchReason,
        result: Result<RemoteNote, RemoteError>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let remote = match result {
            Ok(remote) => remote,
            Err(err) => {
                warn!(note_id = %note_id, ?reason, ?err, "Note fetch failed");
                if let FetchReason::ConflictRetry { ticket } = reason {
                    if self.is_active(note_id) && self.is_current_ticket(ticket) {
                        self.abandon(now);
                    }
                }
                return effects;
            }
        };

        if !self.is_active(note_id) {
            self.observe_version(note_id, remote.version, &mut effects);
            return effects;
        }

        match reason {
            FetchReason::ConflictRetry { ticket } if self.is_current_ticket(ticket) => {
                self.observe_version(note_id, remote.version, &mut effects);
                if let Some(mut retry) = self.in_flight.take() {
                    retry.base_version = self.version;
                    retry.retried = true;
                    retry.refetching = false;
                    retry.rest_sent = false;
                    info!(note_id = %note_id, version = self.version, "Retrying write on adopted version");
                    self.dispatch(retry, now, &mut effects);
                }
            }
            FetchReason::ConflictRetry { .. } => {
                self.observe_version(note_id, remote.version, &mut effects);
            }
            FetchReason::Refresh => {
                let newer = remote.version > self.version;
                self.observe_version(note_id, remote.version, &mut effects);
                if let Some(ticket) = &self.in_flight {
                    let landed = NotePayload {
                        boxes: remote.boxes,
                        zoom: remote.zoom.unwrap_or(ticket.payload.zoom),
                        pan: remote.pan.unwrap_or(ticket.payload.pan),
                    };
                    let visible = landed.hash() == ticket.hash;
                    if visible {
                        self.resolve(remote.version, now, &mut effects);
                    } else {
                        // Never overwrite unsaved local edits; resend on top
                        // of the adopted version instead.
                        debug!(note_id = %note_id, "Write not visible on server, resending");
                        self.abandon(now);
                        self.debounce.poke(now);
                    }
                } else if newer {
                    effects.push(Effect::ApplyRemote {
                        note_id: note_id.clone(),
                        boxes: remote.boxes,
                        version: remote.version,
                    });
                }
                self.pending_version = None;
            }
        }
        effects
    }
}
