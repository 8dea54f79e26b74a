//! Tokio loop that runs a [`CanvasSession`] against real transports.
//!
//! The session is shared behind a mutex so a UI (or CLI) can keep issuing
//! edits while the driver sleeps. The lock is never held across an await.
//!
//! Connectivity is inferred from traffic: a request that cannot reach the
//! server takes the session offline, and a probe with exponential backoff
//! (or any push frame) brings it back.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use corkboard_types::NoteId;

use crate::engine::{Effect, FetchReason, Notice};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::push::PushHandle;
use crate::remote::{NoteApi, RemoteError, RemoteNote};
use crate::scheduler::{earliest, Backoff};
use crate::session::CanvasSession;

/// Sleep used when no timer is armed.
const IDLE_WAIT: Duration = Duration::from_secs(60);

const DEFAULT_PROBE_BASE: Duration = Duration::from_secs(1);
const DEFAULT_PROBE_MAX: Duration = Duration::from_secs(15);

#[derive(Debug)]
enum Completion {
    Put {
        note_id: NoteId,
        ticket: u64,
        result: Result<u64, RemoteError>,
    },
    Fetch {
        note_id: NoteId,
        reason: FetchReason,
        result: Result<RemoteNote, RemoteError>,
    },
    Probe {
        result: Result<RemoteNote, RemoteError>,
    },
}

pub struct SyncDriver {
    session: Arc<Mutex<CanvasSession>>,
    api: Arc<dyn NoteApi>,
    push: Option<PushHandle>,
    wake: Arc<Notify>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: Option<mpsc::UnboundedReceiver<Completion>>,
    probe_backoff: Backoff,
    probe_at: Option<Instant>,
}

impl SyncDriver {
    pub fn new(
        session: Arc<Mutex<CanvasSession>>,
        api: Arc<dyn NoteApi>,
        push: Option<PushHandle>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            session,
            api,
            push,
            wake: Arc::new(Notify::new()),
            completions_tx,
            completions_rx: Some(completions_rx),
            probe_backoff: Backoff::new(DEFAULT_PROBE_BASE, DEFAULT_PROBE_MAX),
            probe_at: None,
        }
    }

    /// Backoff between reachability probes while offline.
    pub fn with_probe_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.probe_backoff = Backoff::new(base, max);
        self
    }

    pub fn session(&self) -> Arc<Mutex<CanvasSession>> {
        Arc::clone(&self.session)
    }

    /// Notify after editing the session so the loop picks up new timers.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Carry out effects the session could not absorb. Network calls run as
    /// tasks whose results come back through the completion channel.
    pub fn execute(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Push(msg) => self.push(msg),
                Effect::Put {
                    ticket,
                    note_id,
                    payload,
                    version,
                } => {
                    let api = Arc::clone(&self.api);
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let result = api.put_note(&note_id, &payload, version).await;
                        let _ = tx.send(Completion::Put {
                            note_id,
                            ticket,
                            result,
                        });
                    });
                }
                Effect::Fetch { note_id, reason } => {
                    let api = Arc::clone(&self.api);
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let result = api.get_note(&note_id).await;
                        let _ = tx.send(Completion::Fetch {
                            note_id,
                            reason,
                            result,
                        });
                    });
                }
                Effect::Notice(notice) => log_notice(&notice),
                other => debug!(?other, "Unexpected local effect reached the driver"),
            }
        }
    }

    fn push(&self, msg: ClientMessage) {
        let Some(push) = &self.push else {
            debug!(note_id = %msg.note_id(), "No push channel, message dropped");
            return;
        };
        let sent = match msg {
            ClientMessage::Join { note_id } => push.join(note_id),
            msg => push.send(msg),
        };
        if let Err(err) = sent {
            warn!(%err, "Push channel unavailable");
        }
    }

    /// Drive timers, push messages and network completions until
    /// `shutdown` resolves, then write the board back locally.
    pub async fn run(
        mut self,
        mut inbound: Option<mpsc::UnboundedReceiver<ServerMessage>>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let Some(mut completions) = self.completions_rx.take() else {
            bail!("sync driver is already running");
        };
        tokio::pin!(shutdown);
        info!("Sync driver started");

        loop {
            let deadline = earliest([self.session.lock().next_deadline(), self.probe_at]);
            let wake = deadline.unwrap_or_else(|| Instant::now() + IDLE_WAIT);
            let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(wake));

            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.wake.notified() => {}
                _ = sleep => {
                    let now = Instant::now();
                    if self.probe_at.is_some_and(|at| at <= now) {
                        self.probe_at = None;
                        self.probe(now);
                    }
                    let effects = self.session.lock().tick(now);
                    self.execute(effects);
                }
                Some(msg) = next_inbound(&mut inbound) => {
                    let now = Instant::now();
                    self.link_up(now);
                    let effects = self.session.lock().handle_push(msg, now);
                    self.execute(effects);
                }
                Some(done) = completions.recv() => {
                    let now = Instant::now();
                    let effects = match done {
                        Completion::Put { note_id, ticket, result } => {
                            self.observe_link(result.as_ref().err(), now);
                            self.session.lock().handle_put(&note_id, ticket, result, now)
                        }
                        Completion::Fetch { note_id, reason, result } => {
                            self.observe_link(result.as_ref().err(), now);
                            self.session.lock().handle_fetch(&note_id, reason, result, now)
                        }
                        Completion::Probe { result } => {
                            self.observe_link(result.as_ref().err(), now);
                            Vec::new()
                        }
                    };
                    self.execute(effects);
                }
            }
        }

        self.session.lock().close_note();
        if let Some(push) = &self.push {
            push.shutdown();
        }
        info!("Sync driver stopped");
        Ok(())
    }
}

impl SyncDriver {
    /// Update connectivity from the outcome of a request.
    fn observe_link(&mut self, err: Option<&RemoteError>, now: Instant) {
        match err {
            Some(err) if err.is_unreachable() => self.link_down(now),
            _ => self.link_up(now),
        }
    }

    fn link_down(&mut self, now: Instant) {
        {
            let mut session = self.session.lock();
            if session.engine().is_online() {
                warn!("Server unreachable, going offline");
                session.set_online(false, now);
            }
        }
        let delay = self.probe_backoff.next_delay();
        debug!(?delay, attempt = self.probe_backoff.attempts(), "Scheduling reachability probe");
        self.probe_at = Some(now + delay);
    }

    fn link_up(&mut self, now: Instant) {
        self.probe_backoff.reset();
        self.probe_at = None;
        let mut session = self.session.lock();
        if !session.engine().is_online() {
            info!("Server reachable again");
            session.set_online(true, now);
        }
    }

    /// Ask the server for the active note just to see if it answers.
    fn probe(&mut self, now: Instant) {
        let active = self.session.lock().engine().active_note().cloned();
        let Some(note_id) = active else {
            // No note to probe.
            self.link_up(now);
            return;
        };
        let api = Arc::clone(&self.api);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.get_note(&note_id).await;
            let _ = tx.send(Completion::Probe { result });
        });
    }
}

async fn next_inbound(
    inbound: &mut Option<mpsc::UnboundedReceiver<ServerMessage>>,
) -> Option<ServerMessage> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_notice(notice: &Notice) {
    match notice {
        Notice::Saved { note_id, version } => info!(note_id = %note_id, version, "Saved"),
        Notice::Confirmed { note_id, version } => {
            debug!(note_id = %note_id, version, "Server confirmed version")
        }
        Notice::ConflictUnresolved { note_id } => {
            warn!(note_id = %note_id, "Changes keep conflicting with other writers")
        }
        Notice::ServerError { note_id, code } => {
            warn!(note_id = %note_id, %code, "Server rejected changes")
        }
        Notice::FlushFailed { note_id, transient } => {
            warn!(note_id = %note_id, transient, "Could not save changes")
        }
    }
}
