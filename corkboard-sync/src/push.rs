//! WebSocket push channel.
//!
//! The connection lives in a background task that reconnects with
//! exponential backoff, re-joins the current note on every (re)connect and
//! buffers outbound messages while disconnected.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::{debug, info, warn};

use corkboard_types::NoteId;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::scheduler::Backoff;

/// Outbound messages kept while the channel is down.
pub const PENDING_QUEUE_LIMIT: usize = 256;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Push channel closed")]
    Closed,

    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Bounded FIFO; when full the oldest message is dropped.
#[derive(Debug)]
pub struct PendingQueue {
    items: VecDeque<ClientMessage>,
    limit: usize,
}

impl PendingQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            items: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, msg: ClientMessage) {
        if self.items.len() >= self.limit {
            if let Some(dropped) = self.items.pop_front() {
                warn!(note_id = %dropped.note_id(), "Push queue full, dropping oldest message");
            }
        }
        self.items.push_back(msg);
    }

    fn push_front(&mut self, msg: ClientMessage) {
        self.items.push_front(msg);
        self.items.truncate(self.limit);
    }

    fn pop_front(&mut self) -> Option<ClientMessage> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Join(NoteId),
    Shutdown,
}

/// Cheap handle to the background connection task.
#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PushHandle {
    pub fn send(&self, msg: ClientMessage) -> Result<(), PushError> {
        self.tx
            .send(Command::Send(msg))
            .map_err(|_| PushError::Closed)
    }

    /// Make `note_id` the note announced on every (re)connect.
    pub fn join(&self, note_id: NoteId) -> Result<(), PushError> {
        self.tx
            .send(Command::Join(note_id))
            .map_err(|_| PushError::Closed)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

pub struct PushClient {
    url: String,
    backoff: Backoff,
}

impl PushClient {
    pub fn new(url: impl Into<String>, reconnect_base: Duration, reconnect_max: Duration) -> Self {
        Self {
            url: url.into(),
            backoff: Backoff::new(reconnect_base, reconnect_max),
        }
    }

    /// Start the connection task. Inbound messages arrive on the returned
    /// receiver; the task ends on [`PushHandle::shutdown`] or when every
    /// handle and the receiver are dropped.
    pub fn spawn(
        self,
    ) -> (
        PushHandle,
        mpsc::UnboundedReceiver<ServerMessage>,
        JoinHandle<()>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(cmd_rx, in_tx));
        (PushHandle { tx: cmd_tx }, in_rx, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        inbound: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let mut joined: Option<NoteId> = None;
        let mut pending = PendingQueue::new(PENDING_QUEUE_LIMIT);

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    self.backoff.reset();
                    info!(url = %self.url, "Push channel connected");
                    let (mut write, mut read) = stream.split();

                    if let Some(note_id) = &joined {
                        pending.push_front(ClientMessage::Join {
                            note_id: note_id.clone(),
                        });
                    }
                    let mut healthy = true;
                    while let Some(msg) = pending.pop_front() {
                        if let Err(err) = send_frame(&mut write, &msg).await {
                            warn!(?err, "Failed to flush push queue");
                            pending.push_front(msg);
                            healthy = false;
                            break;
                        }
                    }

                    while healthy {
                        tokio::select! {
                            cmd = commands.recv() => match cmd {
                                None | Some(Command::Shutdown) => {
                                    let _ = write.close().await;
                                    return;
                                }
                                Some(Command::Join(note_id)) => {
                                    joined = Some(note_id.clone());
                                    let msg = ClientMessage::Join { note_id };
                                    if let Err(err) = send_frame(&mut write, &msg).await {
                                        warn!(?err, "Push send failed");
                                        healthy = false;
                                    }
                                }
                                Some(Command::Send(msg)) => {
                                    if let Err(err) = send_frame(&mut write, &msg).await {
                                        warn!(?err, "Push send failed");
                                        pending.push(msg);
                                        healthy = false;
                                    }
                                }
                            },
                            frame = read.next() => match frame {
                                Some(Ok(WsMessage::Text(text))) => {
                                    if let Some(msg) = ServerMessage::parse(&text) {
                                        if inbound.send(msg).is_err() {
                                            return;
                                        }
                                    }
                                }
                                Some(Ok(WsMessage::Close(_))) | None => healthy = false,
                                Some(Ok(_)) => {}
                                Some(Err(err)) => {
                                    warn!(?err, "Push channel read failed");
                                    healthy = false;
                                }
                            },
                        }
                    }
                }
                Err(err) => {
                    warn!(url = %self.url, ?err, "Push channel connect failed");
                }
            }

            let delay = self.backoff.next_delay();
            info!(
                attempt = self.backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting push channel"
            );
            if !wait_collecting(delay, &mut commands, &mut pending, &mut joined).await {
                return;
            }
        }
    }
}

async fn send_frame<S>(sink: &mut S, msg: &ClientMessage) -> Result<(), PushError>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(msg)?;
    sink.send(WsMessage::Text(text)).await?;
    debug!(note_id = %msg.note_id(), "Push frame sent");
    Ok(())
}

/// Sleep for `delay` while still accepting commands. Returns false on
/// shutdown.
async fn wait_collecting(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut PendingQueue,
    joined: &mut Option<NoteId>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                None | Some(Command::Shutdown) => return false,
                Some(Command::Join(note_id)) => *joined = Some(note_id),
                Some(Command::Send(msg)) => pending.push(msg),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(version: u64) -> ClientMessage {
        ClientMessage::NoteUpdate {
            note_id: "n".into(),
            content: vec![],
            version,
        }
    }

    #[test]
    fn queue_drops_oldest_when_full() {
        let mut q = PendingQueue::new(3);
        for v in 1..=5 {
            q.push(update(v));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop_front(), Some(update(3)));
    }

    #[test]
    fn requeued_message_goes_first() {
        let mut q = PendingQueue::new(2);
        q.push(update(1));
        q.push(update(2));
        q.push_front(update(0));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_front(), Some(update(0)));
        assert_eq!(q.pop_front(), Some(update(1)));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn commands_are_buffered_while_disconnected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = PendingQueue::new(8);
        let mut joined = None;
        tx.send(Command::Join("n".into())).unwrap();
        tx.send(Command::Send(update(1))).unwrap();

        let keep_going =
            wait_collecting(Duration::from_millis(20), &mut rx, &mut pending, &mut joined).await;
        assert!(keep_going);
        assert_eq!(joined, Some(NoteId::new("n")));
        assert_eq!(pending.len(), 1);

        tx.send(Command::Shutdown).unwrap();
        assert!(!wait_collecting(Duration::from_secs(5), &mut rx, &mut pending, &mut joined).await);
    }
}
