use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use muster_types::api::{MarkReadResponse, SendMessageRequest};
use muster_types::models::{MediaRef, Message, TypingType};

use crate::error::{SyncError, TransportError};
use crate::reconcile::{Reconciler, RemoteSnapshot};
use crate::transport::ChatTransport;
use crate::view::{ChatView, PendingMessage, PendingStatus, PollState};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_WINDOW: u32 = 200;

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Messages fetched per tick.
    pub window: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            window: 50,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, SyncError>>;

enum Command {
    Send {
        text: Option<String>,
        media: Option<MediaRef>,
        reply: Reply<Message>,
    },
    Retry {
        local_id: Uuid,
        reply: Reply<Message>,
    },
    MarkRead {
        reply: Reply<MarkReadResponse>,
    },
}

/// Completions of work the loop spawned.
enum Event {
    Fetched {
        ticket: u64,
        result: Result<RemoteSnapshot, TransportError>,
    },
    Sent {
        local_id: Uuid,
        result: Result<Message, TransportError>,
        reply: Reply<Message>,
    },
    MarkedRead {
        result: Result<MarkReadResponse, TransportError>,
        reply: Reply<MarkReadResponse>,
    },
}

/// Keeps one open chat in sync with the server.
///
/// A background task polls the newest window, the unread count, typing and
/// pins, and owns the cached `ChatView`. Everyone else reads snapshots from a
/// `watch` channel and asks the task to change things through commands.
/// Dropping the poller closes it.
pub struct SyncPoller<T: ChatTransport> {
    chat_id: Uuid,
    transport: Arc<T>,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ChatView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: ChatTransport> SyncPoller<T> {
    /// Start syncing `chat_id` as user `me`. Fetches immediately, then every
    /// `poll_interval`. Must be called inside a tokio runtime.
    pub fn open(transport: Arc<T>, chat_id: Uuid, me: Uuid, config: SyncConfig) -> Self {
        let config = SyncConfig {
            poll_interval: config.poll_interval.max(MIN_POLL_INTERVAL),
            window: config.window.clamp(1, MAX_WINDOW),
        };

        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(32);
        let (publisher, view) = watch::channel(ChatView::new(chat_id));
        let cancel = CancellationToken::new();

        let poll_loop = PollLoop {
            chat_id,
            transport: Arc::clone(&transport),
            config,
            view: ChatView::new(chat_id),
            reconciler: Reconciler::new(me),
            publisher,
            commands: commands_rx,
            events_tx,
            events_rx,
            cancel: cancel.clone(),
            fetch_in_flight: false,
            next_ticket: 0,
            unread_from_ticket: 0,
            mark_reads_in_flight: 0,
        };
        let task = tokio::spawn(poll_loop.run());

        Self {
            chat_id,
            transport,
            commands: commands_tx,
            view,
            cancel,
            task: Some(task),
        }
    }

    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    /// Latest published snapshot.
    pub fn view(&self) -> ChatView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.view.clone()
    }

    /// Send a message. It shows up in `pending` right away; on failure it
    /// stays there marked `Failed` and the error is returned.
    pub async fn send(
        &self,
        text: Option<String>,
        media: Option<MediaRef>,
    ) -> Result<Message, SyncError> {
        self.request(|reply| Command::Send { text, media, reply }).await
    }

    /// Resend a message that previously failed.
    pub async fn retry(&self, local_id: Uuid) -> Result<Message, SyncError> {
        self.request(|reply| Command::Retry { local_id, reply }).await
    }

    /// Mark everything up to the server's tail as read. The local badge drops
    /// to zero before the server answers.
    pub async fn mark_read(&self) -> Result<MarkReadResponse, SyncError> {
        self.request(|reply| Command::MarkRead { reply }).await
    }

    pub async fn set_typing(&self, typing_type: TypingType) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.transport
            .set_typing(self.chat_id, typing_type)
            .await
            .map_err(SyncError::Request)
    }

    /// Pin a message. The pinned list catches up on the next tick.
    pub async fn pin(&self, message_id: i64) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.transport
            .pin_message(self.chat_id, message_id)
            .await
            .map_err(SyncError::Request)
    }

    pub async fn unpin(&self, message_id: i64) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.transport
            .unpin_message(self.chat_id, message_id)
            .await
            .map_err(SyncError::Request)
    }

    /// Stop polling. Results of requests still in flight are discarded.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Close and wait for the background task to publish `Stopped`.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(chat_id = %self.chat_id, "Sync task ended abnormally: {}", e);
            }
        }
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Stopped);
        }
        Ok(())
    }

    async fn request<R>(&self, command: impl FnOnce(Reply<R>) -> Command) -> Result<R, SyncError> {
        self.ensure_open()?;
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SyncError::Stopped)?;
        response.await.map_err(|_| SyncError::Stopped)?
    }
}

impl<T: ChatTransport> Drop for SyncPoller<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct PollLoop<T: ChatTransport> {
    chat_id: Uuid,
    transport: Arc<T>,
    config: SyncConfig,
    view: ChatView,
    reconciler: Reconciler,
    publisher: watch::Sender<ChatView>,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    fetch_in_flight: bool,
    /// Numbers fetches in the order they were issued.
    next_ticket: u64,
    /// Fetches numbered below this may predate a mark-read, so their unread
    /// count is ignored.
    unread_from_ticket: u64,
    mark_reads_in_flight: u32,
}

impl<T: ChatTransport> PollLoop<T> {
    async fn run(mut self) {
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(chat_id = %self.chat_id, "Chat sync started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(event) = self.events_rx.recv() => self.on_event(event),
                Some(command) = self.commands.recv() => self.on_command(command),
                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.view.state = PollState::Stopped;
        self.publish();
        info!(chat_id = %self.chat_id, "Chat sync stopped");
    }

    fn publish(&self) {
        // No receivers left just means nobody is watching.
        let _ = self.publisher.send(self.view.clone());
    }

    fn set_state(&mut self, state: PollState) {
        self.view.state = state;
        self.publish();
    }

    fn on_tick(&mut self) {
        if self.fetch_in_flight {
            debug!(chat_id = %self.chat_id, "Previous fetch still running, skipping tick");
            return;
        }
        self.fetch_in_flight = true;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.set_state(PollState::Polling);

        let transport = Arc::clone(&self.transport);
        let events = self.events_tx.clone();
        let cancel = self.cancel.child_token();
        let chat_id = self.chat_id;
        let window = self.config.window;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = fetch_snapshot(transport.as_ref(), chat_id, window) => result,
            };
            let _ = events.send(Event::Fetched { ticket, result }).await;
        });
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Send { text, media, reply } => {
                let text = text
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
                if text.is_none() && media.is_none() {
                    let _ = reply.send(Err(SyncError::EmptyMessage));
                    return;
                }

                let pending = PendingMessage {
                    local_id: Uuid::new_v4(),
                    text,
                    media,
                    after_id: self.view.tail(),
                    status: PendingStatus::Sending,
                    created_at: Utc::now(),
                };
                self.view.pending.push(pending.clone());
                self.publish();
                self.spawn_send(pending, reply);
            }
            Command::Retry { local_id, reply } => {
                let Some(pending) = self
                    .view
                    .pending
                    .iter_mut()
                    .find(|p| p.local_id == local_id && p.status == PendingStatus::Failed)
                else {
                    let _ = reply.send(Err(SyncError::UnknownLocalMessage(local_id)));
                    return;
                };
                pending.status = PendingStatus::Sending;
                let pending = pending.clone();
                self.publish();
                self.spawn_send(pending, reply);
            }
            Command::MarkRead { reply } => {
                self.view.unread_count = 0;
                self.unread_from_ticket = u64::MAX;
                self.mark_reads_in_flight += 1;
                self.publish();

                let transport = Arc::clone(&self.transport);
                let events = self.events_tx.clone();
                let chat_id = self.chat_id;
                tokio::spawn(async move {
                    let result = transport.mark_read(chat_id).await;
                    let event = Event::MarkedRead { result, reply };
                    if let Err(SendError(Event::MarkedRead { result, reply })) = events.send(event).await {
                        let _ = reply.send(result.map_err(SyncError::Request));
                    }
                });
            }
        }
    }

    /// Sends are not cancelled by `close`; if the loop is gone by the time
    /// the server answers, the caller still gets the result.
    fn spawn_send(&self, pending: PendingMessage, reply: Reply<Message>) {
        let transport = Arc::clone(&self.transport);
        let events = self.events_tx.clone();
        let chat_id = self.chat_id;
        let request = SendMessageRequest {
            text: pending.text,
            media: pending.media,
        };
        let local_id = pending.local_id;

        tokio::spawn(async move {
            let result = transport.send_message(chat_id, request).await;
            let event = Event::Sent {
                local_id,
                result,
                reply,
            };
            if let Err(SendError(Event::Sent { result, reply, .. })) = events.send(event).await {
                let _ = reply.send(result.map_err(SyncError::Send));
            }
        });
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Fetched { ticket, result } => {
                self.fetch_in_flight = false;
                match result {
                    Ok(snapshot) => {
                        self.set_state(PollState::Reconciling);
                        let apply_unread = ticket >= self.unread_from_ticket;
                        let advanced = self.reconciler.apply_snapshot(
                            &mut self.view,
                            snapshot,
                            apply_unread,
                            Utc::now(),
                        );
                        if advanced {
                            debug!(chat_id = %self.chat_id, tail = self.view.tail(), "New messages");
                        }
                    }
                    Err(e) => {
                        self.view.consecutive_failures += 1;
                        warn!(
                            chat_id = %self.chat_id,
                            failures = self.view.consecutive_failures,
                            "Chat fetch failed: {}",
                            e
                        );
                    }
                }
                self.set_state(PollState::Idle);
            }
            Event::Sent {
                local_id,
                result,
                reply,
            } => {
                let result = match result {
                    Ok(message) => {
                        self.reconciler
                            .confirm_sent(&mut self.view, local_id, message.clone());
                        Ok(message)
                    }
                    Err(e) => {
                        warn!(chat_id = %self.chat_id, %local_id, "Send failed: {}", e);
                        self.reconciler.fail_sent(&mut self.view, local_id);
                        Err(SyncError::Send(e))
                    }
                };
                self.publish();
                let _ = reply.send(result);
            }
            Event::MarkedRead { result, reply } => {
                self.mark_reads_in_flight = self.mark_reads_in_flight.saturating_sub(1);
                if self.mark_reads_in_flight == 0 {
                    self.unread_from_ticket = self.next_ticket;
                }
                let result = match result {
                    Ok(response) => {
                        if self.mark_reads_in_flight == 0 {
                            self.view.unread_count = response.unread_count;
                        }
                        Ok(response)
                    }
                    Err(e) => {
                        warn!(chat_id = %self.chat_id, "Mark read failed: {}", e);
                        Err(SyncError::Request(e))
                    }
                };
                self.publish();
                let _ = reply.send(result);
            }
        }
    }
}

async fn fetch_snapshot<T: ChatTransport>(
    transport: &T,
    chat_id: Uuid,
    window: u32,
) -> Result<RemoteSnapshot, TransportError> {
    let (messages, unread_count, typing, pinned) = tokio::try_join!(
        transport.list_messages(chat_id, 0, window),
        transport.unread_count(chat_id),
        transport.list_typing(chat_id),
        transport.list_pinned(chat_id),
    )?;
    Ok(RemoteSnapshot {
        messages,
        unread_count,
        typing,
        pinned,
    })
}
