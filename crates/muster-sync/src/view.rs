use chrono::{DateTime, Utc};
use uuid::Uuid;

use muster_types::models::{MediaRef, Message, PinnedMessage, TypingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    /// Loop running, no fetch in flight.
    #[default]
    Idle,
    /// A fetch is in flight.
    Polling,
    /// A fetch result is being applied to the cache.
    Reconciling,
    /// Closed. Terminal.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Sending,
    Failed,
}

/// A message the user sent that the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub local_id: Uuid,
    pub text: Option<String>,
    pub media: Option<MediaRef>,
    /// Local tail when the message was composed. The server copy must have a
    /// greater id.
    pub after_id: i64,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of one open chat, published after every change.
#[derive(Debug, Clone, Default)]
pub struct ChatView {
    pub chat_id: Uuid,
    pub state: PollState,
    /// Confirmed messages, ascending by id.
    pub messages: Vec<Message>,
    /// Optimistic messages in the order they were sent.
    pub pending: Vec<PendingMessage>,
    pub unread_count: u64,
    /// Other members currently typing.
    pub typing: Vec<TypingState>,
    pub pinned: Vec<PinnedMessage>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Fetches that failed since the last successful one.
    pub consecutive_failures: u32,
}

impl ChatView {
    pub fn new(chat_id: Uuid) -> Self {
        Self {
            chat_id,
            ..Self::default()
        }
    }

    /// Id of the newest confirmed message, 0 when empty.
    pub fn tail(&self) -> i64 {
        self.messages.last().map(|m| m.id).unwrap_or(0)
    }

    /// True once the last fetch failed; the cached data may be out of date.
    pub fn is_stale(&self) -> bool {
        self.consecutive_failures > 0
    }

    pub fn pending_message(&self, local_id: Uuid) -> Option<&PendingMessage> {
        self.pending.iter().find(|p| p.local_id == local_id)
    }
}
