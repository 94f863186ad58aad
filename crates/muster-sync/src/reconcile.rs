use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use muster_types::models::{Message, PinnedMessage, TypingState};

use crate::view::{ChatView, PendingStatus};

/// Everything one poll tick fetched from the server.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    pub messages: Vec<Message>,
    pub unread_count: u64,
    pub typing: Vec<TypingState>,
    pub pinned: Vec<PinnedMessage>,
}

/// Applies server results to a `ChatView`.
///
/// Remembers which of the user's own server messages already stand for a
/// local send, so two pending messages with the same text never collapse
/// onto one server copy.
#[derive(Debug)]
pub struct Reconciler {
    me: Uuid,
    claimed: BTreeSet<i64>,
}

impl Reconciler {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            claimed: BTreeSet::new(),
        }
    }

    /// Merge a fetched snapshot. Returns true when the message tail advanced.
    ///
    /// The window replaces the cache unless it is older than what the view
    /// already holds, which happens when a send confirmation lands while the
    /// fetch was in flight. `apply_unread` is false while a mark-read may
    /// have overtaken the fetch.
    pub fn apply_snapshot(
        &mut self,
        view: &mut ChatView,
        snapshot: RemoteSnapshot,
        apply_unread: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let remote_tail = snapshot.messages.last().map(|m| m.id).unwrap_or(0);
        let local_tail = view.tail();

        if remote_tail >= local_tail {
            view.messages = snapshot.messages;
        } else {
            debug!(chat_id = %view.chat_id, remote_tail, local_tail, "Ignoring stale message window");
        }

        self.match_pending(view);
        self.prune_claims(view);

        if apply_unread {
            view.unread_count = snapshot.unread_count;
        }
        let me = self.me;
        view.typing = snapshot
            .typing
            .into_iter()
            .filter(|t| t.user_id != me)
            .collect();
        view.pinned = snapshot.pinned;
        view.last_synced_at = Some(now);
        view.consecutive_failures = 0;

        remote_tail > local_tail
    }

    /// The server accepted a local send.
    pub fn confirm_sent(&mut self, view: &mut ChatView, local_id: Uuid, message: Message) {
        view.pending.retain(|p| p.local_id != local_id);
        self.claimed.insert(message.id);

        if let Err(pos) = view.messages.binary_search_by_key(&message.id, |m| m.id) {
            view.messages.insert(pos, message);
        }
    }

    pub fn fail_sent(&mut self, view: &mut ChatView, local_id: Uuid) {
        if let Some(pending) = view.pending.iter_mut().find(|p| p.local_id == local_id) {
            pending.status = PendingStatus::Failed;
        }
    }

    /// Drop pending messages whose server copy is already in the window.
    /// `Failed` entries stay until they are retried.
    fn match_pending(&mut self, view: &mut ChatView) {
        let me = self.me;
        let claimed = &mut self.claimed;
        let messages = &view.messages;

        view.pending.retain(|pending| {
            if pending.status != PendingStatus::Sending {
                return true;
            }
            let copy = messages.iter().find(|m| {
                m.id > pending.after_id
                    && m.sender_id == me
                    && !claimed.contains(&m.id)
                    && m.text == pending.text
                    && m.media == pending.media
            });
            match copy {
                Some(m) => {
                    claimed.insert(m.id);
                    false
                }
                None => true,
            }
        });
    }

    fn prune_claims(&mut self, view: &ChatView) {
        let floor = view.messages.first().map(|m| m.id).unwrap_or(0);
        self.claimed = self.claimed.split_off(&floor);
    }
}
