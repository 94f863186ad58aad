//! Ephemeral "who is typing" state.
//!
//! Entries live only in memory and expire on their own: a client keeps an
//! indicator alive by re-sending it before the TTL runs out and simply stops
//! when the user stops typing. Expired entries are hidden from readers right
//! away and physically removed either on the next read of that chat or by a
//! periodic [`TypingRegistry::sweep`].
//!
//! Writes are last-writer-wins with no per-chat ordering. A lost or stale
//! indicator only affects a UX hint, so there is nothing to serialize.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::trace;
use uuid::Uuid;

use muster_types::models::{TypingState, TypingType};

/// Longest TTL a client can request.
pub const MAX_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct TypingEntry {
    typing_type: TypingType,
    expires_at: DateTime<Utc>,
}

type ChatTyping = HashMap<Uuid, TypingEntry>;

#[derive(Clone, Default)]
pub struct TypingRegistry {
    /// chat_id -> (user_id -> entry)
    chats: Arc<RwLock<HashMap<Uuid, ChatTyping>>>,
}

impl TypingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_typing(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        typing_type: TypingType,
        ttl: Duration,
    ) -> TypingState {
        self.set_typing_at(Utc::now(), chat_id, user_id, typing_type, ttl)
    }

    /// Overwrite the user's indicator unconditionally.
    pub fn set_typing_at(
        &self,
        now: DateTime<Utc>,
        chat_id: Uuid,
        user_id: Uuid,
        typing_type: TypingType,
        ttl: Duration,
    ) -> TypingState {
        let ttl = TimeDelta::from_std(ttl.min(MAX_TTL)).unwrap_or(TimeDelta::zero());
        let entry = TypingEntry {
            typing_type,
            expires_at: now + ttl,
        };

        self.write()
            .entry(chat_id)
            .or_default()
            .insert(user_id, entry);
        trace!(%chat_id, %user_id, ?typing_type, "Typing indicator set");

        TypingState {
            chat_id,
            user_id,
            typing_type,
            expires_at: entry.expires_at,
        }
    }

    pub fn list_active(&self, chat_id: Uuid) -> Vec<TypingState> {
        self.list_active_at(chat_id, Utc::now())
    }

    /// Live indicators for a chat, ordered by user id. Expired entries found
    /// along the way are pruned.
    pub fn list_active_at(&self, chat_id: Uuid, now: DateTime<Utc>) -> Vec<TypingState> {
        let (mut active, saw_expired) = {
            let chats = self.read();
            let Some(users) = chats.get(&chat_id) else {
                return Vec::new();
            };

            let active: Vec<TypingState> = users
                .iter()
                .filter(|(_, e)| now < e.expires_at)
                .map(|(user_id, e)| TypingState {
                    chat_id,
                    user_id: *user_id,
                    typing_type: e.typing_type,
                    expires_at: e.expires_at,
                })
                .collect();
            let saw_expired = active.len() < users.len();
            (active, saw_expired)
        };

        if saw_expired {
            let mut chats = self.write();
            if let Some(users) = chats.get_mut(&chat_id) {
                users.retain(|_, e| now < e.expires_at);
                if users.is_empty() {
                    chats.remove(&chat_id);
                }
            }
        }

        active.sort_by_key(|s| s.user_id);
        active
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Drop every expired entry across all chats. Returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        let mut chats = self.write();
        chats.retain(|_, users| {
            let before = users.len();
            users.retain(|_, e| now < e.expires_at);
            removed += before - users.len();
            !users.is_empty()
        });
        removed
    }

    // Entries are plain data; a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, ChatTyping>> {
        self.chats.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, ChatTyping>> {
        self.chats.write().unwrap_or_else(|e| e.into_inner())
    }
}
