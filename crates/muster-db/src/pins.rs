use chrono::Utc;
use rusqlite::params;
use tracing::debug;
use uuid::Uuid;

use muster_types::models::PinnedMessage;

use crate::chats::ensure_chat;
use crate::models::{MessageRow, parse_ts, parse_uuid, ts};
use crate::{Database, DbError, Result};

impl Database {
    /// Pin a message. Pinning an already-pinned message keeps the original
    /// pinner and timestamp.
    pub fn pin_message(&self, chat_id: Uuid, message_id: i64, pinned_by: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let cid = chat_id.to_string();
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE chat_id = ?1 AND message_id = ?2)",
                params![cid, message_id],
                |r| r.get(0),
            )?;
            if !exists {
                return Err(DbError::NotFound(format!(
                    "message {} in chat {}",
                    message_id, chat_id
                )));
            }

            let inserted = conn.execute(
                "INSERT INTO pinned_messages (chat_id, message_id, pinned_by, pinned_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chat_id, message_id) DO NOTHING",
                params![cid, message_id, pinned_by.to_string(), ts(Utc::now())],
            )?;
            if inserted > 0 {
                debug!(%chat_id, message_id, %pinned_by, "Pinned message");
            }
            Ok(())
        })
    }

    /// Unpin a message. Returns whether a pin was actually removed; unpinning
    /// something that is not pinned is not an error.
    pub fn unpin_message(&self, chat_id: Uuid, message_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM pinned_messages WHERE chat_id = ?1 AND message_id = ?2",
                params![chat_id.to_string(), message_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Pinned messages, most recently pinned first.
    pub fn list_pinned(&self, chat_id: Uuid) -> Result<Vec<PinnedMessage>> {
        self.with_conn(|conn| {
            ensure_chat(conn, chat_id)?;

            let mut stmt = conn.prepare(
                "SELECT p.pinned_by, p.pinned_at,
                        m.chat_id, m.message_id, m.sender_id, m.text, m.media_kind, m.media_ref,
                        m.created_at, m.delivered
                 FROM pinned_messages p
                 JOIN messages m ON m.chat_id = p.chat_id AND m.message_id = p.message_id
                 WHERE p.chat_id = ?1
                 ORDER BY p.pinned_at DESC, p.rowid DESC",
            )?;

            let rows = stmt
                .query_map([chat_id.to_string()], |row| {
                    let pinned_by: String = row.get(0)?;
                    let pinned_at: String = row.get(1)?;
                    Ok((pinned_by, pinned_at, MessageRow::from_row_at(row, 2)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(pinned_by, pinned_at, message)| {
                    let message = message.into_message()?;
                    Ok(PinnedMessage {
                        chat_id,
                        message_id: message.id,
                        pinned_by: parse_uuid(&pinned_by)?,
                        pinned_at: parse_ts(&pinned_at)?,
                        message,
                    })
                })
                .collect()
        })
    }
}
