//! Database row types and the conversions between them and `muster-types`.
//! SQLite stores ids as TEXT and timestamps as fixed-width RFC 3339 text so
//! that lexical order matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;

use muster_types::models::{Chat, MediaKind, MediaRef, Message};

use crate::{DbError, Result};

pub const MESSAGE_COLUMNS: &str =
    "chat_id, message_id, sender_id, text, media_kind, media_ref, created_at, delivered";

pub struct ChatRow {
    pub id: String,
    pub project_id: String,
    pub created_at: String,
}

impl ChatRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    pub fn into_chat(self) -> Result<Chat> {
        Ok(Chat {
            id: parse_uuid(&self.id)?,
            project_id: parse_uuid(&self.project_id)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub chat_id: String,
    pub message_id: i64,
    pub sender_id: String,
    pub text: Option<String>,
    pub media_kind: Option<String>,
    pub media_ref: Option<String>,
    pub created_at: String,
    pub delivered: bool,
}

impl MessageRow {
    /// Reads the columns listed in [`MESSAGE_COLUMNS`], starting at `offset`.
    pub fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            chat_id: row.get(offset)?,
            message_id: row.get(offset + 1)?,
            sender_id: row.get(offset + 2)?,
            text: row.get(offset + 3)?,
            media_kind: row.get(offset + 4)?,
            media_ref: row.get(offset + 5)?,
            created_at: row.get(offset + 6)?,
            delivered: row.get(offset + 7)?,
        })
    }

    pub fn into_message(self) -> Result<Message> {
        let media = match (self.media_kind, self.media_ref) {
            (Some(kind), Some(reference)) => {
                let kind = MediaKind::parse(&kind).ok_or_else(|| {
                    DbError::Corrupt(format!(
                        "media kind '{}' on message {}",
                        kind, self.message_id
                    ))
                })?;
                Some(MediaRef { kind, reference })
            }
            _ => None,
        };

        Ok(Message {
            id: self.message_id,
            chat_id: parse_uuid(&self.chat_id)?,
            sender_id: parse_uuid(&self.sender_id)?,
            text: self.text,
            media,
            created_at: parse_ts(&self.created_at)?,
            delivered: self.delivered,
        })
    }
}

pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("timestamp '{}': {}", s, e)))
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|e| DbError::Corrupt(format!("uuid '{}': {}", s, e)))
}
