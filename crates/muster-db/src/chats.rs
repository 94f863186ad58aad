use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use muster_types::models::Chat;

use crate::models::{ChatRow, ts};
use crate::{Database, DbError, Result};

impl Database {
    /// Returns the project's chat, creating it on first access.
    ///
    /// Creation is a single conditional insert keyed on the unique
    /// `project_id`, so two racing callers both end up reading the same row.
    pub fn get_or_create_chat(&self, project_id: Uuid) -> Result<Chat> {
        self.with_conn_mut(|conn| {
            let candidate = Uuid::new_v4();
            let inserted = conn.execute(
                "INSERT INTO chats (id, project_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(project_id) DO NOTHING",
                (candidate.to_string(), project_id.to_string(), ts(Utc::now())),
            )?;
            if inserted > 0 {
                info!(%project_id, chat_id = %candidate, "Created project chat");
            }

            query_chat_by_project(conn, project_id)?.ok_or_else(|| {
                DbError::NotFound(format!("chat for project {}", project_id))
            })
        })
    }

    pub fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| query_chat(conn, chat_id))
    }

    /// Like [`Database::get_chat`], but a missing chat is an error.
    pub fn require_chat(&self, chat_id: Uuid) -> Result<Chat> {
        self.get_chat(chat_id)?
            .ok_or_else(|| DbError::NotFound(format!("chat {}", chat_id)))
    }

    pub fn get_chat_for_project(&self, project_id: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| query_chat_by_project(conn, project_id))
    }
}

fn query_chat(conn: &Connection, chat_id: Uuid) -> Result<Option<Chat>> {
    let row = conn
        .query_row(
            "SELECT id, project_id, created_at FROM chats WHERE id = ?1",
            [chat_id.to_string()],
            ChatRow::from_row,
        )
        .optional()?;

    row.map(ChatRow::into_chat).transpose()
}

fn query_chat_by_project(conn: &Connection, project_id: Uuid) -> Result<Option<Chat>> {
    let row = conn
        .query_row(
            "SELECT id, project_id, created_at FROM chats WHERE project_id = ?1",
            [project_id.to_string()],
            ChatRow::from_row,
        )
        .optional()?;

    row.map(ChatRow::into_chat).transpose()
}

/// Fails with `NotFound` unless the chat row exists.
pub(crate) fn ensure_chat(conn: &Connection, chat_id: Uuid) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chats WHERE id = ?1)",
        [chat_id.to_string()],
        |r| r.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(DbError::NotFound(format!("chat {}", chat_id)))
    }
}
