use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Chat DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE chats (
                id               TEXT PRIMARY KEY,
                project_id       TEXT NOT NULL UNIQUE,
                created_at       TEXT NOT NULL,
                last_message_id  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE messages (
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                message_id  INTEGER NOT NULL,
                sender_id   TEXT NOT NULL,
                text        TEXT,
                media_kind  TEXT,
                media_ref   TEXT,
                created_at  TEXT NOT NULL,
                delivered   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE INDEX idx_messages_sender
                ON messages(chat_id, sender_id, message_id);

            CREATE TABLE read_states (
                chat_id               TEXT NOT NULL REFERENCES chats(id),
                user_id               TEXT NOT NULL,
                last_read_message_id  INTEGER NOT NULL DEFAULT 0,
                unread_count          INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE TABLE pinned_messages (
                chat_id     TEXT NOT NULL,
                message_id  INTEGER NOT NULL,
                pinned_by   TEXT NOT NULL,
                pinned_at   TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id),
                FOREIGN KEY (chat_id, message_id) REFERENCES messages(chat_id, message_id)
            );

            CREATE INDEX idx_pinned_recent
                ON pinned_messages(chat_id, pinned_at);

            -- Written by the project service; read here for roster access checks.
            CREATE TABLE project_members (
                project_id  TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                PRIMARY KEY (project_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Chat DB migrations complete");
    Ok(())
}
