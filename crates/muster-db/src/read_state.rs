use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use muster_types::models::ReadState;

use crate::chats::ensure_chat;
use crate::messages::query_tail;
use crate::{Database, Result};

impl Database {
    /// Start caching a member's read state so that later appends keep their
    /// unread count current. Idempotent; the initial count is derived from the
    /// log, so a newcomer sees the whole history from other senders as unread.
    pub fn register_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<ReadState> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            ensure_chat(&tx, chat_id)?;

            let inserted = tx.execute(
                "INSERT INTO read_states (chat_id, user_id, last_read_message_id, unread_count)
                 SELECT ?1, ?2, 0, COUNT(*) FROM messages
                 WHERE chat_id = ?1 AND sender_id != ?2
                 ON CONFLICT(chat_id, user_id) DO NOTHING",
                [chat_id.to_string(), user_id.to_string()],
            )?;
            if inserted > 0 {
                debug!(%chat_id, %user_id, "Registered chat member");
            }

            let state = query_read_state(&tx, chat_id, user_id)?;
            tx.commit()?;
            Ok(state)
        })
    }

    /// Move the user's read pointer to the chat tail as of this call and zero
    /// the unread count. Calling it again is harmless.
    pub fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> Result<ReadState> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let tail = query_tail(&tx, chat_id)?;

            tx.execute(
                "INSERT INTO read_states (chat_id, user_id, last_read_message_id, unread_count)
                 VALUES (?1, ?2, ?3, 0)
                 ON CONFLICT(chat_id, user_id) DO UPDATE SET
                     last_read_message_id = MAX(last_read_message_id, excluded.last_read_message_id),
                     unread_count = 0",
                params![chat_id.to_string(), user_id.to_string(), tail],
            )?;
            tx.commit()?;

            debug!(%chat_id, %user_id, tail, "Marked chat read");
            Ok(ReadState {
                chat_id,
                user_id,
                last_read_message_id: tail,
                unread_count: 0,
            })
        })
    }

    pub fn unread_count(&self, chat_id: Uuid, user_id: Uuid) -> Result<u64> {
        Ok(self.read_state(chat_id, user_id)?.unread_count)
    }

    pub fn read_state(&self, chat_id: Uuid, user_id: Uuid) -> Result<ReadState> {
        self.with_conn(|conn| {
            ensure_chat(conn, chat_id)?;
            query_read_state(conn, chat_id, user_id)
        })
    }
}

/// Cached row if present, otherwise the count derived straight from the log.
fn query_read_state(conn: &Connection, chat_id: Uuid, user_id: Uuid) -> Result<ReadState> {
    let cached: Option<(i64, i64)> = conn
        .query_row(
            "SELECT last_read_message_id, unread_count FROM read_states
             WHERE chat_id = ?1 AND user_id = ?2",
            [chat_id.to_string(), user_id.to_string()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let (last_read_message_id, unread) = match cached {
        Some(row) => row,
        None => (0, derived_unread(conn, chat_id, user_id, 0)?),
    };

    Ok(ReadState {
        chat_id,
        user_id,
        last_read_message_id,
        unread_count: unread.max(0) as u64,
    })
}

fn derived_unread(conn: &Connection, chat_id: Uuid, user_id: Uuid, after: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE chat_id = ?1 AND message_id > ?2 AND sender_id != ?3",
        params![chat_id.to_string(), after, user_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;
    use crate::test_support::open_db;

    fn assert_invariant(db: &Database, chat_id: Uuid, user_id: Uuid) {
        let state = db.read_state(chat_id, user_id).unwrap();
        let derived = db
            .with_conn(|conn| derived_unread(conn, chat_id, user_id, state.last_read_message_id))
            .unwrap();
        assert_eq!(state.unread_count, derived as u64);
    }

    #[test]
    fn test_hello_again_scenario() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.register_member(chat.id, alice).unwrap();
        db.register_member(chat.id, bob).unwrap();

        let hello = db.append_message(chat.id, alice, Some("hello"), None).unwrap();
        assert_eq!(hello.id, 1);
        assert_eq!(db.unread_count(chat.id, bob).unwrap(), 1);

        db.mark_read(chat.id, bob).unwrap();
        assert_eq!(db.unread_count(chat.id, bob).unwrap(), 0);

        let again = db.append_message(chat.id, alice, Some("again"), None).unwrap();
        assert_eq!(again.id, 2);
        assert_eq!(db.unread_count(chat.id, bob).unwrap(), 1);
        assert_eq!(db.unread_count(chat.id, alice).unwrap(), 0);

        assert_invariant(&db, chat.id, alice);
        assert_invariant(&db, chat.id, bob);
    }

    #[test]
    fn test_append_bumps_everyone_but_sender() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let members: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for m in &members {
            db.register_member(chat.id, *m).unwrap();
        }

        let before: Vec<u64> = members
            .iter()
            .map(|m| db.unread_count(chat.id, *m).unwrap())
            .collect();
        db.append_message(chat.id, members[0], Some("status update"), None)
            .unwrap();

        for (i, m) in members.iter().enumerate() {
            let expected = if i == 0 { before[i] } else { before[i] + 1 };
            assert_eq!(db.unread_count(chat.id, *m).unwrap(), expected);
            assert_invariant(&db, chat.id, *m);
        }
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.append_message(chat.id, alice, Some("one"), None).unwrap();
        db.append_message(chat.id, alice, Some("two"), None).unwrap();

        let first = db.mark_read(chat.id, bob).unwrap();
        let second = db.mark_read(chat.id, bob).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.unread_count, 0);
        assert_eq!(second.last_read_message_id, 2);
        assert_invariant(&db, chat.id, bob);
    }

    #[test]
    fn test_mark_read_uses_tail_at_call_time() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        db.append_message(chat.id, alice, Some("one"), None).unwrap();
        db.mark_read(chat.id, bob).unwrap();
        db.append_message(chat.id, alice, Some("two"), None).unwrap();
        db.append_message(chat.id, alice, Some("three"), None).unwrap();
        assert_eq!(db.unread_count(chat.id, bob).unwrap(), 2);

        let state = db.mark_read(chat.id, bob).unwrap();
        assert_eq!(state.last_read_message_id, 3);
        assert_eq!(db.unread_count(chat.id, bob).unwrap(), 0);
    }

    #[test]
    fn test_unregistered_user_gets_derived_count() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let alice = Uuid::new_v4();
        let latecomer = Uuid::new_v4();
        db.append_message(chat.id, alice, Some("one"), None).unwrap();
        db.append_message(chat.id, alice, Some("two"), None).unwrap();

        assert_eq!(db.unread_count(chat.id, latecomer).unwrap(), 2);
        let state = db.register_member(chat.id, latecomer).unwrap();
        assert_eq!(state.unread_count, 2);

        db.append_message(chat.id, alice, Some("three"), None).unwrap();
        assert_eq!(db.unread_count(chat.id, latecomer).unwrap(), 3);
        assert_invariant(&db, chat.id, latecomer);
    }

    #[test]
    fn test_missing_chat_is_not_found() {
        let (db, _tmp) = open_db();
        let chat_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert!(matches!(db.mark_read(chat_id, user), Err(DbError::NotFound(_))));
        assert!(matches!(db.unread_count(chat_id, user), Err(DbError::NotFound(_))));
        assert!(matches!(db.register_member(chat_id, user), Err(DbError::NotFound(_))));
    }
}
