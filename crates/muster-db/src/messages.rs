use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use muster_types::models::{MediaRef, Message};

use crate::chats::ensure_chat;
use crate::models::{MESSAGE_COLUMNS, MessageRow, ts};
use crate::{Database, DbError, Result};

impl Database {
    /// Append a message to the chat log.
    ///
    /// The next id is taken from the chat's counter and every other member's
    /// cached unread count is bumped in the same transaction. Membership is
    /// not checked here.
    pub fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        text: Option<&str>,
        media: Option<&MediaRef>,
    ) -> Result<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let cid = chat_id.to_string();
            let sid = sender_id.to_string();

            let message_id: i64 = tx
                .query_row(
                    "UPDATE chats SET last_message_id = last_message_id + 1
                     WHERE id = ?1
                     RETURNING last_message_id",
                    [&cid],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or_else(|| DbError::NotFound(format!("chat {}", chat_id)))?;

            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO messages (chat_id, message_id, sender_id, text, media_kind, media_ref, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    cid,
                    message_id,
                    sid,
                    text,
                    media.map(|m| m.kind.as_str()),
                    media.map(|m| m.reference.as_str()),
                    ts(created_at),
                ],
            )?;

            let bumped = tx.execute(
                "UPDATE read_states SET unread_count = unread_count + 1
                 WHERE chat_id = ?1 AND user_id != ?2",
                [&cid, &sid],
            )?;

            tx.commit()?;
            debug!(%chat_id, message_id, bumped, "Appended message");

            Ok(Message {
                id: message_id,
                chat_id,
                sender_id,
                text: text.map(str::to_owned),
                media: media.cloned(),
                created_at,
                delivered: false,
            })
        })
    }

    /// Newest-window fetch: skip `offset` messages from the tail, take up to
    /// `limit`, and return them oldest first.
    pub fn fetch_messages(&self, chat_id: Uuid, offset: u32, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            ensure_chat(conn, chat_id)?;
            let mut messages = query_window(conn, chat_id, offset, limit)?;
            messages.reverse();
            Ok(messages)
        })
    }

    /// Messages with an id strictly greater than `since`, oldest first.
    pub fn fetch_messages_since(&self, chat_id: Uuid, since: i64, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            ensure_chat(conn, chat_id)?;
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1 AND message_id > ?2
                 ORDER BY message_id ASC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![chat_id.to_string(), since, limit], |row| {
                    MessageRow::from_row_at(row, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    /// Id of the newest message, or 0 for an empty chat.
    pub fn chat_tail(&self, chat_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| query_tail(conn, chat_id))
    }

    /// Flag the messages in `first..=last` as delivered once someone other
    /// than their sender has fetched them. Returns how many rows changed.
    pub fn mark_delivered(
        &self,
        chat_id: Uuid,
        reader_id: Uuid,
        first: i64,
        last: i64,
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET delivered = 1
                 WHERE chat_id = ?1 AND message_id BETWEEN ?2 AND ?3
                   AND sender_id != ?4 AND delivered = 0",
                params![chat_id.to_string(), first, last, reader_id.to_string()],
            )?;
            Ok(changed)
        })
    }
}

fn query_window(conn: &Connection, chat_id: Uuid, offset: u32, limit: u32) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE chat_id = ?1
         ORDER BY message_id DESC
         LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![chat_id.to_string(), limit, offset], |row| {
            MessageRow::from_row_at(row, 0)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(MessageRow::into_message).collect()
}

pub(crate) fn query_tail(conn: &Connection, chat_id: Uuid) -> Result<i64> {
    conn.query_row(
        "SELECT last_message_id FROM chats WHERE id = ?1",
        [chat_id.to_string()],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("chat {}", chat_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_db;
    use muster_types::models::MediaKind;

    #[test]
    fn test_append_ids_are_sequential() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let sender = Uuid::new_v4();

        let ids: Vec<i64> = (0..10)
            .map(|i| {
                db.append_message(chat.id, sender, Some(&format!("m{}", i)), None)
                    .unwrap()
                    .id
            })
            .collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert_eq!(db.chat_tail(chat.id).unwrap(), 10);
    }

    #[test]
    fn test_ids_are_per_chat() {
        let (db, _tmp) = open_db();
        let a = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let b = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let sender = Uuid::new_v4();

        assert_eq!(db.append_message(a.id, sender, Some("a1"), None).unwrap().id, 1);
        assert_eq!(db.append_message(a.id, sender, Some("a2"), None).unwrap().id, 2);
        assert_eq!(db.append_message(b.id, sender, Some("b1"), None).unwrap().id, 1);
    }

    #[test]
    fn test_concurrent_appends_have_no_gaps() {
        let (db, _tmp) = open_db();
        let db = std::sync::Arc::new(db);
        let chat_id = db.get_or_create_chat(Uuid::new_v4()).unwrap().id;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    let sender = Uuid::new_v4();
                    (0..25)
                        .map(|_| db.append_message(chat_id, sender, Some("x"), None).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| {
                let ids = h.join().unwrap();
                assert!(ids.windows(2).all(|w| w[0] < w[1]));
                ids
            })
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn test_append_to_missing_chat() {
        let (db, _tmp) = open_db();
        let err = db
            .append_message(Uuid::new_v4(), Uuid::new_v4(), Some("hi"), None)
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn test_fetch_newest_window() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let sender = Uuid::new_v4();
        for i in 1..=7 {
            db.append_message(chat.id, sender, Some(&format!("m{}", i)), None)
                .unwrap();
        }

        let ids = |v: Vec<Message>| v.into_iter().map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids(db.fetch_messages(chat.id, 0, 3).unwrap()), vec![5, 6, 7]);
        assert_eq!(ids(db.fetch_messages(chat.id, 3, 3).unwrap()), vec![2, 3, 4]);
        assert_eq!(ids(db.fetch_messages(chat.id, 6, 3).unwrap()), vec![1]);
        assert!(db.fetch_messages(chat.id, 10, 3).unwrap().is_empty());
        assert_eq!(ids(db.fetch_messages_since(chat.id, 4, 50).unwrap()), vec![5, 6, 7]);
    }

    #[test]
    fn test_fetch_missing_chat() {
        let (db, _tmp) = open_db();
        assert!(matches!(
            db.fetch_messages(Uuid::new_v4(), 0, 50),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_media_round_trips_through_storage() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let media = MediaRef {
            kind: MediaKind::Image,
            reference: "reports/42/photo.jpg".into(),
        };

        let sent = db
            .append_message(chat.id, Uuid::new_v4(), None, Some(&media))
            .unwrap();
        let fetched = db.fetch_messages(chat.id, 0, 1).unwrap();
        assert_eq!(fetched[0].media.as_ref(), Some(&media));
        assert_eq!(fetched[0].text, None);
        assert_eq!(fetched[0].id, sent.id);
    }

    #[test]
    fn test_mark_delivered_skips_own_messages() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.append_message(chat.id, alice, Some("from alice"), None).unwrap();
        db.append_message(chat.id, bob, Some("from bob"), None).unwrap();

        assert_eq!(db.mark_delivered(chat.id, bob, 1, 2).unwrap(), 1);
        assert_eq!(db.mark_delivered(chat.id, bob, 1, 2).unwrap(), 0);

        let messages = db.fetch_messages(chat.id, 0, 10).unwrap();
        assert!(messages[0].delivered);
        assert!(!messages[1].delivered);
    }

    #[test]
    fn test_mark_delivered_stays_inside_window() {
        let (db, _tmp) = open_db();
        let chat = db.get_or_create_chat(Uuid::new_v4()).unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for text in ["one", "two", "three", "four"] {
            db.append_message(chat.id, alice, Some(text), None).unwrap();
        }

        assert_eq!(db.mark_delivered(chat.id, bob, 2, 3).unwrap(), 2);

        let flags: Vec<bool> = db
            .fetch_messages(chat.id, 0, 10)
            .unwrap()
            .iter()
            .map(|m| m.delivered)
            .collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }
}
