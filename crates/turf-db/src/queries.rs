use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use turf_types::models::{
    Message, MessageRecord, NewMessage, NewNotification, Notification, Reaction, Topic,
};

use crate::Database;
use crate::models::{
    MessageRow, NotificationRow, ProfileRow, ReactionRow, TopicRow, format_timestamp,
};

const MESSAGE_COLUMNS: &str = "SELECT m.id, m.topic_id, m.author_id, p.username, m.content, m.parent_id,
            m.is_pinned, m.is_moderator, m.created_at, m.updated_at
     FROM messages m
     LEFT JOIN profiles p ON m.author_id = p.id";

const REACTION_COLUMNS: &str = "SELECT r.id, r.message_id, m.topic_id, r.user_id, r.kind, r.created_at
     FROM reactions r
     JOIN messages m ON r.message_id = m.id";

const NOTIFICATION_COLUMNS: &str =
    "SELECT id, user_id, kind, message, is_read, created_at FROM notifications";

impl Database {
    // -- Profiles --

    /// Insert a profile. Returns `false` if the username is already taken.
    pub fn create_profile(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO profiles (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, format_timestamp(Utc::now())),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_profile_by_username(&self, username: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, created_at FROM profiles WHERE username = ?1",
                [username],
                profile_from_row,
            )
            .optional()
        })
    }

    pub fn get_profile_by_id(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, created_at FROM profiles WHERE id = ?1",
                [id],
                profile_from_row,
            )
            .optional()
        })
    }

    // -- Topics --

    pub fn active_topics(&self) -> Result<Vec<Topic>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, category, is_active, created_at
                 FROM topics WHERE is_active = 1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], topic_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(TopicRow::into_topic).collect())
        })
    }

    pub fn get_topic(&self, id: &str) -> Result<Option<Topic>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, title, description, category, is_active, created_at
                     FROM topics WHERE id = ?1",
                    [id],
                    topic_from_row,
                )
                .optional()?;
            Ok(row.map(TopicRow::into_topic))
        })
    }

    // -- Messages --

    pub fn insert_message(&self, new: &NewMessage) -> Result<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, topic_id, author_id, content, parent_id, is_moderator, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    id,
                    new.topic_id.to_string(),
                    new.author_id.to_string(),
                    new.content,
                    new.parent_id.map(|p| p.to_string()),
                    new.is_moderator,
                    now,
                ],
            )?;
            query_message(conn, &id)?
                .map(MessageRow::into_record)
                .ok_or_else(|| anyhow!("Message vanished after insert: {}", id))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRecord>> {
        self.with_conn(|conn| Ok(query_message(conn, id)?.map(MessageRow::into_record)))
    }

    /// Root messages of a topic with one level of replies and all reactions,
    /// oldest first.
    pub fn load_thread(&self, topic_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let roots = query_messages(
                conn,
                "WHERE m.topic_id = ?1 AND m.parent_id IS NULL",
                topic_id,
            )?;
            let replies = query_messages(
                conn,
                "WHERE m.topic_id = ?1 AND m.parent_id IS NOT NULL",
                topic_id,
            )?;

            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.topic_id = ?1 ORDER BY r.created_at ASC, r.rowid ASC",
                REACTION_COLUMNS
            ))?;
            let reactions = stmt
                .query_map([topic_id], reaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut reactions_by_message: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
            for r in reactions.into_iter().map(ReactionRow::into_reaction) {
                reactions_by_message.entry(r.message_id).or_default().push(r);
            }

            let mut replies_by_parent: HashMap<Uuid, Vec<Message>> = HashMap::new();
            for row in replies {
                let mut reply = Message::from(row.into_record());
                reply.reactions = reactions_by_message.remove(&reply.id).unwrap_or_default();
                if let Some(parent_id) = reply.parent_id {
                    replies_by_parent.entry(parent_id).or_default().push(reply);
                }
            }

            Ok(roots
                .into_iter()
                .map(|row| {
                    let mut root = Message::from(row.into_record());
                    root.reactions = reactions_by_message.remove(&root.id).unwrap_or_default();
                    root.replies = replies_by_parent.remove(&root.id).unwrap_or_default();
                    root
                })
                .collect())
        })
    }

    /// Delete a message and its replies. Returns the removed rows, replies first.
    pub fn delete_message(&self, id: &str) -> Result<Vec<MessageRecord>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(root) = query_message(&tx, id)? else {
                return Ok(vec![]);
            };
            let mut removed: Vec<MessageRecord> = {
                let mut stmt = tx.prepare(&format!(
                    "{} WHERE m.parent_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC",
                    MESSAGE_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([id], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.into_iter().map(MessageRow::into_record).collect()
            };
            tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            tx.commit()?;

            removed.push(root.into_record());
            Ok(removed)
        })
    }

    /// Pin `message_id`, unpinning whatever else is pinned in the topic.
    /// Returns every row whose pinned flag changed.
    pub fn pin_message(&self, topic_id: &str, message_id: &str) -> Result<Vec<MessageRecord>> {
        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut changed = unpin_in(&tx, topic_id, Some(message_id), &now)?;

            let updated = tx.execute(
                "UPDATE messages SET is_pinned = 1, updated_at = ?3
                 WHERE id = ?1 AND topic_id = ?2 AND is_pinned = 0",
                (message_id, topic_id, &now),
            )?;
            if updated > 0 {
                if let Some(row) = query_message(&tx, message_id)? {
                    changed.push(row.into_record());
                }
            }
            tx.commit()?;
            Ok(changed)
        })
    }

    /// Clear every pinned flag in a topic. Returns the rows that changed.
    pub fn unpin_topic(&self, topic_id: &str) -> Result<Vec<MessageRecord>> {
        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = unpin_in(&tx, topic_id, None, &now)?;
            tx.commit()?;
            Ok(changed)
        })
    }

    // -- Reactions --

    /// Toggle a reaction: removes if it exists, inserts if not.
    /// Returns `None` when the message does not exist, otherwise
    /// `(added, reaction)` where `reaction` is the inserted or removed row.
    pub fn toggle_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        kind: &str,
    ) -> Result<Option<(bool, Reaction)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing = tx
                .query_row(
                    &format!(
                        "{} WHERE r.message_id = ?1 AND r.user_id = ?2 AND r.kind = ?3",
                        REACTION_COLUMNS
                    ),
                    (message_id, user_id, kind),
                    reaction_from_row,
                )
                .optional()?;

            if let Some(row) = existing {
                tx.execute("DELETE FROM reactions WHERE id = ?1", [&row.id])?;
                tx.commit()?;
                return Ok(Some((false, row.into_reaction())));
            }

            if query_message(&tx, message_id)?.is_none() {
                return Ok(None);
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO reactions (id, message_id, user_id, kind, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (&id, message_id, user_id, kind, format_timestamp(Utc::now())),
            )?;
            let row = tx.query_row(
                &format!("{} WHERE r.id = ?1", REACTION_COLUMNS),
                [&id],
                reaction_from_row,
            )?;
            tx.commit()?;
            Ok(Some((true, row.into_reaction())))
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, new: &NewNotification) -> Result<Notification> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, message, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &id,
                    new.user_id.to_string(),
                    new.kind.as_str(),
                    &new.message,
                    format_timestamp(Utc::now()),
                ),
            )?;
            query_notification(conn, &id)?
                .map(NotificationRow::into_notification)
                .ok_or_else(|| anyhow!("Notification vanished after insert: {}", id))
        })
    }

    /// Newest first.
    pub fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let filter = if unread_only { "AND is_read = 0" } else { "" };
            let mut stmt = conn.prepare(&format!(
                "{} WHERE user_id = ?1 {} ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                NOTIFICATION_COLUMNS, filter
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(NotificationRow::into_notification).collect())
        })
    }

    /// Mark one of the user's notifications read. Returns `None` if the user
    /// has no such notification, otherwise the row and whether it changed.
    pub fn mark_notification_read(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<(Notification, bool)>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2 AND is_read = 0",
                (id, user_id),
            )? > 0;
            let row = query_notification(conn, id)?.filter(|row| row.user_id == user_id);
            Ok(row.map(|row| (row.into_notification(), changed)))
        })
    }

    /// Returns the notifications that flipped to read.
    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let unread: Vec<NotificationRow> = {
                let mut stmt = tx.prepare(&format!(
                    "{} WHERE user_id = ?1 AND is_read = 0 ORDER BY created_at ASC, rowid ASC",
                    NOTIFICATION_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([user_id], notification_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };
            tx.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            tx.commit()?;

            Ok(unread
                .into_iter()
                .map(|mut row| {
                    row.is_read = true;
                    row.into_notification()
                })
                .collect())
        })
    }
}

fn unpin_in(
    conn: &Connection,
    topic_id: &str,
    keep: Option<&str>,
    now: &str,
) -> Result<Vec<MessageRecord>> {
    let pinned: Vec<String> = {
        let mut stmt =
            conn.prepare("SELECT id FROM messages WHERE topic_id = ?1 AND is_pinned = 1")?;
        let ids = stmt
            .query_map([topic_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };

    let mut changed = Vec::new();
    for id in pinned.iter().filter(|id| Some(id.as_str()) != keep) {
        conn.execute(
            "UPDATE messages SET is_pinned = 0, updated_at = ?2 WHERE id = ?1",
            (id, now),
        )?;
        if let Some(row) = query_message(conn, id)? {
            changed.push(row.into_record());
        }
    }
    Ok(changed)
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    conn.query_row(
        &format!("{} WHERE m.id = ?1", MESSAGE_COLUMNS),
        [id],
        message_from_row,
    )
    .optional()
}

fn query_messages(conn: &Connection, filter: &str, topic_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "{} {} ORDER BY m.created_at ASC, m.rowid ASC",
        MESSAGE_COLUMNS, filter
    ))?;
    let rows = stmt
        .query_map([topic_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_notification(conn: &Connection, id: &str) -> Result<Option<NotificationRow>> {
    conn.query_row(
        &format!("{} WHERE id = ?1", NOTIFICATION_COLUMNS),
        [id],
        notification_from_row,
    )
    .optional()
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<TopicRow> {
    Ok(TopicRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        parent_id: row.get(5)?,
        is_pinned: row.get(6)?,
        is_moderator: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        topic_id: row.get(2)?,
        user_id: row.get(3)?,
        kind: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        message: row.get(3)?,
        is_read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
