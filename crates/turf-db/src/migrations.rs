use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::models::format_timestamp;
use crate::{DEFAULT_TOPIC_ID, MODERATOR_PROFILE_ID};

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS topics (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category    TEXT NOT NULL DEFAULT 'general',
            is_active   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            topic_id        TEXT NOT NULL REFERENCES topics(id),
            author_id       TEXT NOT NULL REFERENCES profiles(id),
            content         TEXT NOT NULL,
            parent_id       TEXT REFERENCES messages(id) ON DELETE CASCADE,
            is_pinned       INTEGER NOT NULL DEFAULT 0,
            is_moderator    INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_topic
            ON messages(topic_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_id);

        -- At most one pinned message per topic
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_one_pin
            ON messages(topic_id) WHERE is_pinned = 1;

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES profiles(id),
            kind        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, kind)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES profiles(id),
            kind        TEXT NOT NULL,
            message     TEXT NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    // Timestamps are written from Rust so every table shares one format
    let now = format_timestamp(Utc::now());

    conn.execute(
        "INSERT OR IGNORE INTO topics (id, title, description, category, is_active, created_at)
         VALUES (?1, 'Daily Debate', 'Today''s debate room', 'general', 1, ?2)",
        (DEFAULT_TOPIC_ID, &now),
    )?;

    // Reserved moderator profile; the password is not a valid hash so it cannot log in
    conn.execute(
        "INSERT OR IGNORE INTO profiles (id, username, password, created_at)
         VALUES (?1, 'wizard_of_mods', '!', ?2)",
        (MODERATOR_PROFILE_ID, &now),
    )?;

    info!("Database migrations complete");
    Ok(())
}
