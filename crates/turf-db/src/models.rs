//! Database row types. These map directly to SQLite rows and are converted
//! into `turf-types` models at the edge of this crate.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use turf_types::models::{
    MessageRecord, Notification, NotificationKind, Profile, Reaction, Topic,
};

pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct TopicRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub is_active: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub topic_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub parent_id: Option<String>,
    pub is_pinned: bool,
    pub is_moderator: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub topic_id: String,
    pub user_id: String,
    pub kind: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

impl ProfileRow {
    pub fn into_profile(self) -> Profile {
        Profile {
            id: parse_uuid(&self.id, "profile.id"),
            username: self.username,
            created_at: parse_timestamp(&self.created_at, "profile.created_at"),
        }
    }
}

impl TopicRow {
    pub fn into_topic(self) -> Topic {
        Topic {
            id: parse_uuid(&self.id, "topic.id"),
            title: self.title,
            description: self.description,
            category: self.category,
            is_active: self.is_active,
            created_at: parse_timestamp(&self.created_at, "topic.created_at"),
        }
    }
}

impl MessageRow {
    pub fn into_record(self) -> MessageRecord {
        MessageRecord {
            id: parse_uuid(&self.id, "message.id"),
            topic_id: parse_uuid(&self.topic_id, "message.topic_id"),
            author_id: parse_uuid(&self.author_id, "message.author_id"),
            author_username: self.author_username,
            content: self.content,
            parent_id: self.parent_id.as_deref().map(|p| parse_uuid(p, "message.parent_id")),
            is_pinned: self.is_pinned,
            is_moderator: self.is_moderator,
            created_at: parse_timestamp(&self.created_at, "message.created_at"),
            updated_at: parse_timestamp(&self.updated_at, "message.updated_at"),
        }
    }
}

impl ReactionRow {
    pub fn into_reaction(self) -> Reaction {
        Reaction {
            id: parse_uuid(&self.id, "reaction.id"),
            message_id: parse_uuid(&self.message_id, "reaction.message_id"),
            topic_id: parse_uuid(&self.topic_id, "reaction.topic_id"),
            user_id: parse_uuid(&self.user_id, "reaction.user_id"),
            kind: self.kind,
            created_at: parse_timestamp(&self.created_at, "reaction.created_at"),
        }
    }
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        let kind = self.kind.parse().unwrap_or_else(|e| {
            warn!("Corrupt notification kind on '{}': {}", self.id, e);
            NotificationKind::General
        });
        Notification {
            id: parse_uuid(&self.id, "notification.id"),
            user_id: parse_uuid(&self.user_id, "notification.user_id"),
            kind,
            message: self.message,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at, "notification.created_at"),
        }
    }
}

/// Fixed-width UTC timestamp so that TEXT ordering matches time ordering.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_uuid(raw: &str, column: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", column, raw, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, column: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; treat it as UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", column, raw, e);
            DateTime::default()
        })
}
