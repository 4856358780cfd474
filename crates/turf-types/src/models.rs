use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reaction kind that counts as an upvote when scoring engagement.
pub const UPVOTE_KIND: &str = "upvote";

/// Reserved profile that authors Wizard of Mods messages.
pub const MODERATOR_ID: Uuid = Uuid::from_u128(0xff);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A debate room. Only topics flagged `is_active` are listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Flat message row, as carried by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub is_pinned: bool,
    pub is_moderator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message with its reactions and (for root messages) one level of replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub is_pinned: bool,
    pub is_moderator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reactions: Vec<Reaction>,
    pub replies: Vec<Message>,
}

impl Message {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Overwrite the mutable columns from a fresher row, keeping the
    /// attached reactions and replies.
    pub fn merge(&mut self, record: &MessageRecord) {
        self.content = record.content.clone();
        self.is_pinned = record.is_pinned;
        self.is_moderator = record.is_moderator;
        self.author_username = record.author_username.clone();
        self.updated_at = record.updated_at;
    }

    pub fn upvotes(&self) -> usize {
        self.reactions.iter().filter(|r| r.kind == UPVOTE_KIND).count()
    }
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            topic_id: record.topic_id,
            author_id: record.author_id,
            author_username: record.author_username,
            content: record.content,
            parent_id: record.parent_id,
            is_pinned: record.is_pinned,
            is_moderator: record.is_moderator,
            created_at: record.created_at,
            updated_at: record.updated_at,
            reactions: Vec::new(),
            replies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub topic_id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Pin,
    GeniusAward,
    HarmonyPoints,
    Wizard,
    General,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pin => "pin",
            Self::GeniusAward => "genius_award",
            Self::HarmonyPoints => "harmony_points",
            Self::Wizard => "wizard",
            Self::General => "general",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pin" => Ok(Self::Pin),
            "genius_award" => Ok(Self::GeniusAward),
            "harmony_points" => Ok(Self::HarmonyPoints),
            "wizard" => Ok(Self::Wizard),
            "general" => Ok(Self::General),
            other => Err(format!("unknown notification kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// -- Write requests --

/// A message about to be inserted. Id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub topic_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub is_moderator: bool,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
}
