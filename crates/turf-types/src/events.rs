use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageRecord, Notification, Reaction};

/// Tables whose row changes are published on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Messages,
    Reactions,
    Notifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The row a change event refers to. For deletes this is the row as it was
/// just before removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum Row {
    Messages(MessageRecord),
    Reactions(Reaction),
    Notifications(Notification),
}

/// A row-level mutation published by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: Row,
}

impl ChangeEvent {
    pub fn insert(row: Row) -> Self {
        Self { kind: ChangeKind::Insert, row }
    }

    pub fn update(row: Row) -> Self {
        Self { kind: ChangeKind::Update, row }
    }

    pub fn delete(row: Row) -> Self {
        Self { kind: ChangeKind::Delete, row }
    }

    pub fn table(&self) -> Table {
        match self.row {
            Row::Messages(_) => Table::Messages,
            Row::Reactions(_) => Table::Reactions,
            Row::Notifications(_) => Table::Notifications,
        }
    }

    /// Topic the event is scoped to. Notifications are recipient-scoped and
    /// return `None`.
    pub fn topic_id(&self) -> Option<Uuid> {
        match &self.row {
            Row::Messages(m) => Some(m.topic_id),
            Row::Reactions(r) => Some(r.topic_id),
            Row::Notifications(_) => None,
        }
    }

    /// Recipient of a notification event.
    pub fn recipient_id(&self) -> Option<Uuid> {
        match &self.row {
            Row::Notifications(n) => Some(n.user_id),
            _ => None,
        }
    }
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// Server acknowledges the current topic subscription set
    Subscribed { topic_ids: Vec<Uuid> },

    /// A row changed in one of the subscribed topics, or a notification for this user
    Change(ChangeEvent),

    /// The server dropped `missed` events for this connection. The client
    /// should refetch messages and notifications.
    Resync { missed: u64 },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of topics this connection receives events for.
    Subscribe { topic_ids: Vec<Uuid> },
}
