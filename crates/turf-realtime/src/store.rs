use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::error;
use uuid::Uuid;

use turf_db::Database;
use turf_types::events::{ChangeEvent, Row};
use turf_types::models::{
    Message, MessageRecord, NewMessage, NewNotification, Notification, Reaction, Topic,
};

use crate::feed::ChangeFeed;

/// Async facade over the database. Every successful write is echoed onto the
/// change feed, the same way the hosted backend's replication stream would.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    feed: ChangeFeed,
}

/// Outcome of toggling a reaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionToggle {
    Added(Reaction),
    Removed(Reaction),
}

impl Store {
    pub fn new(db: Arc<Database>, feed: ChangeFeed) -> Self {
        Self { db, feed }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run blocking DB work off the async runtime
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow!("spawn_blocking join error: {}", e)
            })?
    }

    // -- Topics --

    pub async fn active_topics(&self) -> Result<Vec<Topic>> {
        self.blocking(|db| db.active_topics()).await
    }

    pub async fn get_topic(&self, topic_id: Uuid) -> Result<Option<Topic>> {
        self.blocking(move |db| db.get_topic(&topic_id.to_string())).await
    }

    // -- Messages --

    pub async fn load_messages(&self, topic_id: Uuid) -> Result<Vec<Message>> {
        self.blocking(move |db| db.load_thread(&topic_id.to_string())).await
    }

    pub async fn get_message(&self, message_id: Uuid) -> Result<Option<MessageRecord>> {
        self.blocking(move |db| db.get_message(&message_id.to_string())).await
    }

    pub async fn insert_message(&self, new: NewMessage) -> Result<MessageRecord> {
        let record = self.blocking(move |db| db.insert_message(&new)).await?;
        self.feed
            .publish(ChangeEvent::insert(Row::Messages(record.clone())));
        Ok(record)
    }

    /// Delete a message with its replies. Returns the removed rows, replies first.
    pub async fn delete_message(&self, message_id: Uuid) -> Result<Vec<MessageRecord>> {
        let removed = self
            .blocking(move |db| db.delete_message(&message_id.to_string()))
            .await?;
        for record in &removed {
            self.feed
                .publish(ChangeEvent::delete(Row::Messages(record.clone())));
        }
        Ok(removed)
    }

    pub async fn pin_message(&self, topic_id: Uuid, message_id: Uuid) -> Result<Vec<MessageRecord>> {
        let changed = self
            .blocking(move |db| db.pin_message(&topic_id.to_string(), &message_id.to_string()))
            .await?;
        self.publish_updates(&changed);
        Ok(changed)
    }

    pub async fn unpin_topic(&self, topic_id: Uuid) -> Result<Vec<MessageRecord>> {
        let changed = self
            .blocking(move |db| db.unpin_topic(&topic_id.to_string()))
            .await?;
        self.publish_updates(&changed);
        Ok(changed)
    }

    fn publish_updates(&self, records: &[MessageRecord]) {
        for record in records {
            self.feed
                .publish(ChangeEvent::update(Row::Messages(record.clone())));
        }
    }

    // -- Reactions --

    /// Returns `None` when the message does not exist.
    pub async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        kind: String,
    ) -> Result<Option<ReactionToggle>> {
        let toggled = self
            .blocking(move |db| {
                db.toggle_reaction(&message_id.to_string(), &user_id.to_string(), &kind)
            })
            .await?;

        Ok(toggled.map(|(added, reaction)| {
            if added {
                self.feed
                    .publish(ChangeEvent::insert(Row::Reactions(reaction.clone())));
                ReactionToggle::Added(reaction)
            } else {
                self.feed
                    .publish(ChangeEvent::delete(Row::Reactions(reaction.clone())));
                ReactionToggle::Removed(reaction)
            }
        }))
    }

    // -- Notifications --

    pub async fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        let note = self.blocking(move |db| db.insert_notification(&new)).await?;
        self.feed
            .publish(ChangeEvent::insert(Row::Notifications(note.clone())));
        Ok(note)
    }

    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        self.blocking(move |db| db.list_notifications(&user_id.to_string(), unread_only, limit))
            .await
    }

    /// `None` if the user has no such notification.
    pub async fn mark_notification_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Option<Notification>> {
        let marked = self
            .blocking(move |db| {
                db.mark_notification_read(&user_id.to_string(), &notification_id.to_string())
            })
            .await?;

        Ok(marked.map(|(note, changed)| {
            if changed {
                self.feed
                    .publish(ChangeEvent::update(Row::Notifications(note.clone())));
            }
            note
        }))
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        let flipped = self
            .blocking(move |db| db.mark_all_notifications_read(&user_id.to_string()))
            .await?;
        let count = flipped.len();
        for note in flipped {
            self.feed
                .publish(ChangeEvent::update(Row::Notifications(note)));
        }
        Ok(count)
    }
}
