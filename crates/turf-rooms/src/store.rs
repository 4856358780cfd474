use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use turf_realtime::Store;
use turf_types::models::{Message, MessageRecord, NewMessage, NewNotification};

/// The writes and reads a room needs from the backing store. Mutations made
/// through it come back to the room as change-feed events.
#[async_trait]
pub trait RoomStore: Send + Sync + 'static {
    async fn load_messages(&self, topic_id: Uuid) -> Result<Vec<Message>>;

    async fn get_message(&self, message_id: Uuid) -> Result<Option<MessageRecord>>;

    async fn insert_message(&self, new: NewMessage) -> Result<MessageRecord>;

    async fn pin_message(&self, topic_id: Uuid, message_id: Uuid) -> Result<()>;

    /// Clear every pinned flag in the topic, whichever message holds it.
    async fn unpin_room(&self, topic_id: Uuid) -> Result<()>;

    async fn notify(&self, new: NewNotification) -> Result<()>;
}

#[async_trait]
impl RoomStore for Store {
    async fn load_messages(&self, topic_id: Uuid) -> Result<Vec<Message>> {
        Store::load_messages(self, topic_id).await
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<MessageRecord>> {
        Store::get_message(self, message_id).await
    }

    async fn insert_message(&self, new: NewMessage) -> Result<MessageRecord> {
        Store::insert_message(self, new).await
    }

    async fn pin_message(&self, topic_id: Uuid, message_id: Uuid) -> Result<()> {
        Store::pin_message(self, topic_id, message_id).await?;
        Ok(())
    }

    async fn unpin_room(&self, topic_id: Uuid) -> Result<()> {
        self.unpin_topic(topic_id).await?;
        Ok(())
    }

    async fn notify(&self, new: NewNotification) -> Result<()> {
        self.create_notification(new).await?;
        Ok(())
    }
}
