use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use turf_types::events::{ChangeEvent, ChangeKind, Row};
use turf_types::models::{Message, MessageRecord, NewMessage, Reaction};

use crate::error::RoomError;
use crate::store::RoomStore;
use crate::thread::{InsertOutcome, MessageThread};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Owns the in-memory message list of one room and keeps it in step with the
/// change feed. Nothing else writes to the list; all mutations go to the
/// store and come back as events.
pub struct RoomController {
    topic_id: Uuid,
    store: Arc<dyn RoomStore>,
    thread: MessageThread,
}

impl RoomController {
    pub fn new(topic_id: Uuid, store: Arc<dyn RoomStore>, orphan_ttl: Duration) -> Self {
        Self {
            topic_id,
            store,
            thread: MessageThread::new(orphan_ttl),
        }
    }

    pub fn topic_id(&self) -> Uuid {
        self.topic_id
    }

    pub fn messages(&self) -> &[Message] {
        self.thread.messages()
    }

    pub fn thread(&self) -> &MessageThread {
        &self.thread
    }

    /// Fetch the full thread and replace the local list wholesale.
    pub async fn load_messages(&mut self) -> Result<&[Message]> {
        let messages = self.store.load_messages(self.topic_id).await?;
        info!("Loaded {} messages for topic {}", messages.len(), self.topic_id);
        self.thread.replace(messages);
        Ok(self.thread.messages())
    }

    /// Apply one change-feed event. Returns true if the message list changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if event.topic_id() != Some(self.topic_id) {
            return false;
        }
        match (&event.row, event.kind) {
            (Row::Messages(m), ChangeKind::Insert) => matches!(
                self.apply_insert(m.clone()),
                InsertOutcome::Root | InsertOutcome::Reply
            ),
            (Row::Messages(m), ChangeKind::Update) => self.apply_update(m),
            (Row::Messages(m), ChangeKind::Delete) => self.apply_delete(m.id),
            (Row::Reactions(r), ChangeKind::Insert) => self.apply_reaction_insert(r.clone()),
            (Row::Reactions(r), ChangeKind::Delete) => self.apply_reaction_delete(r),
            (Row::Reactions(_), ChangeKind::Update) => false,
            (Row::Notifications(_), _) => false,
        }
    }

    pub fn apply_insert(&mut self, record: MessageRecord) -> InsertOutcome {
        let id = record.id;
        let outcome = self.thread.insert(record, Instant::now());
        debug!("Insert {} in topic {}: {:?}", id, self.topic_id, outcome);
        outcome
    }

    pub fn apply_update(&mut self, record: &MessageRecord) -> bool {
        self.thread.update(record)
    }

    pub fn apply_delete(&mut self, message_id: Uuid) -> bool {
        self.thread.remove(message_id)
    }

    pub fn apply_reaction_insert(&mut self, reaction: Reaction) -> bool {
        self.thread.add_reaction(reaction)
    }

    pub fn apply_reaction_delete(&mut self, reaction: &Reaction) -> bool {
        self.thread.remove_reaction(reaction)
    }

    pub fn expire_orphans(&mut self) -> usize {
        self.thread.expire_orphans(Instant::now())
    }

    /// Insert a message as `session_user`. The list is not touched here; the
    /// message shows up once the change feed echoes it.
    pub async fn send_message(
        &self,
        session_user: Option<Uuid>,
        text: &str,
        parent_id: Option<Uuid>,
    ) -> Result<Option<MessageRecord>, RoomError> {
        send_message(self.store.as_ref(), self.topic_id, session_user, text, parent_id).await
    }
}

/// Validate and insert a user message. Empty text or a missing session user
/// is a no-op and yields `Ok(None)`.
pub async fn send_message(
    store: &dyn RoomStore,
    topic_id: Uuid,
    session_user: Option<Uuid>,
    text: &str,
    parent_id: Option<Uuid>,
) -> Result<Option<MessageRecord>, RoomError> {
    let content = text.trim();
    let Some(author_id) = session_user else {
        return Ok(None);
    };
    if content.is_empty() {
        return Ok(None);
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(RoomError::TooLong {
            max: MAX_MESSAGE_CHARS,
        });
    }

    if let Some(parent_id) = parent_id {
        let parent = store
            .get_message(parent_id)
            .await?
            .ok_or(RoomError::ParentNotFound(parent_id))?;
        if parent.topic_id != topic_id {
            return Err(RoomError::ParentInOtherTopic(parent_id));
        }
        if parent.parent_id.is_some() {
            return Err(RoomError::NestedReply(parent_id));
        }
    }

    let record = store
        .insert_message(NewMessage {
            topic_id,
            author_id,
            content: content.to_string(),
            parent_id,
            is_moderator: false,
        })
        .await?;
    Ok(Some(record))
}
