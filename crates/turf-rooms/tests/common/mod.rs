#![allow(dead_code)]

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use turf_rooms::RoomStore;
use turf_types::models::{
    Message, MessageRecord, NewMessage, NewNotification, NotificationKind, Reaction,
};

/// Side effects a room service asked the store for, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Insert {
        topic_id: Uuid,
        author_id: Uuid,
        is_moderator: bool,
    },
    Pin {
        topic_id: Uuid,
        message_id: Uuid,
    },
    Unpin(Uuid),
    Notify {
        user_id: Uuid,
        kind: NotificationKind,
    },
}

/// In-memory store that records every call instead of persisting it.
#[derive(Default)]
pub struct RecordingStore {
    pub messages: Mutex<Vec<Message>>,
    pub calls: Mutex<Vec<Call>>,
    pub fail_pins: Mutex<bool>,
}

impl RecordingStore {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn pins(&self) -> usize {
        self.count(|c| matches!(c, Call::Pin { .. }))
    }

    pub fn unpins(&self) -> usize {
        self.count(|c| matches!(c, Call::Unpin(_)))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RoomStore for RecordingStore {
    async fn load_messages(&self, topic_id: Uuid) -> Result<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages.iter().filter(|m| m.topic_id == topic_id).cloned().collect())
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<MessageRecord>> {
        let messages = self.messages.lock().unwrap();
        let found = messages
            .iter()
            .flat_map(|m| std::iter::once(m).chain(m.replies.iter()))
            .find(|m| m.id == message_id)
            .map(record_of);
        Ok(found)
    }

    async fn insert_message(&self, new: NewMessage) -> Result<MessageRecord> {
        self.record(Call::Insert {
            topic_id: new.topic_id,
            author_id: new.author_id,
            is_moderator: new.is_moderator,
        });
        let now = Utc::now();
        Ok(MessageRecord {
            id: Uuid::new_v4(),
            topic_id: new.topic_id,
            author_id: new.author_id,
            author_username: "someone".into(),
            content: new.content,
            parent_id: new.parent_id,
            is_pinned: false,
            is_moderator: new.is_moderator,
            created_at: now,
            updated_at: now,
        })
    }

    async fn pin_message(&self, topic_id: Uuid, message_id: Uuid) -> Result<()> {
        if *self.fail_pins.lock().unwrap() {
            return Err(anyhow!("database is locked"));
        }
        self.record(Call::Pin {
            topic_id,
            message_id,
        });
        Ok(())
    }

    async fn unpin_room(&self, topic_id: Uuid) -> Result<()> {
        self.record(Call::Unpin(topic_id));
        Ok(())
    }

    async fn notify(&self, new: NewNotification) -> Result<()> {
        self.record(Call::Notify {
            user_id: new.user_id,
            kind: new.kind,
        });
        Ok(())
    }
}

pub fn record_of(m: &Message) -> MessageRecord {
    MessageRecord {
        id: m.id,
        topic_id: m.topic_id,
        author_id: m.author_id,
        author_username: m.author_username.clone(),
        content: m.content.clone(),
        parent_id: m.parent_id,
        is_pinned: m.is_pinned,
        is_moderator: m.is_moderator,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

pub fn record(topic_id: Uuid, author_id: Uuid, parent_id: Option<Uuid>) -> MessageRecord {
    let now = Utc::now();
    MessageRecord {
        id: Uuid::new_v4(),
        topic_id,
        author_id,
        author_username: "alice".into(),
        content: "a take".into(),
        parent_id,
        is_pinned: false,
        is_moderator: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn message(topic_id: Uuid, author_id: Uuid) -> Message {
    Message::from(record(topic_id, author_id, None))
}

pub fn reaction(message: &Message, kind: &str) -> Reaction {
    Reaction {
        id: Uuid::new_v4(),
        message_id: message.id,
        topic_id: message.topic_id,
        user_id: Uuid::new_v4(),
        kind: kind.into(),
        created_at: Utc::now(),
    }
}

/// A root message carrying `upvotes` upvote reactions.
pub fn upvoted(topic_id: Uuid, author_id: Uuid, upvotes: usize) -> Message {
    let mut m = message(topic_id, author_id);
    for _ in 0..upvotes {
        let r = reaction(&m, "upvote");
        m.reactions.push(r);
    }
    m
}
