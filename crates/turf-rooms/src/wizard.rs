//! Wizard of Mods: breaks the silence when a room goes quiet.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::seq::IndexedRandom;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use turf_realtime::{Channel, ChangeFeed, FeedFilter};
use turf_types::events::{ChangeEvent, ChangeKind, Row, Table};
use turf_types::models::{
    MODERATOR_ID, Message, NewMessage, NewNotification, NotificationKind,
};

use crate::store::RoomStore;

pub const LULL_THRESHOLD: Duration = Duration::from_secs(20);

/// How many trailing messages are summarised into the prompt context.
pub const CONTEXT_WINDOW: usize = 5;

pub const WIZARD_RESPONSES: &[&str] = &[
    "🧙 The Wizard of Mods senses a disturbance in the debate... Who dares to challenge the last point?",
    "🧙 Silence is golden, but a good counterargument is platinum. Anyone?",
    "🧙 Let me play devil's advocate: what would the strongest opposing view look like?",
    "🧙 Quick poll, wizards and muggles alike: has anyone changed their mind yet?",
    "🧙 A wise debater once said: steelman before you strawman. Care to try?",
    "🧙 What evidence would it take to convince the other side?",
    "🧙 The crystal ball is cloudy. Someone summarise where we have landed so far!",
    "🧙 Hot take incoming: both sides have a point. Prove me wrong.",
];

struct LullState {
    last_message: Instant,
    fired: bool,
}

pub struct LullDetector {
    topic_id: Uuid,
    store: Arc<dyn RoomStore>,
    threshold: Duration,
    moderator_id: Uuid,
    state: Mutex<LullState>,
}

impl LullDetector {
    pub fn new(topic_id: Uuid, store: Arc<dyn RoomStore>) -> Self {
        Self::with_threshold(topic_id, store, LULL_THRESHOLD, MODERATOR_ID)
    }

    pub fn with_threshold(
        topic_id: Uuid,
        store: Arc<dyn RoomStore>,
        threshold: Duration,
        moderator_id: Uuid,
    ) -> Self {
        Self {
            topic_id,
            store,
            threshold,
            moderator_id,
            state: Mutex::new(LullState {
                last_message: Instant::now(),
                fired: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LullState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the lull timer and re-arm the trigger.
    pub fn update_last_message_time(&self) {
        let mut state = self.state();
        state.last_message = Instant::now();
        state.fired = false;
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.state().last_message)
    }

    /// Feed hook: any user message inserted into this room resets the timer.
    pub fn observe(&self, event: &ChangeEvent) {
        if event.kind != ChangeKind::Insert {
            return;
        }
        if let Row::Messages(record) = &event.row {
            if record.topic_id == self.topic_id
                && !record.is_moderator
                && record.author_id != self.moderator_id
            {
                self.update_last_message_time();
            }
        }
    }

    /// Open a channel that feeds this room's message inserts into
    /// [`observe`](Self::observe). Observation stops when the channel drops.
    /// If the channel falls behind, the dropped events may have been user
    /// messages, so the timer is reset.
    pub fn watch(self: &Arc<Self>, feed: &ChangeFeed) -> Channel {
        let detector = Arc::clone(self);
        let lagging = Arc::clone(self);
        feed.channel(FeedFilter::topic(self.topic_id))
            .on(Table::Messages, ChangeKind::Insert, move |event| {
                detector.observe(event)
            })
            .on_lag(move |missed| {
                debug!("Lull watch for topic {} missed {} events", lagging.topic_id, missed);
                lagging.update_last_message_time();
            })
            .subscribe()
    }

    /// Post a moderator message if the room has been quiet for the threshold.
    /// Fires at most once until the next user message. Returns true when the
    /// moderator message was inserted.
    pub async fn check_and_trigger(&self, messages: &[Message]) -> bool {
        if !messages.iter().any(|m| !self.is_moderator(m)) {
            return false;
        }
        {
            let mut state = self.state();
            if state.fired {
                return false;
            }
            let idle = Instant::now().saturating_duration_since(state.last_message);
            if idle < self.threshold {
                return false;
            }
            state.fired = true;
        }

        let context = build_context(messages);
        debug!("Wizard of Mods context for topic {}: {}", self.topic_id, context);

        let response = pick_response();
        info!("Wizard of Mods: breaking the lull in topic {}", self.topic_id);

        let inserted = self
            .store
            .insert_message(NewMessage {
                topic_id: self.topic_id,
                author_id: self.moderator_id,
                content: response.to_string(),
                parent_id: None,
                is_moderator: true,
            })
            .await;
        if let Err(e) = inserted {
            error!("Wizard of Mods: insert into topic {} failed: {}", self.topic_id, e);
            return false;
        }

        for user_id in self.participants(messages) {
            let note = NewNotification {
                user_id,
                kind: NotificationKind::Wizard,
                message: "🧙 The Wizard of Mods has joined the debate!".to_string(),
            };
            if let Err(e) = self.store.notify(note).await {
                error!("Wizard of Mods: notification to {} failed: {}", user_id, e);
            }
        }
        true
    }

    fn is_moderator(&self, message: &Message) -> bool {
        message.is_moderator || message.author_id == self.moderator_id
    }

    /// Distinct non-moderator authors across roots and replies, in first-seen
    /// order.
    fn participants(&self, messages: &[Message]) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        messages
            .iter()
            .flat_map(|m| std::iter::once(m).chain(m.replies.iter()))
            .filter(|m| !self.is_moderator(m))
            .filter_map(|m| seen.insert(m.author_id).then_some(m.author_id))
            .collect()
    }
}

fn build_context(messages: &[Message]) -> String {
    let start = messages.len().saturating_sub(CONTEXT_WINDOW);
    messages[start..]
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn pick_response() -> &'static str {
    WIZARD_RESPONSES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(WIZARD_RESPONSES[0])
}
