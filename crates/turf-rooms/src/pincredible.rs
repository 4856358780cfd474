//! Pincredible: periodically pins the most engaging message of a room.
//!
//! Every `pin_interval` at most, the top-level message with the highest
//! engagement score is pinned for `pin_duration` and its author is notified.
//! Scheduling a new unpin cancels the previous one, so a room is pinned for
//! exactly one window after its latest pin.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use turf_types::models::{Message, NewNotification, NotificationKind};

use crate::store::RoomStore;

pub const PIN_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const PIN_DURATION: Duration = Duration::from_secs(30);

/// `replies*2 + reactions + upvotes*2`.
pub fn engagement_score(message: &Message) -> usize {
    message.replies.len() * 2 + message.reactions.len() + message.upvotes() * 2
}

/// Highest-scoring top-level message. Ties go to the earliest in list order.
/// `None` when the list is empty or every score is zero.
pub fn top_message(messages: &[Message]) -> Option<(&Message, usize)> {
    let mut best: Option<(&Message, usize)> = None;
    for message in messages.iter().filter(|m| !m.is_reply()) {
        let score = engagement_score(message);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((message, score)),
        }
    }
    best.filter(|(_, score)| *score > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPhase {
    Idle,
    Scoring,
    Pinned,
}

#[derive(Default)]
struct PinState {
    last_pin: Option<Instant>,
    scoring: bool,
    pinned_until: Option<Instant>,
    pending_unpin: Option<AbortHandle>,
}

pub struct Pincredible {
    topic_id: Uuid,
    store: Arc<dyn RoomStore>,
    pin_interval: Duration,
    pin_duration: Duration,
    state: Mutex<PinState>,
}

impl Pincredible {
    pub fn new(topic_id: Uuid, store: Arc<dyn RoomStore>) -> Self {
        Self::with_timing(topic_id, store, PIN_INTERVAL, PIN_DURATION)
    }

    pub fn with_timing(
        topic_id: Uuid,
        store: Arc<dyn RoomStore>,
        pin_interval: Duration,
        pin_duration: Duration,
    ) -> Self {
        Self {
            topic_id,
            store,
            pin_interval,
            pin_duration,
            state: Mutex::new(PinState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, PinState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> PinPhase {
        let state = self.state();
        if state.scoring {
            PinPhase::Scoring
        } else if state.pinned_until.is_some_and(|until| Instant::now() < until) {
            PinPhase::Pinned
        } else {
            PinPhase::Idle
        }
    }

    /// Score `messages` and pin the winner, unless a pin already happened in
    /// the current interval. Returns the pinned message id when a pin was
    /// written.
    pub async fn check_and_pin(&self, messages: &[Message]) -> Option<Uuid> {
        let now = Instant::now();
        let (message_id, author_id, score) = {
            let mut state = self.state();
            if state.scoring {
                return None;
            }
            if let Some(last) = state.last_pin {
                if now.saturating_duration_since(last) < self.pin_interval {
                    return None;
                }
            }
            let Some((winner, score)) = top_message(messages) else {
                debug!("Topic {}: nothing worth pinning yet", self.topic_id);
                return None;
            };
            state.last_pin = Some(now);
            state.scoring = true;
            (winner.id, winner.author_id, score)
        };

        info!(
            "Pincredible: pinning {} in topic {} (score {})",
            message_id, self.topic_id, score
        );
        let pinned = self.pin(message_id, author_id, score).await;
        self.state().scoring = false;

        if pinned {
            self.schedule_unpin();
            Some(message_id)
        } else {
            None
        }
    }

    async fn pin(&self, message_id: Uuid, author_id: Uuid, score: usize) -> bool {
        if let Err(e) = self.store.unpin_room(self.topic_id).await {
            error!("Pincredible: unpin of topic {} failed: {}", self.topic_id, e);
            return false;
        }
        if let Err(e) = self.store.pin_message(self.topic_id, message_id).await {
            error!("Pincredible: pin of {} failed: {}", message_id, e);
            return false;
        }
        let note = NewNotification {
            user_id: author_id,
            kind: NotificationKind::Pin,
            message: format!(
                "📌 Pincredible pinned your message! It earned {} engagement points.",
                score
            ),
        };
        if let Err(e) = self.store.notify(note).await {
            error!("Pincredible: pin notification to {} failed: {}", author_id, e);
        }
        true
    }

    fn schedule_unpin(&self) {
        let store = self.store.clone();
        let topic_id = self.topic_id;
        let delay = self.pin_duration;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.unpin_room(topic_id).await {
                Ok(()) => info!("Pincredible: unpinned topic {}", topic_id),
                Err(e) => error!("Pincredible: unpin of topic {} failed: {}", topic_id, e),
            }
        });

        let mut state = self.state();
        if let Some(previous) = state.pending_unpin.replace(task.abort_handle()) {
            previous.abort();
        }
        state.pinned_until = Some(Instant::now() + delay);
    }
}
