use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use turf_types::events::{ChangeEvent, ChangeKind, Table};

const DEFAULT_CAPACITY: usize = 1024;

/// Which events a subscriber wants: message and reaction events for a set of
/// topics, and notification events for one recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilter {
    pub topics: HashSet<Uuid>,
    pub recipient: Option<Uuid>,
}

impl FeedFilter {
    pub fn topic(topic_id: Uuid) -> Self {
        Self {
            topics: HashSet::from([topic_id]),
            recipient: None,
        }
    }

    pub fn notifications_for(user_id: Uuid) -> Self {
        Self {
            topics: HashSet::new(),
            recipient: Some(user_id),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(topic_id) = event.topic_id() {
            return self.topics.contains(&topic_id);
        }
        match (event.recipient_id(), self.recipient) {
            (Some(to), Some(me)) => to == me,
            _ => false,
        }
    }
}

/// In-process change feed. Every store mutation is published here and fanned
/// out to all subscribers in publish order.
#[derive(Clone)]
pub struct ChangeFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(FeedInner { tx }),
        }
    }

    pub fn publish(&self, event: ChangeEvent) {
        debug!(table = ?event.table(), kind = ?event.kind, "change feed publish");
        // No receivers is fine: nobody is watching that room right now
        let _ = self.inner.tx.send(event);
    }

    /// Unfiltered receiver. Callers that keep their filter in shared state
    /// (the gateway) check `FeedFilter::matches` themselves.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.tx.subscribe()
    }

    pub fn subscribe(&self, filter: FeedFilter) -> ScopedReceiver {
        ScopedReceiver {
            rx: self.inner.tx.subscribe(),
            filter,
        }
    }

    /// Start building a callback channel for `filter`.
    pub fn channel(&self, filter: FeedFilter) -> ChannelBuilder {
        ChannelBuilder {
            feed: self.clone(),
            filter,
            handlers: HashMap::new(),
            lag_handlers: Vec::new(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

/// Receiver that only yields events matching its filter.
pub struct ScopedReceiver {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: FeedFilter,
}

impl ScopedReceiver {
    /// Next matching event. `RecvError::Lagged` means events were dropped
    /// and anything built from this receiver must be reloaded from the store.
    /// `RecvError::Closed` means the feed is gone.
    pub async fn recv(&mut self) -> Result<ChangeEvent, RecvError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!("Change feed receiver lagged by {} events", n);
                    return Err(RecvError::Lagged(n));
                }
                Err(RecvError::Closed) => return Err(RecvError::Closed),
            }
        }
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }
}

type Handler = Box<dyn FnMut(&ChangeEvent) + Send + 'static>;
type LagHandler = Box<dyn FnMut(u64) + Send + 'static>;

pub struct ChannelBuilder {
    feed: ChangeFeed,
    filter: FeedFilter,
    handlers: HashMap<(Table, ChangeKind), Vec<Handler>>,
    lag_handlers: Vec<LagHandler>,
}

impl ChannelBuilder {
    /// Register a callback for one (table, event type) pair.
    pub fn on<F>(mut self, table: Table, kind: ChangeKind, handler: F) -> Self
    where
        F: FnMut(&ChangeEvent) + Send + 'static,
    {
        self.handlers
            .entry((table, kind))
            .or_default()
            .push(Box::new(handler));
        self
    }

    /// Register a callback for when the channel falls behind and drops
    /// events. It receives the number of events missed.
    pub fn on_lag<F>(mut self, handler: F) -> Self
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.lag_handlers.push(Box::new(handler));
        self
    }

    /// Open the channel. Events are delivered on a spawned task until the
    /// returned handle is dropped.
    pub fn subscribe(self) -> Channel {
        let mut rx = self.feed.subscribe(self.filter);
        let mut handlers = self.handlers;
        let mut lag_handlers = self.lag_handlers;

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(list) = handlers.get_mut(&(event.table(), event.kind)) {
                            for handler in list.iter_mut() {
                                handler(&event);
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        for handler in lag_handlers.iter_mut() {
                            handler(n);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Channel { task }
    }
}

/// A live callback subscription. Dropping it tears the subscription down.
pub struct Channel {
    task: JoinHandle<()>,
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turf_types::events::Row;
    use turf_types::models::{MessageRecord, Notification, NotificationKind};

    fn message_event(topic_id: Uuid) -> ChangeEvent {
        let now = chrono::Utc::now();
        ChangeEvent::insert(Row::Messages(MessageRecord {
            id: Uuid::new_v4(),
            topic_id,
            author_id: Uuid::new_v4(),
            author_username: "alice".into(),
            content: "hi".into(),
            parent_id: None,
            is_pinned: false,
            is_moderator: false,
            created_at: now,
            updated_at: now,
        }))
    }

    fn notification_event(user_id: Uuid) -> ChangeEvent {
        ChangeEvent::insert(Row::Notifications(Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::General,
            message: "hello".into(),
            is_read: false,
            created_at: chrono::Utc::now(),
        }))
    }

    #[test]
    fn filter_scopes_by_topic_and_recipient() {
        let room = Uuid::new_v4();
        let me = Uuid::new_v4();
        let mut filter = FeedFilter::topic(room);
        filter.recipient = Some(me);

        assert!(filter.matches(&message_event(room)));
        assert!(!filter.matches(&message_event(Uuid::new_v4())));
        assert!(filter.matches(&notification_event(me)));
        assert!(!filter.matches(&notification_event(Uuid::new_v4())));
        assert!(!FeedFilter::topic(room).matches(&notification_event(me)));
    }

    #[tokio::test]
    async fn scoped_receiver_skips_other_rooms() {
        let feed = ChangeFeed::new();
        let room = Uuid::new_v4();
        let mut rx = feed.subscribe(FeedFilter::topic(room));

        feed.publish(message_event(Uuid::new_v4()));
        let wanted = message_event(room);
        feed.publish(wanted.clone());

        assert_eq!(rx.recv().await.unwrap(), wanted);
    }

    #[tokio::test]
    async fn scoped_receiver_reports_lag() {
        let feed = ChangeFeed::with_capacity(2);
        let room = Uuid::new_v4();
        let mut rx = feed.subscribe(FeedFilter::topic(room));

        for _ in 0..5 {
            feed.publish(message_event(room));
        }
        let last = message_event(room);
        feed.publish(last.clone());

        assert_eq!(rx.recv().await, Err(RecvError::Lagged(4)));
        // Delivery resumes at the oldest event still buffered
        assert!(rx.recv().await.is_ok());
        assert_eq!(rx.recv().await.unwrap(), last);
    }

    #[tokio::test]
    async fn channel_runs_lag_handlers() {
        let feed = ChangeFeed::with_capacity(1);
        let room = Uuid::new_v4();
        let (tx, mut lagged) = tokio::sync::mpsc::unbounded_channel();
        let _channel = feed
            .channel(FeedFilter::topic(room))
            .on_lag(move |n| {
                let _ = tx.send(n);
            })
            .subscribe();

        for _ in 0..3 {
            feed.publish(message_event(room));
        }

        let missed = tokio::time::timeout(std::time::Duration::from_secs(1), lagged.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(missed, 2);
    }
}
