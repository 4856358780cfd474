use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use turf_realtime::{Channel, ChangeFeed, FeedFilter, ScopedReceiver};

use crate::controller::RoomController;
use crate::pincredible::{PinPhase, Pincredible};
use crate::registry::RoomConfig;
use crate::store::RoomStore;
use crate::wizard::LullDetector;

/// One live room: the controller task plus the services hanging off it.
/// Dropping a `Room` stops its task and closes its feed subscriptions.
pub struct Room {
    topic_id: Uuid,
    pincredible: Arc<Pincredible>,
    task: JoinHandle<()>,
    _lull_watch: Channel,
}

impl Room {
    pub fn spawn(
        topic_id: Uuid,
        store: Arc<dyn RoomStore>,
        feed: &ChangeFeed,
        config: &RoomConfig,
    ) -> Self {
        let pincredible = Arc::new(Pincredible::with_timing(
            topic_id,
            store.clone(),
            config.pin_interval,
            config.pin_duration,
        ));
        let detector = Arc::new(LullDetector::with_threshold(
            topic_id,
            store.clone(),
            config.lull_threshold,
            config.moderator_id,
        ));
        let lull_watch = detector.watch(feed);

        // Subscribe before the initial load; the thread ignores duplicates
        let events = feed.subscribe(FeedFilter::topic(topic_id));
        let controller = RoomController::new(topic_id, store, config.orphan_ttl);

        let task = tokio::spawn(run_room(
            controller,
            events,
            pincredible.clone(),
            detector,
            config.tick_interval,
        ));

        info!("Room {} opened", topic_id);
        Self {
            topic_id,
            pincredible,
            task,
            _lull_watch: lull_watch,
        }
    }

    pub fn topic_id(&self) -> Uuid {
        self.topic_id
    }

    pub fn pin_phase(&self) -> PinPhase {
        self.pincredible.phase()
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.task.abort();
        info!("Room {} closed", self.topic_id);
    }
}

async fn run_room(
    mut controller: RoomController,
    mut events: ScopedReceiver,
    pincredible: Arc<Pincredible>,
    detector: Arc<LullDetector>,
    tick_interval: std::time::Duration,
) {
    let topic_id = controller.topic_id();
    if let Err(e) = controller.load_messages().await {
        error!("Room {}: initial load failed: {}", topic_id, e);
    }

    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if controller.apply(&event) {
                        pincredible.check_and_pin(controller.messages()).await;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    // Missed events could be anything; rebuild from the store
                    warn!("Room {}: missed {} feed events, reloading", topic_id, n);
                    detector.update_last_message_time();
                    match controller.load_messages().await {
                        Ok(messages) => {
                            pincredible.check_and_pin(messages).await;
                        }
                        Err(e) => error!("Room {}: reload failed: {}", topic_id, e),
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("Room {}: change feed closed", topic_id);
                    break;
                }
            },
            _ = ticker.tick() => {
                controller.expire_orphans();
                pincredible.check_and_pin(controller.messages()).await;
                detector.check_and_trigger(controller.messages()).await;
            }
        }
    }
}
