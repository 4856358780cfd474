use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use turf_realtime::ChangeFeed;
use turf_types::models::MODERATOR_ID;

use crate::pincredible::{PIN_DURATION, PIN_INTERVAL, PinPhase};
use crate::room::Room;
use crate::store::RoomStore;
use crate::wizard::LULL_THRESHOLD;

pub const ROOM_TICK: Duration = Duration::from_secs(5);
pub const ORPHAN_TTL: Duration = Duration::from_secs(60);

/// Timing knobs shared by every room the registry opens.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub pin_interval: Duration,
    pub pin_duration: Duration,
    pub lull_threshold: Duration,
    pub tick_interval: Duration,
    pub orphan_ttl: Duration,
    pub moderator_id: Uuid,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            pin_interval: PIN_INTERVAL,
            pin_duration: PIN_DURATION,
            lull_threshold: LULL_THRESHOLD,
            tick_interval: ROOM_TICK,
            orphan_ttl: ORPHAN_TTL,
            moderator_id: MODERATOR_ID,
        }
    }
}

/// Lazily opens one [`Room`] per topic and closes it when the last
/// [`RoomLease`] for that topic is dropped.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    store: Arc<dyn RoomStore>,
    feed: ChangeFeed,
    config: RoomConfig,
    rooms: Mutex<HashMap<Uuid, RoomEntry>>,
}

struct RoomEntry {
    leases: usize,
    room: Room,
}

impl RegistryInner {
    fn rooms(&self) -> MutexGuard<'_, HashMap<Uuid, RoomEntry>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn RoomStore>, feed: ChangeFeed, config: RoomConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                feed,
                config,
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.inner.config
    }

    /// Hold `topic_id` open. The first lease starts the room.
    pub fn acquire(&self, topic_id: Uuid) -> RoomLease {
        let mut rooms = self.inner.rooms();
        let entry = rooms.entry(topic_id).or_insert_with(|| RoomEntry {
            leases: 0,
            room: Room::spawn(
                topic_id,
                self.inner.store.clone(),
                &self.inner.feed,
                &self.inner.config,
            ),
        });
        entry.leases += 1;
        debug!("Room {} leased ({} holders)", topic_id, entry.leases);

        RoomLease {
            registry: self.inner.clone(),
            topic_id,
        }
    }

    pub fn is_active(&self, topic_id: Uuid) -> bool {
        self.inner.rooms().contains_key(&topic_id)
    }

    pub fn active_rooms(&self) -> Vec<Uuid> {
        self.inner.rooms().keys().copied().collect()
    }

    pub fn pin_phase(&self, topic_id: Uuid) -> Option<PinPhase> {
        self.inner.rooms().get(&topic_id).map(|e| e.room.pin_phase())
    }
}

/// Keeps a room open while held.
pub struct RoomLease {
    registry: Arc<RegistryInner>,
    topic_id: Uuid,
}

impl RoomLease {
    pub fn topic_id(&self) -> Uuid {
        self.topic_id
    }
}

impl Drop for RoomLease {
    fn drop(&mut self) {
        let closed = {
            let mut rooms = self.registry.rooms();
            match rooms.get_mut(&self.topic_id) {
                Some(entry) if entry.leases > 1 => {
                    entry.leases -= 1;
                    None
                }
                Some(_) => rooms.remove(&self.topic_id),
                None => None,
            }
        };
        // Room teardown happens outside the lock
        drop(closed);
    }
}
