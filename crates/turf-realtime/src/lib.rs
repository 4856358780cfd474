//! Change feed and the store that feeds it.
//!
//! Writes go through [`Store`], which persists them and then publishes a
//! [`turf_types::events::ChangeEvent`] on the [`ChangeFeed`]. Consumers open
//! scoped receivers or callback channels on the feed; delivery is
//! at-least-once in publish order with no deduplication.

pub mod feed;
pub mod store;

pub use feed::{Channel, ChannelBuilder, ChangeFeed, FeedFilter, ScopedReceiver};
pub use store::{ReactionToggle, Store};
