//! Per-room engagement: the room controller that mirrors a topic's thread
//! from the change feed, and the two services that act on it (Pincredible
//! and the Wizard of Mods). Rooms are opened and closed through
//! [`RoomRegistry`].

pub mod controller;
pub mod error;
pub mod pincredible;
pub mod registry;
pub mod room;
pub mod store;
pub mod thread;
pub mod wizard;

pub use controller::{MAX_MESSAGE_CHARS, RoomController, send_message};
pub use error::RoomError;
pub use pincredible::{PinPhase, Pincredible, engagement_score, top_message};
pub use registry::{RoomConfig, RoomLease, RoomRegistry};
pub use room::Room;
pub use store::RoomStore;
pub use thread::{InsertOutcome, MessageThread};
pub use wizard::LullDetector;
