//! Room and message operations exposed to the API layer.
//!
//! Every operation resolves the acting identity once, up front, and shapes
//! its result through the same [`Hydrator`](crate::hydrate::Hydrator)
//! whether the data came from storage or from the live feed.

mod live;
mod msg;
mod new;
mod room;

pub use live::LiveFeed;
pub use msg::Sent;
pub use new::NewRoom;

use uuid::Uuid;

/// Broker topic carrying a room's messages.
pub fn room_topic(room_id: Uuid) -> String {
    room_id.to_string()
}
