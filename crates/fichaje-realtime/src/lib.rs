//! # fichaje-realtime
//!
//! Per-conversation change streams and presence channels.
//!
//! The engine consumes an external realtime service through the
//! [`RealtimeHub`] seam: one message-change subscription and one presence
//! channel per open conversation. [`ChannelMultiplexer`] owns that pair
//! and guarantees at most one live pair per client. [`LocalHub`] is the
//! in-process implementation used by tests and loopback runs.

pub mod events;
pub mod hub;
pub mod multiplexer;

pub use events::{MessageChange, PresenceEvent, PresenceState};
pub use hub::{LocalHub, PresenceChannel, PresencePublisher, RealtimeError, RealtimeHub};
pub use multiplexer::{ChannelMultiplexer, ChannelPair};
