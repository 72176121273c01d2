//! # fichaje-chat
//!
//! The conversation engine of the marketplace: message timelines with
//! optimistic send, read receipts, typing indicators, online/last-seen
//! presence, voice notes, and the conversation-list view model.
//!
//! A shell (desktop, mobile, web view) opens a conversation with
//! [`session::spawn_session`] and drives it entirely through
//! [`session::ChatCommand`] / [`session::ChatNotification`]; no state
//! machine in this crate knows anything about rendering.

pub mod bridge;
pub mod counterpart;
pub mod format;
pub mod overview;
pub mod presence;
pub mod session;
pub mod timeline;

pub use counterpart::Counterpart;
pub use overview::{find_or_create_conversation, load_overviews, ConversationOverview};
pub use presence::{online_within_window, PeerPresence, PeerSnapshot, SelfPresence};
pub use session::{spawn_session, ChatCommand, ChatNotification, SessionConfig, SessionError};
pub use timeline::{ReceiveOutcome, Timeline};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the default tracing subscriber for binaries embedding the
/// engine.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("fichaje_chat=debug,fichaje_store=info,fichaje_realtime=info,fichaje_media=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
