use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fichaje_shared::{Message, UserId};

/// Payload tracked on a presence channel. The typing flag lives only
/// here; the persisted presence row never carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    pub online_at: DateTime<Utc>,
    pub typing: bool,
}

impl PresenceState {
    pub fn online(now: DateTime<Utc>) -> Self {
        Self {
            online_at: now,
            typing: false,
        }
    }

    pub fn typing(now: DateTime<Utc>) -> Self {
        Self {
            online_at: now,
            typing: true,
        }
    }
}

/// A change event from the message table, filtered by conversation.
#[derive(Debug, Clone)]
pub enum MessageChange {
    Inserted(Message),
    Updated(Message),
}

/// An event on a conversation's presence channel.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// Full channel state, keyed by user. Sent on subscribe and after
    /// every state change.
    Sync(HashMap<UserId, PresenceState>),
    /// A key started being tracked.
    Join { key: UserId, state: PresenceState },
    /// A key stopped being tracked.
    Leave { key: UserId },
}
