//! Presence tracking for one conversation view.
//!
//! Two machines: [`SelfPresence`] decides what the session publishes
//! (channel lifecycle, typing flag, idle timeout) and [`PeerPresence`]
//! folds the peer's join/leave/sync events into a single online/typing
//! snapshot. Both are pure; the session loop owns the timers.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use fichaje_realtime::{PresenceEvent, PresenceState};
use fichaje_shared::constants::PRESENCE_FRESHNESS_MINS;
use fichaje_shared::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Unjoined,
    Joining,
    Joined,
    Leaving,
}

/// The caller's own side of the presence channel.
pub struct SelfPresence {
    phase: ChannelPhase,
    typing: bool,
    idle_deadline: Option<Instant>,
}

impl SelfPresence {
    pub fn new() -> Self {
        Self {
            phase: ChannelPhase::Unjoined,
            typing: false,
            idle_deadline: None,
        }
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn joining(&mut self) {
        if self.phase == ChannelPhase::Unjoined {
            self.phase = ChannelPhase::Joining;
        }
    }

    /// Subscription confirmed; returns the initial payload to track.
    pub fn joined(&mut self, now: DateTime<Utc>) -> PresenceState {
        self.phase = ChannelPhase::Joined;
        self.typing = false;
        PresenceState::online(now)
    }

    /// A keystroke landed in the input. Every keystroke re-arms the idle
    /// deadline; a non-empty input also publishes `typing = true`.
    pub fn on_keystroke(
        &mut self,
        now: DateTime<Utc>,
        deadline: Instant,
        nonempty: bool,
    ) -> Option<PresenceState> {
        if self.phase != ChannelPhase::Joined {
            return None;
        }
        self.idle_deadline = Some(deadline);
        if nonempty {
            self.typing = true;
            Some(PresenceState::typing(now))
        } else {
            None
        }
    }

    /// Deadline the session sleeps on, armed by the last keystroke.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    /// The idle window elapsed: clear the typing flag and publish it.
    pub fn on_idle(&mut self, now: DateTime<Utc>) -> Option<PresenceState> {
        self.idle_deadline = None;
        if self.phase != ChannelPhase::Joined {
            return None;
        }
        self.typing = false;
        Some(PresenceState::online(now))
    }

    pub fn leaving(&mut self) {
        self.phase = ChannelPhase::Leaving;
        self.typing = false;
        self.idle_deadline = None;
    }

    pub fn left(&mut self) {
        self.phase = ChannelPhase::Unjoined;
    }
}

impl Default for SelfPresence {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved view of the peer's presence.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSnapshot {
    pub online: bool,
    pub typing: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Folds the peer's presence events. Online is a single boolean: a
/// repeated join for the same key (reconnect) cannot double-count.
pub struct PeerPresence {
    peer: UserId,
    online: bool,
    typing: bool,
    last_seen: Option<DateTime<Utc>>,
}

impl PeerPresence {
    pub fn new(peer: UserId, last_seen: Option<DateTime<Utc>>) -> Self {
        Self {
            peer,
            online: false,
            typing: false,
            last_seen,
        }
    }

    /// Apply one channel event. Returns whether the snapshot changed.
    pub fn apply(&mut self, event: &PresenceEvent, now: DateTime<Utc>) -> bool {
        let before = self.snapshot();
        match event {
            PresenceEvent::Join { key, .. } if *key == self.peer => {
                self.online = true;
            }
            PresenceEvent::Leave { key } if *key == self.peer => {
                self.online = false;
                self.typing = false;
                self.last_seen = Some(now);
            }
            PresenceEvent::Sync(states) => match states.get(&self.peer) {
                Some(state) => {
                    self.online = true;
                    self.typing = state.typing;
                }
                None => {
                    self.online = false;
                    self.typing = false;
                }
            },
            _ => {}
        }
        before != self.snapshot()
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            online: self.online,
            typing: self.typing,
            last_seen: self.last_seen,
        }
    }
}

/// Polling-path online derivation: a heartbeat within the freshness
/// window counts as online. Used where no presence channel is held (the
/// conversation list).
pub fn online_within_window(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_seen) < chrono::Duration::minutes(PRESENCE_FRESHNESS_MINS)
}
