use std::time::Duration;

/// Interval at which an open conversation view refreshes the persisted
/// presence record (and the conversation list re-polls it).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Idle window after the last keystroke before the ephemeral typing flag
/// is cleared.
pub const TYPING_IDLE: Duration = Duration::from_millis(1500);

/// A peer whose last heartbeat is within this window counts as online on
/// the polling path (no live presence channel held).
pub const PRESENCE_FRESHNESS_MINS: i64 = 2;

/// Discrete playback speed cycle for voice notes.
pub const PLAYBACK_RATES: [f32; 4] = [1.0, 1.25, 1.5, 2.0];

/// Prefix of locally generated message ids for optimistic sends.
/// Server-assigned ids are plain UUIDs and never carry it.
pub const LOCAL_ID_PREFIX: &str = "temp-";

/// Caption stored as the content of audio messages.
pub const VOICE_NOTE_CAPTION: &str = "🎤 Nota de voz";

/// Default storage bucket for voice notes.
pub const DEFAULT_AUDIO_BUCKET: &str = "chat-audios";
