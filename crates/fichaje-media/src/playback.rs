//! Per-message playback state.
//!
//! Each rendered audio message gets one handle (position, speed,
//! play/pause). Starting playback on one pauses every other handle
//! first — at most one handle is playing at any instant. The platform
//! player sits behind [`AudioSink`] and reports position through
//! [`SinkEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use fichaje_shared::constants::PLAYBACK_RATES;
use fichaje_shared::MessageId;

/// Position feedback from the underlying player.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Progress {
        message_id: MessageId,
        position_secs: f32,
    },
    Ended {
        message_id: MessageId,
    },
}

/// The underlying audio player of one message.
pub trait AudioSink: Send + Sync {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, position_secs: f32);
    fn set_rate(&mut self, rate: f32);
}

pub trait SinkFactory: Send + Sync {
    fn create(
        &self,
        message_id: &MessageId,
        url: &str,
        events: mpsc::Sender<SinkEvent>,
    ) -> Box<dyn AudioSink>;
}

/// Factory whose sinks ignore every command. The playback state machines
/// still run; useful for demos and for shells that render progress on
/// their own player.
pub struct NoopSinkFactory;

struct NoopSink;

impl AudioSink for NoopSink {
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn seek_to(&mut self, _position_secs: f32) {}
    fn set_rate(&mut self, _rate: f32) {}
}

impl SinkFactory for NoopSinkFactory {
    fn create(
        &self,
        _message_id: &MessageId,
        _url: &str,
        _events: mpsc::Sender<SinkEvent>,
    ) -> Box<dyn AudioSink> {
        Box::new(NoopSink)
    }
}

/// Next entry in the fixed speed cycle. Unknown rates restart at 1×.
pub fn next_rate(rate: f32) -> f32 {
    let idx = PLAYBACK_RATES
        .iter()
        .position(|r| (*r - rate).abs() < f32::EPSILON);
    match idx {
        Some(i) => PLAYBACK_RATES[(i + 1) % PLAYBACK_RATES.len()],
        None => PLAYBACK_RATES[0],
    }
}

/// Snapshot of one message's playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackHandle {
    pub message_id: MessageId,
    pub playing: bool,
    pub progress_pct: f32,
    pub rate: f32,
}

/// All playback handles of a conversation view.
pub struct Player {
    factory: Arc<dyn SinkFactory>,
    events_tx: mpsc::Sender<SinkEvent>,
    sinks: HashMap<MessageId, Box<dyn AudioSink>>,
    durations: HashMap<MessageId, u32>,
    progress: HashMap<MessageId, f32>,
    rates: HashMap<MessageId, f32>,
    playing: Option<MessageId>,
}

impl Player {
    pub fn new(factory: Arc<dyn SinkFactory>, events_tx: mpsc::Sender<SinkEvent>) -> Self {
        Self {
            factory,
            events_tx,
            sinks: HashMap::new(),
            durations: HashMap::new(),
            progress: HashMap::new(),
            rates: HashMap::new(),
            playing: None,
        }
    }

    pub fn playing_id(&self) -> Option<&MessageId> {
        self.playing.as_ref()
    }

    pub fn is_playing(&self, id: &MessageId) -> bool {
        self.playing.as_ref() == Some(id)
    }

    pub fn rate(&self, id: &MessageId) -> f32 {
        self.rates.get(id).copied().unwrap_or(PLAYBACK_RATES[0])
    }

    pub fn progress_pct(&self, id: &MessageId) -> f32 {
        self.progress.get(id).copied().unwrap_or(0.0)
    }

    pub fn handle(&self, id: &MessageId) -> PlaybackHandle {
        PlaybackHandle {
            message_id: id.clone(),
            playing: self.is_playing(id),
            progress_pct: self.progress_pct(id),
            rate: self.rate(id),
        }
    }

    /// Play or pause one message. Starting playback pauses every other
    /// handle first.
    pub fn toggle(&mut self, id: &MessageId, url: &str, duration_secs: u32) {
        if self.is_playing(id) {
            if let Some(sink) = self.sinks.get_mut(id) {
                sink.pause();
            }
            self.playing = None;
            return;
        }

        for (other, sink) in self.sinks.iter_mut() {
            if other != id {
                sink.pause();
            }
        }
        self.playing = None;

        self.durations.insert(id.clone(), duration_secs);
        if !self.sinks.contains_key(id) {
            let mut sink = self.factory.create(id, url, self.events_tx.clone());
            // A speed chosen before the first play applies when it starts.
            sink.set_rate(self.rate(id));
            self.sinks.insert(id.clone(), sink);
        }
        if let Some(sink) = self.sinks.get_mut(id) {
            sink.play();
            self.playing = Some(id.clone());
        }
    }

    /// Jump to a position, proportional to the known total duration.
    /// Permitted whether or not the handle is playing.
    pub fn seek(&mut self, id: &MessageId, pct: f32, duration_secs: u32) {
        let pct = pct.clamp(0.0, 100.0);
        self.durations.insert(id.clone(), duration_secs);
        if let Some(sink) = self.sinks.get_mut(id) {
            sink.seek_to(pct / 100.0 * duration_secs as f32);
        }
        self.progress.insert(id.clone(), pct);
    }

    /// Advance the speed cycle; applies immediately to the live sink if
    /// one exists, otherwise is stored for the next start.
    pub fn cycle_speed(&mut self, id: &MessageId) -> f32 {
        let rate = next_rate(self.rate(id));
        self.rates.insert(id.clone(), rate);
        if let Some(sink) = self.sinks.get_mut(id) {
            sink.set_rate(rate);
        }
        rate
    }

    pub fn on_event(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::Progress {
                message_id,
                position_secs,
            } => {
                let duration = self.durations.get(&message_id).copied().unwrap_or(0);
                if duration > 0 {
                    let pct = (position_secs / duration as f32 * 100.0).clamp(0.0, 100.0);
                    self.progress.insert(message_id, pct);
                }
            }
            SinkEvent::Ended { message_id } => {
                // Natural end: position resets, handle returns to paused.
                self.progress.insert(message_id.clone(), 0.0);
                if self.playing.as_ref() == Some(&message_id) {
                    self.playing = None;
                }
            }
        }
    }

    /// Pause every handle (the global invariant's enforcement hammer and
    /// the teardown path's first step).
    pub fn pause_all(&mut self) {
        for sink in self.sinks.values_mut() {
            sink.pause();
        }
        self.playing = None;
    }

    /// Pause and release every underlying player.
    pub fn shutdown(&mut self) {
        self.pause_all();
        self.sinks.clear();
    }
}
