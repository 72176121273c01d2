//! # fichaje-media
//!
//! The voice-note engine: capture (arm / cancel / stop), encoding
//! negotiation, upload + persist, and per-message playback with seek and
//! variable speed. Capture devices and playback sinks sit behind trait
//! seams so every state machine is testable without audio hardware.

pub mod capture;
pub mod encoding;
pub mod notes;
pub mod playback;
pub mod recorder;

pub use capture::{CaptureDevice, CaptureError, CaptureSession, CpalMic, ScriptedMic};
pub use encoding::{AudioEncoding, EncodingPrefs};
pub use notes::{VoiceNoteError, VoiceNoteSender, VoiceNotes};
pub use playback::{AudioSink, NoopSinkFactory, Player, PlaybackHandle, SinkEvent, SinkFactory};
pub use recorder::{PcmFormat, RecordedClip, Recorder, RecorderPhase};
