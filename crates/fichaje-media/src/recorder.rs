//! Capture state machine: `Idle → Armed → {Stopped | Cancelled}`.
//!
//! The recorder owns buffered chunks and elapsed time only; the device
//! that produces the chunks is held by the surrounding controller and
//! released on every exit path.

use bytes::Bytes;

use crate::encoding::{wrap_pcm_wav, AudioEncoding};

/// Sample layout of raw PCM capture streams. Absent when the device
/// already emits containerized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A finalized recording awaiting discard or send.
#[derive(Debug, Clone)]
pub struct RecordedClip {
    pub bytes: Bytes,
    pub duration_secs: u32,
    pub encoding: AudioEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Idle,
    Armed,
    Stopped,
}

enum State {
    Idle,
    Armed {
        encoding: AudioEncoding,
        format: Option<PcmFormat>,
        chunks: Vec<Bytes>,
        elapsed_secs: u32,
    },
    Stopped {
        clip: RecordedClip,
    },
}

pub struct Recorder {
    state: State,
}

impl Recorder {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    pub fn phase(&self) -> RecorderPhase {
        match self.state {
            State::Idle => RecorderPhase::Idle,
            State::Armed { .. } => RecorderPhase::Armed,
            State::Stopped { .. } => RecorderPhase::Stopped,
        }
    }

    pub fn elapsed_secs(&self) -> u32 {
        match &self.state {
            State::Armed { elapsed_secs, .. } => *elapsed_secs,
            State::Stopped { clip } => clip.duration_secs,
            State::Idle => 0,
        }
    }

    /// Arm the recorder with the encoding the device negotiated.
    /// Returns `false` (and changes nothing) unless the recorder is idle.
    pub fn arm(&mut self, encoding: AudioEncoding, format: Option<PcmFormat>) -> bool {
        if !matches!(self.state, State::Idle) {
            return false;
        }
        self.state = State::Armed {
            encoding,
            format,
            chunks: Vec::new(),
            elapsed_secs: 0,
        };
        true
    }

    /// One second of recording elapsed. Returns the new total while armed.
    pub fn tick(&mut self) -> Option<u32> {
        match &mut self.state {
            State::Armed { elapsed_secs, .. } => {
                *elapsed_secs += 1;
                Some(*elapsed_secs)
            }
            _ => None,
        }
    }

    /// Buffer a chunk of encoded audio. Chunks outside `Armed` are dropped.
    pub fn push_chunk(&mut self, chunk: Bytes) {
        if let State::Armed { chunks, .. } = &mut self.state {
            chunks.push(chunk);
        }
    }

    /// Finalize the buffered chunks into a clip.
    pub fn stop(&mut self) -> Option<RecordedClip> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::Armed {
                encoding,
                format,
                chunks,
                elapsed_secs,
            } => {
                let mut data = Vec::new();
                for chunk in &chunks {
                    data.extend_from_slice(chunk);
                }
                let bytes = match format {
                    // Raw PCM streams get their container here; everything
                    // else concatenates to a valid file already.
                    Some(fmt) if encoding.mime.starts_with("audio/wav") => {
                        Bytes::from(wrap_pcm_wav(&data, fmt.sample_rate, fmt.channels))
                    }
                    _ => Bytes::from(data),
                };
                let clip = RecordedClip {
                    bytes,
                    duration_secs: elapsed_secs,
                    encoding,
                };
                self.state = State::Stopped { clip: clip.clone() };
                Some(clip)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Drop whatever is armed or stopped and return to idle.
    pub fn cancel(&mut self) {
        self.state = State::Idle;
    }

    /// Discard a finalized clip without sending it.
    pub fn discard(&mut self) {
        if matches!(self.state, State::Stopped { .. }) {
            self.state = State::Idle;
        }
    }

    pub fn clip(&self) -> Option<&RecordedClip> {
        match &self.state {
            State::Stopped { clip } => Some(clip),
            _ => None,
        }
    }

    /// Take the finalized clip for sending, returning to idle.
    pub fn take_clip(&mut self) -> Option<RecordedClip> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Stopped { clip } => Some(clip),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Put a clip back after a failed send so the user can retry.
    pub fn restore_clip(&mut self, clip: RecordedClip) {
        self.state = State::Stopped { clip };
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed() -> Recorder {
        let mut rec = Recorder::new();
        assert!(rec.arm(AudioEncoding::new("audio/webm;codecs=opus"), None));
        rec
    }

    #[test]
    fn five_ticks_stop_as_a_five_second_clip() {
        let mut rec = armed();
        rec.push_chunk(Bytes::from_static(b"aaaa"));
        rec.push_chunk(Bytes::from_static(b"bbbb"));
        for _ in 0..5 {
            rec.tick();
        }

        let clip = rec.stop().expect("clip");
        assert_eq!(clip.duration_secs, 5);
        assert_eq!(clip.bytes.as_ref(), b"aaaabbbb");
        assert_eq!(rec.phase(), RecorderPhase::Stopped);
    }

    #[test]
    fn cancel_discards_chunks_and_elapsed_time() {
        let mut rec = armed();
        rec.push_chunk(Bytes::from_static(b"xxxx"));
        rec.tick();
        rec.cancel();

        assert_eq!(rec.phase(), RecorderPhase::Idle);
        assert_eq!(rec.elapsed_secs(), 0);
        assert!(rec.stop().is_none());
    }

    #[test]
    fn arming_twice_is_rejected() {
        let mut rec = armed();
        assert!(!rec.arm(AudioEncoding::new("audio/mp4"), None));
        assert_eq!(rec.phase(), RecorderPhase::Armed);
    }

    #[test]
    fn ticks_and_chunks_outside_armed_are_ignored() {
        let mut rec = Recorder::new();
        assert!(rec.tick().is_none());
        rec.push_chunk(Bytes::from_static(b"lost"));

        rec.arm(AudioEncoding::new("audio/webm"), None);
        let clip = rec.stop().expect("clip");
        assert!(clip.bytes.is_empty());
    }

    #[test]
    fn pcm_clips_are_wrapped_in_a_wav_container() {
        let mut rec = Recorder::new();
        rec.arm(
            AudioEncoding::new("audio/wav"),
            Some(PcmFormat {
                sample_rate: 16_000,
                channels: 1,
            }),
        );
        rec.push_chunk(Bytes::from(vec![0u8; 320]));
        rec.tick();

        let clip = rec.stop().expect("clip");
        assert_eq!(&clip.bytes[0..4], b"RIFF");
        assert_eq!(clip.bytes.len(), 44 + 320);
    }

    #[test]
    fn take_and_restore_round_trip() {
        let mut rec = armed();
        rec.tick();
        rec.stop();

        let clip = rec.take_clip().expect("clip");
        assert_eq!(rec.phase(), RecorderPhase::Idle);

        rec.restore_clip(clip);
        assert_eq!(rec.phase(), RecorderPhase::Stopped);
        assert_eq!(rec.elapsed_secs(), 1);
    }
}
