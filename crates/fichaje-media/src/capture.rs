//! Microphone acquisition behind the [`CaptureDevice`] seam.
//!
//! The device is exclusively held for one armed session and released on
//! every exit path — the session carries an active flag and flips it on
//! release or drop, after which the stream callback becomes a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::encoding::{AudioEncoding, EncodingPrefs};
use crate::recorder::PcmFormat;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No input device available")]
    NoDevice,

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Capture device cannot produce '{0}'")]
    EncodingUnsupported(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// A live capture: the negotiated encoding, the chunk stream, and the
/// flag that releases the device.
pub struct CaptureSession {
    pub encoding: AudioEncoding,
    pub format: Option<PcmFormat>,
    pub chunks: mpsc::Receiver<Bytes>,
    active: Arc<AtomicBool>,
    // Keeps the chunk stream open for sources that enqueue everything
    // up-front (scripted devices).
    _keepalive: Option<mpsc::Sender<Bytes>>,
}

impl CaptureSession {
    pub fn new(
        encoding: AudioEncoding,
        format: Option<PcmFormat>,
        chunks: mpsc::Receiver<Bytes>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            encoding,
            format,
            chunks,
            active,
            _keepalive: None,
        }
    }

    pub fn with_keepalive(mut self, sender: mpsc::Sender<Bytes>) -> Self {
        self._keepalive = Some(sender);
        self
    }

    /// Release the capture device.
    pub fn release(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device and start buffering encoded chunks.
    async fn open(&self, prefs: &EncodingPrefs) -> Result<CaptureSession, CaptureError>;
}

/// Microphone capture through cpal, emitting raw PCM negotiated as
/// `audio/wav`.
pub struct CpalMic {
    pub sample_rate: u32,
    pub channels: u16,
    /// Milliseconds of audio per emitted chunk.
    pub chunk_ms: u32,
}

impl Default for CpalMic {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            chunk_ms: 200,
        }
    }
}

impl CpalMic {
    fn chunk_samples(&self) -> usize {
        (self.sample_rate as usize * self.chunk_ms as usize) / 1000 * self.channels as usize
    }
}

#[async_trait]
impl CaptureDevice for CpalMic {
    async fn open(&self, prefs: &EncodingPrefs) -> Result<CaptureSession, CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let encoding = prefs.negotiate(|mime| mime.starts_with("audio/wav"));
        if !encoding.mime.starts_with("audio/wav") {
            return Err(CaptureError::EncodingUnsupported(encoding.mime));
        }

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        info!(device = ?device.name(), "Using input device");

        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let chunk_samples = self.chunk_samples();
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        let active = Arc::new(AtomicBool::new(true));
        let active_cb = active.clone();
        let mut buffer: Vec<u8> = Vec::with_capacity(chunk_samples * 2);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if !active_cb.load(Ordering::Relaxed) {
                        return;
                    }
                    for &sample in data {
                        let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        buffer.extend_from_slice(&pcm.to_le_bytes());
                    }
                    while buffer.len() >= chunk_samples * 2 {
                        let chunk: Vec<u8> = buffer.drain(..chunk_samples * 2).collect();
                        if tx.try_send(Bytes::from(chunk)).is_err() {
                            warn!("Capture chunk channel full, dropping chunk");
                        }
                    }
                },
                move |err| {
                    error!("Audio input error: {err}");
                },
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        // Keep stream alive (released via active flag — callback becomes a no-op)
        std::mem::forget(stream);

        debug!("Audio capture started");
        Ok(CaptureSession::new(
            encoding,
            Some(PcmFormat {
                sample_rate: self.sample_rate,
                channels: self.channels,
            }),
            rx,
            active,
        ))
    }
}

/// Deterministic capture source for tests and loopback runs: yields a
/// prepared chunk sequence, then stays quiet until released.
pub struct ScriptedMic {
    chunks: Vec<Bytes>,
}

impl ScriptedMic {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self { chunks }
    }
}

#[async_trait]
impl CaptureDevice for ScriptedMic {
    async fn open(&self, prefs: &EncodingPrefs) -> Result<CaptureSession, CaptureError> {
        let encoding = prefs.negotiate(|_| true);
        let (tx, rx) = mpsc::channel(self.chunks.len().max(1));
        for chunk in &self.chunks {
            let _ = tx.try_send(chunk.clone());
        }
        let active = Arc::new(AtomicBool::new(true));
        Ok(CaptureSession::new(encoding, None, rx, active).with_keepalive(tx))
    }
}
