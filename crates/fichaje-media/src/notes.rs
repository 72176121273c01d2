//! Voice-note send flow and the conversation view's media controller.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use fichaje_shared::{ConversationId, Message, NewMessage, UserId};
use fichaje_store::{MessageStore, ObjectStorage, StorageError, StoreError};

use crate::capture::{CaptureDevice, CaptureError, CaptureSession};
use crate::encoding::EncodingPrefs;
use crate::playback::Player;
use crate::recorder::{RecordedClip, Recorder, RecorderPhase};

#[derive(Error, Debug)]
pub enum VoiceNoteError {
    /// The audio bucket has not been provisioned — an actionable
    /// misconfiguration, not a generic failure.
    #[error("Audio storage is not configured (bucket '{0}' missing)")]
    StorageNotConfigured(String),

    /// The bucket refuses the negotiated content type.
    #[error("Audio format '{0}' rejected by storage")]
    UnsupportedFormat(String),

    #[error("Upload failed: {0}")]
    Upload(StorageError),

    #[error("Could not persist voice note: {0}")]
    Persist(#[from] StoreError),

    #[error("No recorded clip to send")]
    NothingRecorded,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl VoiceNoteError {
    /// Whether the failure is a storage misconfiguration the user can act
    /// on, as opposed to a transient error.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            Self::StorageNotConfigured(_) | Self::UnsupportedFormat(_)
        )
    }
}

/// Uploads a finalized clip and persists the audio message.
#[derive(Clone)]
pub struct VoiceNoteSender {
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn MessageStore>,
    bucket: String,
}

impl VoiceNoteSender {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn MessageStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            store,
            bucket: bucket.into(),
        }
    }

    /// Upload the clip under `{sender}/{timestamp}.{ext}` and insert the
    /// audio message. No message row is created if the upload fails.
    pub async fn send(
        &self,
        conversation: ConversationId,
        sender: UserId,
        clip: RecordedClip,
    ) -> Result<Message, VoiceNoteError> {
        let exists = self
            .storage
            .bucket_exists(&self.bucket)
            .await
            .map_err(VoiceNoteError::Upload)?;
        if !exists {
            return Err(VoiceNoteError::StorageNotConfigured(self.bucket.clone()));
        }

        let path = format!(
            "{}/{}.{}",
            sender,
            Utc::now().timestamp_millis(),
            clip.encoding.extension()
        );
        debug!(path = %path, mime = %clip.encoding.mime, size = clip.bytes.len(), "Uploading voice note");

        let url = self
            .storage
            .upload(&self.bucket, &path, clip.bytes.clone(), &clip.encoding.mime)
            .await
            .map_err(|e| match e {
                StorageError::BucketMissing(bucket) => {
                    VoiceNoteError::StorageNotConfigured(bucket)
                }
                StorageError::UnsupportedContentType(mime) => {
                    VoiceNoteError::UnsupportedFormat(mime)
                }
                other => VoiceNoteError::Upload(other),
            })?;

        let message = self
            .store
            .insert_message(NewMessage::audio(
                conversation,
                sender,
                url,
                clip.duration_secs,
            ))
            .await?;

        info!(message_id = %message.id, duration = clip.duration_secs, "Voice note sent");
        Ok(message)
    }
}

/// Media state of one conversation view: the recorder, the capture
/// session holding the device, and the playback handles.
pub struct VoiceNotes {
    device: Arc<dyn CaptureDevice>,
    prefs: EncodingPrefs,
    recorder: Recorder,
    capture: Option<CaptureSession>,
    pub player: Player,
    sender: VoiceNoteSender,
}

impl VoiceNotes {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        prefs: EncodingPrefs,
        player: Player,
        sender: VoiceNoteSender,
    ) -> Self {
        Self {
            device,
            prefs,
            recorder: Recorder::new(),
            capture: None,
            player,
            sender,
        }
    }

    pub fn sender(&self) -> &VoiceNoteSender {
        &self.sender
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.recorder.phase() == RecorderPhase::Armed
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.recorder.elapsed_secs()
    }

    pub fn clip(&self) -> Option<&RecordedClip> {
        self.recorder.clip()
    }

    /// Acquire the microphone and arm the recorder. A no-op unless idle.
    pub async fn start_recording(&mut self) -> Result<(), CaptureError> {
        if self.recorder.phase() != RecorderPhase::Idle {
            return Ok(());
        }
        let session = self.device.open(&self.prefs).await?;
        self.recorder.arm(session.encoding.clone(), session.format);
        self.capture = Some(session);
        Ok(())
    }

    /// Await the next chunk from the capture stream. Pends forever when
    /// nothing is being captured.
    pub async fn recv_chunk(&mut self) -> Option<Bytes> {
        match self.capture.as_mut() {
            Some(session) => session.chunks.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn push_chunk(&mut self, chunk: Bytes) {
        self.recorder.push_chunk(chunk);
    }

    pub fn tick(&mut self) -> Option<u32> {
        self.recorder.tick()
    }

    /// The capture stream closed underneath us; drop the device handle
    /// and let the user stop with what was buffered.
    pub fn on_stream_closed(&mut self) {
        warn!("Capture stream closed unexpectedly");
        self.capture = None;
    }

    /// Stop recording: drain what the stream already produced, release
    /// the device and finalize the clip.
    pub fn stop_recording(&mut self) -> Option<RecordedClip> {
        if let Some(mut session) = self.capture.take() {
            session.release();
            while let Ok(chunk) = session.chunks.try_recv() {
                self.recorder.push_chunk(chunk);
            }
        }
        self.recorder.stop()
    }

    /// Abort the armed recording, discarding chunks and elapsed time.
    pub fn cancel_recording(&mut self) {
        if let Some(session) = self.capture.take() {
            session.release();
        }
        self.recorder.cancel();
    }

    /// Discard a finalized clip without sending it.
    pub fn discard_clip(&mut self) {
        self.recorder.discard();
    }

    pub fn take_clip(&mut self) -> Option<RecordedClip> {
        self.recorder.take_clip()
    }

    /// Put the clip back after a failed send so the user can retry.
    pub fn restore_clip(&mut self, clip: RecordedClip) {
        self.recorder.restore_clip(clip);
    }

    /// View teardown: an armed recording is implicitly cancelled, the
    /// device released, and every playback handle paused and dropped.
    pub fn teardown(&mut self) {
        self.cancel_recording();
        self.player.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fichaje_shared::{MessageKind, PublicationId};
    use fichaje_store::{MemoryStorage, MemoryStore};
    use tokio::sync::mpsc;

    use crate::capture::ScriptedMic;
    use crate::encoding::AudioEncoding;
    use crate::playback::NoopSinkFactory;

    async fn conversation(store: &MemoryStore) -> (ConversationId, UserId) {
        let me = UserId::new();
        let conv = store
            .create_conversation(PublicationId::new(), me, UserId::new())
            .await
            .unwrap();
        (conv.id, me)
    }

    fn clip(duration_secs: u32) -> RecordedClip {
        RecordedClip {
            bytes: Bytes::from_static(b"opus-data"),
            duration_secs,
            encoding: AudioEncoding::new("audio/webm;codecs=opus"),
        }
    }

    #[tokio::test]
    async fn a_five_second_clip_persists_with_its_duration() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::with_bucket("chat-audios"));
        let (conv, me) = conversation(&store).await;

        let sender = VoiceNoteSender::new(storage.clone(), store.clone(), "chat-audios");
        let message = sender.send(conv, me, clip(5)).await.unwrap();

        assert_eq!(message.kind, MessageKind::Audio);
        assert_eq!(message.audio_duration_secs, Some(5));
        assert_eq!(message.content, "🎤 Nota de voz");
        let url = message.audio_url.expect("public url");
        assert!(url.starts_with("memory://chat-audios/"));
        assert!(url.contains(&me.to_string()));
        assert!(url.ends_with(".webm"));
    }

    #[tokio::test]
    async fn a_missing_bucket_aborts_without_a_message_row() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let (conv, me) = conversation(&store).await;

        let sender = VoiceNoteSender::new(storage, store.clone(), "chat-audios");
        let err = sender.send(conv, me, clip(3)).await.unwrap_err();

        assert!(matches!(err, VoiceNoteError::StorageNotConfigured(_)));
        assert!(err.is_misconfiguration());
        assert!(store.list_messages(conv).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_rejected_content_type_is_reported_distinctly() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::with_bucket("chat-audios"));
        storage.restrict_types(&["image/"]);
        let (conv, me) = conversation(&store).await;

        let sender = VoiceNoteSender::new(storage, store.clone(), "chat-audios");
        let err = sender.send(conv, me, clip(3)).await.unwrap_err();

        assert!(matches!(err, VoiceNoteError::UnsupportedFormat(_)));
        assert!(err.is_misconfiguration());
        assert!(store.list_messages(conv).await.unwrap().is_empty());
    }

    fn voice_notes(store: Arc<MemoryStore>, storage: Arc<MemoryStorage>) -> VoiceNotes {
        let (events_tx, _events_rx) = mpsc::channel(16);
        VoiceNotes::new(
            Arc::new(ScriptedMic::new(vec![
                Bytes::from_static(b"chunk-1"),
                Bytes::from_static(b"chunk-2"),
            ])),
            EncodingPrefs::default(),
            Player::new(Arc::new(NoopSinkFactory), events_tx),
            VoiceNoteSender::new(storage, store, "chat-audios"),
        )
    }

    #[tokio::test]
    async fn record_stop_send_carries_the_ticked_duration() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::with_bucket("chat-audios"));
        let (conv, me) = conversation(&store).await;
        let mut voice = voice_notes(store.clone(), storage);

        voice.start_recording().await.unwrap();
        assert!(voice.is_armed());
        for _ in 0..5 {
            voice.tick();
        }

        let clip = voice.stop_recording().expect("clip");
        assert_eq!(clip.duration_secs, 5);
        // The chunks buffered by the stream are drained into the clip.
        assert_eq!(clip.bytes.as_ref(), b"chunk-1chunk-2");
        assert!(!voice.is_capturing());

        let taken = voice.take_clip().expect("clip");
        let message = voice.sender().send(conv, me, taken).await.unwrap();
        assert_eq!(message.audio_duration_secs, Some(5));
    }

    #[tokio::test]
    async fn teardown_while_armed_cancels_and_releases_the_device() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::with_bucket("chat-audios"));
        let (conv, _me) = conversation(&store).await;
        let mut voice = voice_notes(store.clone(), storage);

        voice.start_recording().await.unwrap();
        voice.tick();
        voice.teardown();

        assert!(!voice.is_armed());
        assert!(!voice.is_capturing());
        assert!(voice.take_clip().is_none());
        assert!(store.list_messages(conv).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_failed_send_keeps_the_clip_for_retry() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::new()); // no bucket
        let (conv, me) = conversation(&store).await;
        let mut voice = voice_notes(store, storage);

        voice.start_recording().await.unwrap();
        voice.tick();
        voice.stop_recording();

        let clip = voice.take_clip().expect("clip");
        let err = voice.sender().send(conv, me, clip.clone()).await.unwrap_err();
        assert!(err.is_misconfiguration());
        voice.restore_clip(clip);

        assert!(voice.clip().is_some());
    }
}
