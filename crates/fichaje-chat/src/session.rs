//! The conversation-view session.
//!
//! One tokio task per open conversation drives everything: the timeline,
//! both presence machines, the realtime channel pair, the heartbeat and
//! typing timers, and the voice-note controller. External code talks to
//! it through typed command/notification channels and never touches the
//! state directly.
//!
//! Store calls that must not stall the view (text sends, voice-note
//! uploads, read marking, heartbeats) run as detached tasks and report
//! back through an internal channel; they are allowed to complete or
//! fail naturally after the session closes.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use fichaje_media::{
    CaptureDevice, EncodingPrefs, Player, RecordedClip, SinkEvent, SinkFactory, VoiceNoteError,
    VoiceNoteSender, VoiceNotes,
};
use fichaje_realtime::{
    ChannelMultiplexer, MessageChange, PresenceEvent, RealtimeError, RealtimeHub,
};
use fichaje_shared::constants::{HEARTBEAT_INTERVAL, TYPING_IDLE};
use fichaje_shared::{
    Conversation, ConversationId, Message, MessageId, MessageKind, NewMessage, UserId,
};
use fichaje_store::{MessageStore, ObjectStorage, StoreError};

use crate::counterpart::Counterpart;
use crate::presence::{PeerPresence, PeerSnapshot, SelfPresence};
use crate::timeline::{ReceiveOutcome, Timeline};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Conversation could not be loaded: {0}")]
    Load(#[from] StoreError),

    #[error("Realtime subscription failed: {0}")]
    Realtime(#[from] RealtimeError),
}

/// Commands accepted by an open session.
#[derive(Debug)]
pub enum ChatCommand {
    /// The input field changed; drives the draft and the typing flag.
    InputChanged(String),
    /// Send the current draft as a text message.
    SendText,
    StartRecording,
    StopRecording,
    CancelRecording,
    DiscardClip,
    /// Upload and send the finalized clip.
    SendVoiceNote,
    TogglePlayback(MessageId),
    Seek { message: MessageId, pct: f32 },
    CycleSpeed(MessageId),
    Close,
}

/// Everything the view layer needs to render.
#[derive(Debug)]
pub enum ChatNotification {
    Loaded {
        conversation: Conversation,
        counterpart: Counterpart,
        messages: Vec<Message>,
        peer: PeerSnapshot,
    },
    MessageAppended(Message),
    MessageConfirmed {
        local_id: MessageId,
        message: Message,
    },
    /// A text send failed; the input has been repopulated for a retry.
    SendFailed {
        restored_input: String,
    },
    MessageUpdated(Message),
    PeerChanged(PeerSnapshot),
    RecordingStarted,
    RecordingFailed {
        reason: String,
    },
    RecordingTick {
        elapsed_secs: u32,
    },
    ClipReady {
        duration_secs: u32,
    },
    VoiceNoteFailed {
        reason: String,
        storage_misconfigured: bool,
    },
    PlaybackChanged {
        message_id: MessageId,
        playing: bool,
        progress_pct: f32,
        rate: f32,
    },
    Closed,
}

/// Collaborators and identity of one conversation view.
pub struct SessionConfig {
    pub store: Arc<dyn MessageStore>,
    pub hub: Arc<dyn RealtimeHub>,
    pub storage: Arc<dyn ObjectStorage>,
    pub capture: Arc<dyn CaptureDevice>,
    pub sinks: Arc<dyn SinkFactory>,
    pub audio_bucket: String,
    pub encoding_prefs: EncodingPrefs,
    pub conversation: ConversationId,
    pub me: UserId,
}

/// Completions of detached store calls.
enum Internal {
    SendResult {
        local_id: MessageId,
        result: Result<Message, StoreError>,
    },
    VoiceResult(Result<Message, (VoiceNoteError, RecordedClip)>),
}

enum Wake {
    Cmd(Option<ChatCommand>),
    Internal(Option<Internal>),
    Msg(Option<MessageChange>),
    Pres(Option<PresenceEvent>),
    Heartbeat,
    TypingIdle,
    Chunk(Option<Bytes>),
    RecTick,
    Sink(Option<SinkEvent>),
}

/// Load the conversation, open the channel pair and spawn the session
/// task. Returns the command sender and the notification stream, the
/// first item of which is [`ChatNotification::Loaded`].
pub async fn spawn_session(
    config: SessionConfig,
) -> Result<(mpsc::Sender<ChatCommand>, mpsc::Receiver<ChatNotification>), SessionError> {
    let SessionConfig {
        store,
        hub,
        storage,
        capture,
        sinks,
        audio_bucket,
        encoding_prefs,
        conversation,
        me,
    } = config;

    // Initial load, before any channel exists.
    let conv = store.get_conversation(conversation).await?;
    let peer_id = conv.counterpart_of(me);
    let counterpart = Counterpart::resolve(peer_id, store.fetch_profile(peer_id).await?);

    let mut timeline = Timeline::new(conversation, me);
    timeline.load(store.list_messages(conversation).await?);

    // Everything addressed to us is read the moment the view opens.
    if let Err(e) = store.mark_conversation_read(conversation, me).await {
        warn!(error = %e, "Batch mark-read on load failed");
    }
    timeline.mark_peer_read_local();

    let last_seen = store.fetch_presence(peer_id).await?.map(|p| p.last_seen);
    let peer = PeerPresence::new(peer_id, last_seen);

    let mut presence = SelfPresence::new();
    presence.joining();
    let mut mux = ChannelMultiplexer::new(hub);
    let pair = mux.open(conversation, me).await?;
    let initial = presence.joined(Utc::now());
    if let Err(e) = mux.track(initial).await {
        warn!(error = %e, "Initial presence track failed");
    }
    if let Err(e) = store.upsert_presence(me, true).await {
        warn!(error = %e, "Initial presence upsert failed");
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (notif_tx, notif_rx) = mpsc::channel(256);
    let (internal_tx, internal_rx) = mpsc::channel(32);
    let (sink_tx, sink_rx) = mpsc::channel(64);

    let voice = VoiceNotes::new(
        capture,
        encoding_prefs,
        Player::new(sinks, sink_tx),
        VoiceNoteSender::new(storage, store.clone(), audio_bucket),
    );

    let _ = notif_tx
        .send(ChatNotification::Loaded {
            conversation: conv,
            counterpart,
            messages: timeline.entries().to_vec(),
            peer: peer.snapshot(),
        })
        .await;

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The initial upsert just happened; first renewal is one period out.
    heartbeat.reset();

    let mut rec_tick = interval(Duration::from_secs(1));
    rec_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let session = ChatSession {
        store,
        conversation,
        me,
        timeline,
        presence,
        peer,
        mux,
        voice,
        cmd_rx,
        internal_tx,
        internal_rx,
        sink_rx,
        notif_tx,
        heartbeat,
        rec_tick,
        messages_rx: pair.messages,
        presence_rx: pair.presence,
        messages_closed: false,
        presence_closed: false,
    };
    tokio::spawn(session.run());

    Ok((cmd_tx, notif_rx))
}

struct ChatSession {
    store: Arc<dyn MessageStore>,
    conversation: ConversationId,
    me: UserId,
    timeline: Timeline,
    presence: SelfPresence,
    peer: PeerPresence,
    mux: ChannelMultiplexer,
    voice: VoiceNotes,
    cmd_rx: mpsc::Receiver<ChatCommand>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
    sink_rx: mpsc::Receiver<SinkEvent>,
    notif_tx: mpsc::Sender<ChatNotification>,
    heartbeat: Interval,
    rec_tick: Interval,
    messages_rx: mpsc::Receiver<MessageChange>,
    presence_rx: mpsc::Receiver<PresenceEvent>,
    messages_closed: bool,
    presence_closed: bool,
}

impl ChatSession {
    async fn run(mut self) {
        info!(conversation = %self.conversation, "Chat session started");
        loop {
            let wake = self.next_wake().await;
            if !self.handle(wake).await {
                break;
            }
        }
        self.shutdown().await;
    }

    async fn next_wake(&mut self) -> Wake {
        let capturing = self.voice.is_capturing();
        let armed = self.voice.is_armed();
        let typing_deadline = self.presence.idle_deadline();
        let idle_at =
            typing_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));
        let messages_open = !self.messages_closed;
        let presence_open = !self.presence_closed;

        let Self {
            cmd_rx,
            internal_rx,
            sink_rx,
            heartbeat,
            rec_tick,
            messages_rx,
            presence_rx,
            voice,
            ..
        } = self;

        tokio::select! {
            cmd = cmd_rx.recv() => Wake::Cmd(cmd),
            internal = internal_rx.recv() => Wake::Internal(internal),
            change = messages_rx.recv(), if messages_open => Wake::Msg(change),
            event = presence_rx.recv(), if presence_open => Wake::Pres(event),
            _ = heartbeat.tick() => Wake::Heartbeat,
            _ = sleep_until(idle_at), if typing_deadline.is_some() => Wake::TypingIdle,
            chunk = voice.recv_chunk(), if capturing => Wake::Chunk(chunk),
            _ = rec_tick.tick(), if armed => Wake::RecTick,
            event = sink_rx.recv() => Wake::Sink(event),
        }
    }

    /// Returns `false` when the session should shut down.
    async fn handle(&mut self, wake: Wake) -> bool {
        match wake {
            Wake::Cmd(None) => false,
            Wake::Cmd(Some(command)) => self.handle_command(command).await,
            Wake::Internal(Some(internal)) => {
                self.handle_internal(internal).await;
                true
            }
            Wake::Internal(None) => true,
            Wake::Msg(Some(change)) => {
                self.handle_change(change).await;
                true
            }
            Wake::Msg(None) => {
                // Known limitation: no automatic resubscription. Closing
                // and reopening the conversation restores the stream.
                warn!(conversation = %self.conversation, "Message subscription dropped");
                self.messages_closed = true;
                true
            }
            Wake::Pres(Some(event)) => {
                if self.peer.apply(&event, Utc::now()) {
                    self.notify(ChatNotification::PeerChanged(self.peer.snapshot()))
                        .await;
                }
                true
            }
            Wake::Pres(None) => {
                warn!(conversation = %self.conversation, "Presence channel dropped");
                self.presence_closed = true;
                true
            }
            Wake::Heartbeat => {
                let store = self.store.clone();
                let me = self.me;
                tokio::spawn(async move {
                    if let Err(e) = store.upsert_presence(me, true).await {
                        warn!(error = %e, "Heartbeat upsert failed");
                    }
                });
                true
            }
            Wake::TypingIdle => {
                if let Some(state) = self.presence.on_idle(Utc::now()) {
                    if let Err(e) = self.mux.track(state).await {
                        debug!(error = %e, "Typing-idle track failed");
                    }
                }
                true
            }
            Wake::Chunk(Some(chunk)) => {
                self.voice.push_chunk(chunk);
                true
            }
            Wake::Chunk(None) => {
                self.voice.on_stream_closed();
                true
            }
            Wake::RecTick => {
                if let Some(elapsed_secs) = self.voice.tick() {
                    self.notify(ChatNotification::RecordingTick { elapsed_secs })
                        .await;
                }
                true
            }
            Wake::Sink(Some(event)) => {
                let message_id = match &event {
                    SinkEvent::Progress { message_id, .. } | SinkEvent::Ended { message_id } => {
                        message_id.clone()
                    }
                };
                self.voice.player.on_event(event);
                self.notify_playback(&message_id).await;
                true
            }
            Wake::Sink(None) => true,
        }
    }

    async fn handle_command(&mut self, command: ChatCommand) -> bool {
        match command {
            ChatCommand::InputChanged(value) => {
                let nonempty = !value.is_empty();
                self.timeline.set_draft(value);
                let deadline = Instant::now() + TYPING_IDLE;
                if let Some(state) = self.presence.on_keystroke(Utc::now(), deadline, nonempty) {
                    if let Err(e) = self.mux.track(state).await {
                        debug!(error = %e, "Typing track failed");
                    }
                }
            }
            ChatCommand::SendText => {
                if let Some(optimistic) = self.timeline.begin_send(Utc::now()) {
                    self.notify(ChatNotification::MessageAppended(optimistic.clone()))
                        .await;

                    let store = self.store.clone();
                    let internal = self.internal_tx.clone();
                    let payload =
                        NewMessage::text(self.conversation, self.me, optimistic.content.clone());
                    let local_id = optimistic.id;
                    tokio::spawn(async move {
                        let result = store.insert_message(payload).await;
                        let _ = internal
                            .send(Internal::SendResult { local_id, result })
                            .await;
                    });
                }
            }
            ChatCommand::StartRecording => match self.voice.start_recording().await {
                Ok(()) => {
                    self.rec_tick.reset();
                    self.notify(ChatNotification::RecordingStarted).await;
                }
                Err(e) => {
                    self.notify(ChatNotification::RecordingFailed {
                        reason: e.to_string(),
                    })
                    .await;
                }
            },
            ChatCommand::StopRecording => {
                if let Some(clip) = self.voice.stop_recording() {
                    self.notify(ChatNotification::ClipReady {
                        duration_secs: clip.duration_secs,
                    })
                    .await;
                }
            }
            ChatCommand::CancelRecording => self.voice.cancel_recording(),
            ChatCommand::DiscardClip => self.voice.discard_clip(),
            ChatCommand::SendVoiceNote => {
                if let Some(clip) = self.voice.take_clip() {
                    let sender = self.voice.sender().clone();
                    let internal = self.internal_tx.clone();
                    let conversation = self.conversation;
                    let me = self.me;
                    tokio::spawn(async move {
                        let result = match sender.send(conversation, me, clip.clone()).await {
                            Ok(message) => Ok(message),
                            Err(e) => Err((e, clip)),
                        };
                        let _ = internal.send(Internal::VoiceResult(result)).await;
                    });
                }
            }
            ChatCommand::TogglePlayback(id) => {
                let target = self.timeline.get(&id).and_then(|m| {
                    if m.kind == MessageKind::Audio {
                        m.audio_url
                            .clone()
                            .map(|url| (url, m.audio_duration_secs.unwrap_or(0)))
                    } else {
                        None
                    }
                });
                if let Some((url, duration_secs)) = target {
                    self.voice.player.toggle(&id, &url, duration_secs);
                    self.notify_playback(&id).await;
                }
            }
            ChatCommand::Seek { message, pct } => {
                let duration_secs = self
                    .timeline
                    .get(&message)
                    .and_then(|m| m.audio_duration_secs)
                    .unwrap_or(0);
                self.voice.player.seek(&message, pct, duration_secs);
                self.notify_playback(&message).await;
            }
            ChatCommand::CycleSpeed(id) => {
                self.voice.player.cycle_speed(&id);
                self.notify_playback(&id).await;
            }
            ChatCommand::Close => return false,
        }
        true
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::SendResult { local_id, result } => match result {
                Ok(message) => {
                    self.timeline.confirm_send(&local_id, message.clone());
                    self.notify(ChatNotification::MessageConfirmed { local_id, message })
                        .await;
                }
                Err(e) => {
                    warn!(error = %e, "Send failed, rolling back optimistic entry");
                    if let Some(restored_input) = self.timeline.fail_send(&local_id) {
                        self.notify(ChatNotification::SendFailed { restored_input })
                            .await;
                    }
                }
            },
            Internal::VoiceResult(result) => match result {
                Ok(message) => {
                    // No optimistic phase for audio: the confirmed row is
                    // appended directly; the echo from the change stream
                    // deduplicates.
                    if self.timeline.apply_insert(message.clone()) != ReceiveOutcome::Duplicate {
                        self.notify(ChatNotification::MessageAppended(message)).await;
                    }
                }
                Err((e, clip)) => {
                    warn!(error = %e, "Voice note failed, keeping clip for retry");
                    self.voice.restore_clip(clip);
                    self.notify(ChatNotification::VoiceNoteFailed {
                        storage_misconfigured: e.is_misconfiguration(),
                        reason: e.to_string(),
                    })
                    .await;
                }
            },
        }
    }

    async fn handle_change(&mut self, change: MessageChange) {
        match change {
            MessageChange::Inserted(message) => {
                if message.conversation_id != self.conversation {
                    return;
                }
                match self.timeline.apply_insert(message.clone()) {
                    ReceiveOutcome::Duplicate => {}
                    ReceiveOutcome::Appended { should_mark_read } => {
                        self.notify(ChatNotification::MessageAppended(message.clone()))
                            .await;
                        if should_mark_read {
                            // Best-effort, no retry.
                            let store = self.store.clone();
                            let id = message.id;
                            tokio::spawn(async move {
                                if let Err(e) = store.mark_message_read(&id).await {
                                    warn!(error = %e, message = %id, "Mark-read failed");
                                }
                            });
                        }
                    }
                }
            }
            MessageChange::Updated(message) => {
                if self.timeline.apply_update(message.clone()) {
                    self.notify(ChatNotification::MessageUpdated(message)).await;
                }
            }
        }
    }

    async fn notify(&self, notification: ChatNotification) {
        if self.notif_tx.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
        }
    }

    async fn notify_playback(&self, id: &MessageId) {
        let handle = self.voice.player.handle(id);
        self.notify(ChatNotification::PlaybackChanged {
            message_id: handle.message_id,
            playing: handle.playing,
            progress_pct: handle.progress_pct,
            rate: handle.rate,
        })
        .await;
    }

    async fn shutdown(&mut self) {
        // Media first: an armed recording is an implicit cancel, every
        // playback handle is paused and released.
        self.voice.teardown();

        self.presence.leaving();
        self.mux.close().await;
        self.presence.left();

        if let Err(e) = self.store.upsert_presence(self.me, false).await {
            warn!(error = %e, "Final offline upsert failed");
        }
        self.notify(ChatNotification::Closed).await;
        info!(conversation = %self.conversation, "Chat session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fichaje_media::{NoopSinkFactory, ScriptedMic};
    use fichaje_realtime::LocalHub;
    use fichaje_shared::PublicationId;
    use fichaje_store::{MemoryStorage, MemoryStore};
    use tokio::time::timeout;

    use crate::bridge::bridge_store_events;

    struct Rig {
        store: Arc<MemoryStore>,
        hub: Arc<LocalHub>,
        storage: Arc<MemoryStorage>,
        conversation: ConversationId,
        ana: UserId,
        club: UserId,
    }

    async fn rig() -> Rig {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(LocalHub::new());
        let _ = bridge_store_events(&store, hub.clone());
        let storage = Arc::new(MemoryStorage::with_bucket("chat-audios"));
        let ana = UserId::new();
        let club = UserId::new();
        let conversation = store
            .create_conversation(PublicationId::new(), ana, club)
            .await
            .unwrap()
            .id;
        Rig {
            store,
            hub,
            storage,
            conversation,
            ana,
            club,
        }
    }

    async fn open(
        rig: &Rig,
        me: UserId,
    ) -> (mpsc::Sender<ChatCommand>, mpsc::Receiver<ChatNotification>) {
        spawn_session(SessionConfig {
            store: rig.store.clone(),
            hub: rig.hub.clone(),
            storage: rig.storage.clone(),
            capture: Arc::new(ScriptedMic::new(vec![Bytes::from_static(b"pcm")])),
            sinks: Arc::new(NoopSinkFactory),
            audio_bucket: "chat-audios".to_string(),
            encoding_prefs: EncodingPrefs::default(),
            conversation: rig.conversation,
            me,
        })
        .await
        .unwrap()
    }

    /// Skip notifications until `pick` matches, with a wall-clock guard.
    async fn wait_for<T>(
        rx: &mut mpsc::Receiver<ChatNotification>,
        mut pick: impl FnMut(&ChatNotification) -> Option<T>,
    ) -> T {
        timeout(Duration::from_secs(5), async {
            loop {
                let notification = rx.recv().await.expect("notification stream ended");
                if let Some(value) = pick(&notification) {
                    return value;
                }
            }
        })
        .await
        .expect("timed out waiting for notification")
    }

    #[tokio::test]
    async fn a_text_send_reaches_the_peer_and_comes_back_read() {
        let rig = rig().await;
        let (ana_cmds, mut ana_rx) = open(&rig, rig.ana).await;
        let (_club_cmds, mut club_rx) = open(&rig, rig.club).await;

        ana_cmds
            .send(ChatCommand::InputChanged("Hola".to_string()))
            .await
            .unwrap();
        ana_cmds.send(ChatCommand::SendText).await.unwrap();

        // Sender side: optimistic entry first, then the confirmation.
        let optimistic = wait_for(&mut ana_rx, |n| match n {
            ChatNotification::MessageAppended(m) => Some(m.clone()),
            _ => None,
        })
        .await;
        assert!(optimistic.id.is_local());
        assert_eq!(optimistic.content, "Hola");

        let confirmed = wait_for(&mut ana_rx, |n| match n {
            ChatNotification::MessageConfirmed { message, .. } => Some(message.clone()),
            _ => None,
        })
        .await;
        assert!(!confirmed.id.is_local());

        // Peer side: the live insert lands with the server id.
        let received = wait_for(&mut club_rx, |n| match n {
            ChatNotification::MessageAppended(m) => Some(m.clone()),
            _ => None,
        })
        .await;
        assert_eq!(received.id, confirmed.id);
        assert_eq!(received.content, "Hola");

        // The peer's mark-read flows back to the sender as an update.
        let updated = wait_for(&mut ana_rx, |n| match n {
            ChatNotification::MessageUpdated(m) => Some(m.clone()),
            _ => None,
        })
        .await;
        assert_eq!(updated.id, confirmed.id);
        assert!(updated.read);
    }

    #[tokio::test]
    async fn a_rejected_send_rolls_back_and_restores_the_input() {
        let rig = rig().await;
        let (cmds, mut rx) = open(&rig, rig.ana).await;
        rig.store.set_fail_inserts(true);

        cmds.send(ChatCommand::InputChanged("Hola".to_string()))
            .await
            .unwrap();
        cmds.send(ChatCommand::SendText).await.unwrap();

        let optimistic = wait_for(&mut rx, |n| match n {
            ChatNotification::MessageAppended(m) => Some(m.clone()),
            _ => None,
        })
        .await;
        assert!(optimistic.id.is_local());

        let restored = wait_for(&mut rx, |n| match n {
            ChatNotification::SendFailed { restored_input } => Some(restored_input.clone()),
            _ => None,
        })
        .await;
        assert_eq!(restored, "Hola");
        assert!(rig
            .store
            .list_messages(rig.conversation)
            .await
            .unwrap()
            .is_empty());

        // The failure notice fires exactly once.
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(notification) = rx.try_recv() {
            assert!(!matches!(
                notification,
                ChatNotification::SendFailed { .. } | ChatNotification::MessageConfirmed { .. }
            ));
        }
    }

    #[tokio::test]
    async fn typing_appears_and_clears_for_the_peer() {
        let rig = rig().await;
        let (ana_cmds, _ana_rx) = open(&rig, rig.ana).await;
        let (_club_cmds, mut club_rx) = open(&rig, rig.club).await;

        ana_cmds
            .send(ChatCommand::InputChanged("H".to_string()))
            .await
            .unwrap();

        let snapshot = wait_for(&mut club_rx, |n| match n {
            ChatNotification::PeerChanged(p) if p.typing => Some(p.clone()),
            _ => None,
        })
        .await;
        assert!(snapshot.online);

        // No further keystrokes: the 1.5 s idle window clears the flag.
        let snapshot = wait_for(&mut club_rx, |n| match n {
            ChatNotification::PeerChanged(p) if !p.typing => Some(p.clone()),
            _ => None,
        })
        .await;
        assert!(snapshot.online);
    }

    #[tokio::test]
    async fn closing_publishes_offline_and_notifies_the_peer() {
        let rig = rig().await;
        let (ana_cmds, mut ana_rx) = open(&rig, rig.ana).await;
        let (_club_cmds, mut club_rx) = open(&rig, rig.club).await;

        // The club session sees ana online first.
        wait_for(&mut club_rx, |n| match n {
            ChatNotification::PeerChanged(p) if p.online => Some(()),
            _ => None,
        })
        .await;

        ana_cmds.send(ChatCommand::Close).await.unwrap();
        wait_for(&mut ana_rx, |n| match n {
            ChatNotification::Closed => Some(()),
            _ => None,
        })
        .await;

        let snapshot = wait_for(&mut club_rx, |n| match n {
            ChatNotification::PeerChanged(p) if !p.online => Some(p.clone()),
            _ => None,
        })
        .await;
        assert!(snapshot.last_seen.is_some());

        let record = rig.store.fetch_presence(rig.ana).await.unwrap().unwrap();
        assert!(!record.is_online);
    }

    #[tokio::test]
    async fn a_voice_note_flows_to_both_timelines_without_an_optimistic_phase() {
        let rig = rig().await;
        let (ana_cmds, mut ana_rx) = open(&rig, rig.ana).await;
        let (_club_cmds, mut club_rx) = open(&rig, rig.club).await;

        ana_cmds.send(ChatCommand::StartRecording).await.unwrap();
        wait_for(&mut ana_rx, |n| match n {
            ChatNotification::RecordingStarted => Some(()),
            _ => None,
        })
        .await;

        ana_cmds.send(ChatCommand::StopRecording).await.unwrap();
        wait_for(&mut ana_rx, |n| match n {
            ChatNotification::ClipReady { .. } => Some(()),
            _ => None,
        })
        .await;

        ana_cmds.send(ChatCommand::SendVoiceNote).await.unwrap();
        let sent = wait_for(&mut ana_rx, |n| match n {
            ChatNotification::MessageAppended(m) => Some(m.clone()),
            _ => None,
        })
        .await;
        assert!(!sent.id.is_local());
        assert_eq!(sent.kind, MessageKind::Audio);
        assert!(sent.audio_url.is_some());

        let received = wait_for(&mut club_rx, |n| match n {
            ChatNotification::MessageAppended(m) => Some(m.clone()),
            _ => None,
        })
        .await;
        assert_eq!(received.id, sent.id);
    }

    #[tokio::test]
    async fn a_missing_bucket_reports_a_misconfiguration_not_a_generic_error() {
        let rig = rig().await;
        let storage = Arc::new(MemoryStorage::new()); // bucket never created
        let (cmds, mut rx) = spawn_session(SessionConfig {
            store: rig.store.clone(),
            hub: rig.hub.clone(),
            storage,
            capture: Arc::new(ScriptedMic::new(vec![Bytes::from_static(b"pcm")])),
            sinks: Arc::new(NoopSinkFactory),
            audio_bucket: "chat-audios".to_string(),
            encoding_prefs: EncodingPrefs::default(),
            conversation: rig.conversation,
            me: rig.ana,
        })
        .await
        .unwrap();

        cmds.send(ChatCommand::StartRecording).await.unwrap();
        cmds.send(ChatCommand::StopRecording).await.unwrap();
        cmds.send(ChatCommand::SendVoiceNote).await.unwrap();

        let misconfigured = wait_for(&mut rx, |n| match n {
            ChatNotification::VoiceNoteFailed {
                storage_misconfigured,
                ..
            } => Some(*storage_misconfigured),
            _ => None,
        })
        .await;
        assert!(misconfigured);
        assert!(rig
            .store
            .list_messages(rig.conversation)
            .await
            .unwrap()
            .is_empty());
    }
}
