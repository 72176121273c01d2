//! Loopback demo: two chat sessions sharing an in-process store and hub,
//! exchanging a text message and a voice note.
//!
//! ```sh
//! cargo run -p fichaje-chat --bin loopback
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use fichaje_chat::bridge::bridge_store_events;
use fichaje_chat::{
    find_or_create_conversation, init_tracing, spawn_session, ChatCommand, ChatNotification,
    SessionConfig,
};
use fichaje_media::{EncodingPrefs, NoopSinkFactory, ScriptedMic};
use fichaje_realtime::LocalHub;
use fichaje_shared::{Profile, PublicationId, UserId};
use fichaje_store::{MemoryStorage, MemoryStore, MessageStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(LocalHub::new());
    let _bridge = bridge_store_events(&store, hub.clone());
    let storage = Arc::new(MemoryStorage::with_bucket("chat-audios"));

    let ana = UserId::new();
    let club = UserId::new();
    store.add_profile(Profile {
        id: Some(ana),
        full_name: Some("Ana Rojas".to_string()),
        role: Some("jugador".to_string()),
        ..Profile::default()
    });
    store.add_profile(Profile {
        id: Some(club),
        club_name: Some("CD Palestino".to_string()),
        role: Some("club".to_string()),
        ..Profile::default()
    });

    let conversation =
        find_or_create_conversation(store.as_ref(), PublicationId::new(), ana, club)
            .await?
            .id;

    let open = |me: UserId| {
        spawn_session(SessionConfig {
            store: store.clone(),
            hub: hub.clone(),
            storage: storage.clone(),
            capture: Arc::new(ScriptedMic::new(vec![Bytes::from_static(b"loopback-pcm")])),
            sinks: Arc::new(NoopSinkFactory),
            audio_bucket: "chat-audios".to_string(),
            encoding_prefs: EncodingPrefs::default(),
            conversation,
            me,
        })
    };

    let (ana_cmds, mut ana_notifs) = open(ana).await?;
    let (club_cmds, mut club_notifs) = open(club).await?;

    // Log everything the club's view would render.
    let printer = tokio::spawn(async move {
        while let Some(notification) = club_notifs.recv().await {
            match notification {
                ChatNotification::MessageAppended(m) => {
                    info!(from = %m.sender_id, kind = ?m.kind, content = %m.content, "club view: message")
                }
                ChatNotification::PeerChanged(p) => {
                    info!(online = p.online, typing = p.typing, "club view: peer presence")
                }
                ChatNotification::Closed => break,
                other => info!(?other, "club view"),
            }
        }
    });

    ana_cmds
        .send(ChatCommand::InputChanged("Hola! Vi tu publicación".to_string()))
        .await?;
    ana_cmds.send(ChatCommand::SendText).await?;

    ana_cmds.send(ChatCommand::StartRecording).await?;
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
    ana_cmds.send(ChatCommand::StopRecording).await?;
    ana_cmds.send(ChatCommand::SendVoiceNote).await?;

    // Drain ana's notifications until the voice note is confirmed sent.
    while let Some(notification) = ana_notifs.recv().await {
        if let ChatNotification::MessageAppended(m) = &notification {
            if m.audio_url.is_some() {
                info!(duration = ?m.audio_duration_secs, url = ?m.audio_url, "ana view: voice note sent");
                break;
            }
        }
    }

    ana_cmds.send(ChatCommand::Close).await?;
    club_cmds.send(ChatCommand::Close).await?;
    printer.await?;

    let history = store.list_messages(conversation).await?;
    info!(messages = history.len(), "Loopback conversation complete");
    Ok(())
}
