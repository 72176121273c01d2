//! Domain models.
//!
//! Rust-side field names are English; serde renames map them onto the
//! backing service's column names (`conversaciones`, `mensajes`,
//! `user_presence`, `profiles`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::VOICE_NOTE_CAPTION;
use crate::ids::{ConversationId, MessageId, PublicationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "texto")]
    Text,
    #[serde(rename = "audio")]
    Audio,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

/// A two-party conversation anchored to one publication.
///
/// The unordered participant pair is unique per publication; creation
/// paths must check both orderings before inserting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(rename = "usuario1_id")]
    pub participant_a: UserId,
    #[serde(rename = "usuario2_id")]
    pub participant_b: UserId,
    #[serde(rename = "publicacion_id")]
    pub publication_id: PublicationId,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user: UserId) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    /// The other participant from `me`'s point of view.
    pub fn counterpart_of(&self, me: UserId) -> UserId {
        if self.participant_a == me {
            self.participant_b
        } else {
            self.participant_a
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "conversacion_id")]
    pub conversation_id: ConversationId,
    #[serde(rename = "remitente_id")]
    pub sender_id: UserId,
    #[serde(rename = "contenido")]
    pub content: String,
    #[serde(rename = "tipo", default)]
    pub kind: MessageKind,
    #[serde(rename = "leido")]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub audio_url: Option<String>,
    #[serde(rename = "duracion_audio")]
    pub audio_duration_secs: Option<u32>,
}

impl Message {
    pub fn is_optimistic(&self) -> bool {
        self.id.is_local()
    }
}

/// Insert payload for a new message; the server assigns id, read flag
/// and creation timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    #[serde(rename = "conversacion_id")]
    pub conversation_id: ConversationId,
    #[serde(rename = "remitente_id")]
    pub sender_id: UserId,
    #[serde(rename = "contenido")]
    pub content: String,
    #[serde(rename = "tipo")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(rename = "duracion_audio", skip_serializing_if = "Option::is_none")]
    pub audio_duration_secs: Option<u32>,
}

impl NewMessage {
    pub fn text(conversation: ConversationId, sender: UserId, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation,
            sender_id: sender,
            content: content.into(),
            kind: MessageKind::Text,
            audio_url: None,
            audio_duration_secs: None,
        }
    }

    pub fn audio(
        conversation: ConversationId,
        sender: UserId,
        url: impl Into<String>,
        duration_secs: u32,
    ) -> Self {
        Self {
            conversation_id: conversation,
            sender_id: sender,
            content: VOICE_NOTE_CAPTION.to_string(),
            kind: MessageKind::Audio,
            audio_url: Some(url.into()),
            audio_duration_secs: Some(duration_secs),
        }
    }
}

/// Persisted last-seen record, one row per user, upserted by the owner's
/// client on join/leave and on every heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub last_seen: DateTime<Utc>,
    pub is_online: bool,
}

/// Marketplace profile of a participant. Players carry `full_name` and
/// `photo_url`, clubs carry `club_name` and `logo_url`; every field may
/// be absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Profile {
    pub id: Option<UserId>,
    #[serde(rename = "nombre_completo")]
    pub full_name: Option<String>,
    #[serde(rename = "nombre_club")]
    pub club_name: Option<String>,
    #[serde(rename = "rol")]
    pub role: Option<String>,
    #[serde(rename = "foto_url")]
    pub photo_url: Option<String>,
    #[serde(rename = "logo_url")]
    pub logo_url: Option<String>,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_maps_service_column_names() {
        let json = serde_json::json!({
            "id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d",
            "conversacion_id": "11111111-1111-1111-1111-111111111111",
            "remitente_id": "22222222-2222-2222-2222-222222222222",
            "contenido": "Hola",
            "tipo": "texto",
            "leido": false,
            "created_at": "2024-05-01T10:00:00Z",
            "audio_url": null,
            "duracion_audio": null,
        });

        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg.content, "Hola");
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(!msg.read);
        assert!(!msg.is_optimistic());
    }

    #[test]
    fn kind_defaults_to_text_when_column_is_absent() {
        let json = serde_json::json!({
            "id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d",
            "conversacion_id": "11111111-1111-1111-1111-111111111111",
            "remitente_id": "22222222-2222-2222-2222-222222222222",
            "contenido": "sin tipo",
            "leido": true,
            "created_at": "2024-05-01T10:00:00Z",
        });

        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
    }

    #[test]
    fn audio_payload_carries_caption_and_duration() {
        let nm = NewMessage::audio(
            ConversationId::new(),
            UserId::new(),
            "https://cdn.example/a.webm",
            42,
        );
        let json = serde_json::to_value(&nm).unwrap();
        assert_eq!(json["contenido"], VOICE_NOTE_CAPTION);
        assert_eq!(json["tipo"], "audio");
        assert_eq!(json["duracion_audio"], 42);
    }

    #[test]
    fn text_payload_omits_audio_columns() {
        let nm = NewMessage::text(ConversationId::new(), UserId::new(), "Hola");
        let json = serde_json::to_value(&nm).unwrap();
        assert!(json.get("audio_url").is_none());
        assert!(json.get("duracion_audio").is_none());
    }

    #[test]
    fn counterpart_resolution_is_symmetric() {
        let a = UserId::new();
        let b = UserId::new();
        let conv = Conversation {
            id: ConversationId::new(),
            participant_a: a,
            participant_b: b,
            publication_id: PublicationId::new(),
            updated_at: Utc::now(),
        };
        assert_eq!(conv.counterpart_of(a), b);
        assert_eq!(conv.counterpart_of(b), a);
        assert!(conv.involves(a) && conv.involves(b));
        assert!(!conv.involves(UserId::new()));
    }
}
