//! In-process implementations of the store seams.
//!
//! `MemoryStore` behaves like the backend: it assigns server ids, bumps
//! the conversation's `updated_at` on message activity, and publishes a
//! [`StoreEvent`] for every insert and read-flag flip so a realtime hub
//! can be bridged on top. Used by unit tests, integration tests and the
//! loopback demo; never by production paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use fichaje_shared::{
    Conversation, ConversationId, Message, MessageId, NewMessage, PresenceRecord, Profile,
    PublicationId, UserId,
};

use crate::error::StoreError;
use crate::storage::StorageError;
use crate::traits::{MessageStore, ObjectStorage};

/// Change event mirrored from the backing table, as the realtime stream
/// would deliver it.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    MessageInserted(Message),
    MessageUpdated(Message),
}

#[derive(Default)]
struct Inner {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    presence: HashMap<UserId, PresenceRecord>,
    profiles: HashMap<UserId, Profile>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<StoreEvent>,
    fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            fail_inserts: AtomicBool::new(false),
        }
    }

    /// Change events, in table order.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Make every subsequent insert fail, simulating an unreachable
    /// backend for rollback tests.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn add_profile(&self, profile: Profile) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = profile.id {
            inner.profiles.insert(id, profile);
        }
    }

    pub fn set_presence(&self, record: PresenceRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.presence.insert(record.user_id, record);
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut convs: Vec<Conversation> = inner
            .conversations
            .iter()
            .filter(|c| c.involves(user))
            .cloned()
            .collect();
        convs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(convs)
    }

    async fn find_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .conversations
            .iter()
            .find(|c| {
                c.publication_id == publication
                    && ((c.participant_a == a && c.participant_b == b)
                        || (c.participant_a == b && c.participant_b == a))
            })
            .cloned())
    }

    async fn create_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation, StoreError> {
        let conv = Conversation {
            id: ConversationId::new(),
            participant_a: a,
            participant_b: b,
            publication_id: publication,
            updated_at: Utc::now(),
        };
        let mut inner = self.inner.lock().unwrap();
        inner.conversations.push(conv.clone());
        Ok(conv)
    }

    async fn list_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut msgs: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect();
        msgs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(msgs)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 503,
                message: "insert rejected".to_string(),
            });
        }

        let msg = Message {
            id: MessageId::from(Uuid::new_v4()),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            kind: message.kind,
            read: false,
            created_at: Utc::now(),
            audio_url: message.audio_url,
            audio_duration_secs: message.audio_duration_secs,
        };

        {
            let mut inner = self.inner.lock().unwrap();
            let created_at = msg.created_at;
            if let Some(conv) = inner
                .conversations
                .iter_mut()
                .find(|c| c.id == msg.conversation_id)
            {
                conv.updated_at = created_at;
            }
            inner.messages.push(msg.clone());
        }

        self.emit(StoreEvent::MessageInserted(msg.clone()));
        Ok(msg)
    }

    async fn last_message(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<Message>, StoreError> {
        Ok(self.list_messages(conversation).await?.into_iter().last())
    }

    async fn unread_count(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation && !m.read && m.sender_id != reader)
            .count() as u64)
    }

    async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, StoreError> {
        let flipped: Vec<Message> = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .messages
                .iter_mut()
                .filter(|m| m.conversation_id == conversation && !m.read && m.sender_id != reader)
                .map(|m| {
                    m.read = true;
                    m.clone()
                })
                .collect()
        };
        let count = flipped.len() as u64;
        for msg in flipped {
            self.emit(StoreEvent::MessageUpdated(msg));
        }
        Ok(count)
    }

    async fn mark_message_read(&self, id: &MessageId) -> Result<(), StoreError> {
        let flipped = {
            let mut inner = self.inner.lock().unwrap();
            let msg = inner
                .messages
                .iter_mut()
                .find(|m| &m.id == id)
                .ok_or(StoreError::NotFound)?;
            if msg.read {
                None
            } else {
                msg.read = true;
                Some(msg.clone())
            }
        };
        // Already-read rows produce no visible mutation: marking is idempotent.
        if let Some(msg) = flipped {
            self.emit(StoreEvent::MessageUpdated(msg));
        }
        Ok(())
    }

    async fn fetch_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.profiles.get(&user).cloned())
    }

    async fn fetch_presence(&self, user: UserId) -> Result<Option<PresenceRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.presence.get(&user).cloned())
    }

    async fn upsert_presence(&self, user: UserId, online: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.presence.insert(
            user,
            PresenceRecord {
                user_id: user,
                last_seen: Utc::now(),
                is_online: online,
            },
        );
        Ok(())
    }
}

#[derive(Default)]
struct StorageInner {
    buckets: HashSet<String>,
    accepted_types: Option<Vec<String>>,
    objects: HashMap<String, (Bytes, String)>,
}

/// In-process object storage.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<StorageInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: &str) -> Self {
        let storage = Self::new();
        storage.create_bucket(bucket);
        storage
    }

    pub fn create_bucket(&self, name: &str) {
        self.inner.lock().unwrap().buckets.insert(name.to_string());
    }

    /// Restrict the content types the buckets accept, simulating a bucket
    /// configured without audio MIME types.
    pub fn restrict_types(&self, types: &[&str]) {
        self.inner.lock().unwrap().accepted_types =
            Some(types.iter().map(|t| t.to_string()).collect());
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(&format!("{bucket}/{path}"))
            .map(|(bytes, _)| bytes.clone())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.inner.lock().unwrap().buckets.contains(bucket))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.buckets.contains(bucket) {
            return Err(StorageError::BucketMissing(bucket.to_string()));
        }
        if let Some(ref accepted) = inner.accepted_types {
            if !accepted.iter().any(|t| content_type.starts_with(t.as_str())) {
                return Err(StorageError::UnsupportedContentType(
                    content_type.to_string(),
                ));
            }
        }
        inner.objects.insert(
            format!("{bucket}/{path}"),
            (bytes, content_type.to_string()),
        );
        Ok(format!("memory://{bucket}/{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_party_store() -> (MemoryStore, UserId, UserId, PublicationId) {
        (MemoryStore::new(), UserId::new(), UserId::new(), PublicationId::new())
    }

    #[tokio::test]
    async fn find_conversation_matches_both_orderings() {
        let (store, a, b, publication) = two_party_store();
        let created = store.create_conversation(publication, a, b).await.unwrap();

        let forward = store.find_conversation(publication, a, b).await.unwrap();
        let reversed = store.find_conversation(publication, b, a).await.unwrap();
        assert_eq!(forward.as_ref().map(|c| c.id), Some(created.id));
        assert_eq!(reversed.map(|c| c.id), Some(created.id));

        let other_pub = store
            .find_conversation(PublicationId::new(), a, b)
            .await
            .unwrap();
        assert!(other_pub.is_none());
    }

    #[tokio::test]
    async fn inserting_bumps_updated_at_and_emits_an_event() {
        let (store, a, b, publication) = two_party_store();
        let conv = store.create_conversation(publication, a, b).await.unwrap();
        let mut events = store.subscribe_events();

        let msg = store
            .insert_message(NewMessage::text(conv.id, a, "Hola"))
            .await
            .unwrap();
        assert!(!msg.id.is_local());
        assert!(!msg.read);

        let reloaded = store.get_conversation(conv.id).await.unwrap();
        assert_eq!(reloaded.updated_at, msg.created_at);

        match events.recv().await.unwrap() {
            StoreEvent::MessageInserted(m) => assert_eq!(m.id, msg.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn marking_read_is_idempotent() {
        let (store, a, b, publication) = two_party_store();
        let conv = store.create_conversation(publication, a, b).await.unwrap();
        let msg = store
            .insert_message(NewMessage::text(conv.id, a, "Hola"))
            .await
            .unwrap();

        let mut events = store.subscribe_events();
        store.mark_message_read(&msg.id).await.unwrap();
        store.mark_message_read(&msg.id).await.unwrap();

        // Exactly one visible mutation for the two calls.
        match events.recv().await.unwrap() {
            StoreEvent::MessageUpdated(m) => assert!(m.read),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_err());
        assert_eq!(store.unread_count(conv.id, b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_read_targets_only_the_peers_unread_rows() {
        let (store, a, b, publication) = two_party_store();
        let conv = store.create_conversation(publication, a, b).await.unwrap();
        store
            .insert_message(NewMessage::text(conv.id, a, "uno"))
            .await
            .unwrap();
        store
            .insert_message(NewMessage::text(conv.id, a, "dos"))
            .await
            .unwrap();
        store
            .insert_message(NewMessage::text(conv.id, b, "propio"))
            .await
            .unwrap();

        assert_eq!(store.mark_conversation_read(conv.id, b).await.unwrap(), 2);
        assert_eq!(store.mark_conversation_read(conv.id, b).await.unwrap(), 0);
        // b's own message stays unread until a reads it.
        assert_eq!(store.unread_count(conv.id, a).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn storage_distinguishes_missing_bucket_and_bad_type() {
        let storage = MemoryStorage::new();
        let err = storage
            .upload("chat-audios", "u/1.webm", Bytes::from_static(b"x"), "audio/webm")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BucketMissing(_)));

        storage.create_bucket("chat-audios");
        storage.restrict_types(&["image/"]);
        let err = storage
            .upload("chat-audios", "u/1.webm", Bytes::from_static(b"x"), "audio/webm")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedContentType(_)));

        storage.restrict_types(&["audio/"]);
        let url = storage
            .upload("chat-audios", "u/1.webm", Bytes::from_static(b"x"), "audio/webm")
            .await
            .unwrap();
        assert_eq!(url, "memory://chat-audios/u/1.webm");
        assert!(storage.object("chat-audios", "u/1.webm").is_some());
    }
}
