//! Trait seams between the chat engine and the backing services.
//!
//! [`RestStore`](crate::RestStore) / [`RestStorage`](crate::RestStorage)
//! implement them against the hosted service; the [`memory`](crate::memory)
//! module implements them in-process for tests and loopback runs.

use async_trait::async_trait;
use bytes::Bytes;

use fichaje_shared::{
    Conversation, ConversationId, Message, MessageId, NewMessage, PresenceRecord, Profile,
    PublicationId, UserId,
};

use crate::error::StoreError;
use crate::storage::StorageError;

/// Typed access to conversations, messages, profiles and the persisted
/// presence table.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, StoreError>;

    /// All conversations the user participates in, most recently active
    /// first.
    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, StoreError>;

    /// Find the conversation for this publication between the two users,
    /// checking both participant orderings.
    async fn find_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, StoreError>;

    async fn create_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation, StoreError>;

    /// Messages of a conversation ordered by creation time ascending.
    async fn list_messages(&self, conversation: ConversationId)
        -> Result<Vec<Message>, StoreError>;

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    async fn last_message(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<Message>, StoreError>;

    /// Number of unread messages addressed to `reader`.
    async fn unread_count(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, StoreError>;

    /// Mark every unread message not sent by `reader` as read. Returns the
    /// number of rows updated.
    async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, StoreError>;

    async fn mark_message_read(&self, id: &MessageId) -> Result<(), StoreError>;

    async fn fetch_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError>;

    async fn fetch_presence(&self, user: UserId) -> Result<Option<PresenceRecord>, StoreError>;

    /// Upsert the caller's presence row with `last_seen = now`.
    async fn upsert_presence(&self, user: UserId, online: bool) -> Result<(), StoreError>;
}

/// Blob storage with public URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Whether the bucket exists. Callers must check before uploading; a
    /// missing bucket is a user-facing misconfiguration, not a generic
    /// failure.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Upload a blob and return its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError>;
}
