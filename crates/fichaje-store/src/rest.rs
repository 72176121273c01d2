//! REST client for the hosted relational service.
//!
//! The service exposes row-level query filters over HTTP (`eq.`, `neq.`,
//! `or=(...)`), ordering via `order=`, and returns inserted/updated rows
//! when asked with `Prefer: return=representation`. The typed helpers are
//! grouped one file per domain area: [`messages`](crate::messages),
//! [`conversations`](crate::conversations), [`presence`](crate::presence).

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};

use fichaje_shared::{
    Conversation, ConversationId, Message, MessageId, NewMessage, PresenceRecord, Profile,
    PublicationId, UserId,
};

use crate::config::ServiceConfig;
use crate::error::{Result, StoreError};
use crate::traits::MessageStore;

/// Accept header that asks the service for a single JSON object instead
/// of a one-element array.
pub(crate) const ACCEPT_SINGLE: &str = "application/vnd.pgrst.object+json";

pub struct RestStore {
    http: Client,
    base: String,
    api_key: String,
}

impl RestStore {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            http: Client::new(),
            base: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// URL of a table under the REST root.
    pub(crate) fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }

    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self.http.request(method, url);
        if !self.api_key.is_empty() {
            req = req.header("apikey", &self.api_key).bearer_auth(&self.api_key);
        }
        req
    }

    /// Map a non-success response into [`StoreError::Api`] with the body
    /// preserved as the message.
    pub(crate) async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Extract the total row count from a `Content-Range` header value such
/// as `0-0/5` or `*/0`.
pub(crate) fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl MessageStore for RestStore {
    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        RestStore::get_conversation(self, id).await
    }

    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>> {
        RestStore::list_conversations(self, user).await
    }

    async fn find_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>> {
        RestStore::find_conversation(self, publication, a, b).await
    }

    async fn create_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation> {
        RestStore::create_conversation(self, publication, a, b).await
    }

    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        RestStore::list_messages(self, conversation).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        RestStore::insert_message(self, message).await
    }

    async fn last_message(&self, conversation: ConversationId) -> Result<Option<Message>> {
        RestStore::last_message(self, conversation).await
    }

    async fn unread_count(&self, conversation: ConversationId, reader: UserId) -> Result<u64> {
        RestStore::unread_count(self, conversation, reader).await
    }

    async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64> {
        RestStore::mark_conversation_read(self, conversation, reader).await
    }

    async fn mark_message_read(&self, id: &MessageId) -> Result<()> {
        RestStore::mark_message_read(self, id).await
    }

    async fn fetch_profile(&self, user: UserId) -> Result<Option<Profile>> {
        RestStore::fetch_profile(self, user).await
    }

    async fn fetch_presence(&self, user: UserId) -> Result<Option<PresenceRecord>> {
        RestStore::fetch_presence(self, user).await
    }

    async fn upsert_presence(&self, user: UserId, online: bool) -> Result<()> {
        RestStore::upsert_presence(self, user, online).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_totals() {
        assert_eq!(total_from_content_range("0-0/5"), Some(5));
        assert_eq!(total_from_content_range("*/0"), Some(0));
        assert_eq!(total_from_content_range("0-24/3573"), Some(3573));
        assert_eq!(total_from_content_range("garbage"), None);
    }

    #[test]
    fn table_urls_join_the_rest_root() {
        let store = RestStore::new(&ServiceConfig {
            base_url: "https://acme.example/".to_string(),
            ..ServiceConfig::default()
        });
        assert_eq!(
            store.table_url("mensajes"),
            "https://acme.example/rest/v1/mensajes"
        );
    }
}
