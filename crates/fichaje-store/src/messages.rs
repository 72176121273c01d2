use reqwest::Method;
use tracing::warn;

use fichaje_shared::{ConversationId, Message, MessageId, NewMessage, UserId};

use crate::error::{Result, StoreError};
use crate::rest::{total_from_content_range, RestStore, ACCEPT_SINGLE};

impl RestStore {
    pub async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let conv = format!("eq.{conversation}");
        let resp = self
            .request(Method::GET, &self.table_url("mensajes"))
            .query(&[
                ("select", "*"),
                ("conversacion_id", conv.as_str()),
                ("order", "created_at.asc"),
            ])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        let resp = self
            .request(Method::POST, &self.table_url("mensajes"))
            .header("Prefer", "return=representation")
            .header("Accept", ACCEPT_SINGLE)
            .json(&message)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn last_message(&self, conversation: ConversationId) -> Result<Option<Message>> {
        let conv = format!("eq.{conversation}");
        let resp = self
            .request(Method::GET, &self.table_url("mensajes"))
            .query(&[
                ("select", "*"),
                ("conversacion_id", conv.as_str()),
                ("order", "created_at.desc"),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let rows: Vec<Message> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn unread_count(&self, conversation: ConversationId, reader: UserId) -> Result<u64> {
        let conv = format!("eq.{conversation}");
        let not_reader = format!("neq.{reader}");
        let resp = self
            .request(Method::GET, &self.table_url("mensajes"))
            .header("Prefer", "count=exact")
            .query(&[
                ("select", "id"),
                ("conversacion_id", conv.as_str()),
                ("leido", "eq.false"),
                ("remitente_id", not_reader.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range);
        match total {
            Some(n) => Ok(n),
            None => {
                warn!(conversation = %conversation, "Missing count in response, assuming 0");
                Ok(0)
            }
        }
    }

    pub async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64> {
        let conv = format!("eq.{conversation}");
        let not_reader = format!("neq.{reader}");
        let resp = self
            .request(Method::PATCH, &self.table_url("mensajes"))
            .header("Prefer", "return=representation")
            .query(&[
                ("conversacion_id", conv.as_str()),
                ("remitente_id", not_reader.as_str()),
                ("leido", "eq.false"),
            ])
            .json(&serde_json::json!({ "leido": true }))
            .send()
            .await?;
        let rows: Vec<Message> = Self::check(resp).await?.json().await?;
        Ok(rows.len() as u64)
    }

    pub async fn mark_message_read(&self, id: &MessageId) -> Result<()> {
        if id.is_local() {
            // An optimistic id never reaches the server.
            return Err(StoreError::NotFound);
        }
        let filter = format!("eq.{id}");
        let resp = self
            .request(Method::PATCH, &self.table_url("mensajes"))
            .query(&[("id", filter.as_str())])
            .json(&serde_json::json!({ "leido": true }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
