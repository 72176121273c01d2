use reqwest::Method;

use fichaje_shared::{Conversation, ConversationId, PublicationId, UserId};

use crate::error::{Result, StoreError};
use crate::rest::{RestStore, ACCEPT_SINGLE};

impl RestStore {
    pub async fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        let filter = format!("eq.{id}");
        let resp = self
            .request(Method::GET, &self.table_url("conversaciones"))
            .query(&[("select", "*"), ("id", filter.as_str()), ("limit", "1")])
            .send()
            .await?;
        let rows: Vec<Conversation> = Self::check(resp).await?.json().await?;
        rows.into_iter().next().ok_or(StoreError::NotFound)
    }

    pub async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>> {
        let either = format!("(usuario1_id.eq.{user},usuario2_id.eq.{user})");
        let resp = self
            .request(Method::GET, &self.table_url("conversaciones"))
            .query(&[
                ("select", "*"),
                ("or", either.as_str()),
                ("order", "updated_at.desc"),
            ])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// The unordered participant pair is unique per publication, so the
    /// lookup covers both orderings.
    pub async fn find_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>> {
        let pub_filter = format!("eq.{publication}");
        let pair = format!(
            "(and(usuario1_id.eq.{a},usuario2_id.eq.{b}),and(usuario1_id.eq.{b},usuario2_id.eq.{a}))"
        );
        let resp = self
            .request(Method::GET, &self.table_url("conversaciones"))
            .query(&[
                ("select", "*"),
                ("publicacion_id", pub_filter.as_str()),
                ("or", pair.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let rows: Vec<Conversation> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_conversation(
        &self,
        publication: PublicationId,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation> {
        let resp = self
            .request(Method::POST, &self.table_url("conversaciones"))
            .header("Prefer", "return=representation")
            .header("Accept", ACCEPT_SINGLE)
            .json(&serde_json::json!({
                "publicacion_id": publication,
                "usuario1_id": a,
                "usuario2_id": b,
            }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
