//! Persisted presence rows and profile lookups.

use chrono::Utc;
use reqwest::Method;

use fichaje_shared::{PresenceRecord, Profile, UserId};

use crate::error::Result;
use crate::rest::RestStore;

impl RestStore {
    pub async fn fetch_profile(&self, user: UserId) -> Result<Option<Profile>> {
        let filter = format!("eq.{user}");
        let resp = self
            .request(Method::GET, &self.table_url("profiles"))
            .query(&[("select", "*"), ("id", filter.as_str()), ("limit", "1")])
            .send()
            .await?;
        let rows: Vec<Profile> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn fetch_presence(&self, user: UserId) -> Result<Option<PresenceRecord>> {
        let filter = format!("eq.{user}");
        let resp = self
            .request(Method::GET, &self.table_url("user_presence"))
            .query(&[("select", "*"), ("user_id", filter.as_str()), ("limit", "1")])
            .send()
            .await?;
        let rows: Vec<PresenceRecord> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn upsert_presence(&self, user: UserId, online: bool) -> Result<()> {
        let record = PresenceRecord {
            user_id: user,
            last_seen: Utc::now(),
            is_online: online,
        };
        let resp = self
            .request(Method::POST, &self.table_url("user_presence"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&record)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
