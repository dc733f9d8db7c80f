use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::VaultConfig;

pub const DEFAULT_INSIGHT_TAG: &str = "Raw Note";

/// Source of the topics already present in the vault.
#[async_trait]
pub trait TopicDirectory: Send + Sync {
    /// Unique topics, sorted. Failures yield an empty list.
    async fn list_topics(&self) -> Vec<String>;
}

/// Stand-in when the vault has no credentials configured.
pub struct NoVault;

#[async_trait]
impl TopicDirectory for NoVault {
    async fn list_topics(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A note to insert.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewNote {
    pub content: String,
    pub topic: String,
    pub insight_tag: String,
}

impl NewNote {
    pub fn new(content: &str, topic: &str, insight_tag: Option<&str>) -> Self {
        Self {
            content: content.to_string(),
            topic: topic.trim().to_string(),
            insight_tag: insight_tag.unwrap_or(DEFAULT_INSIGHT_TAG).trim().to_string(),
        }
    }
}

/// A stored note as returned by `notes_for_topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    #[serde(default)]
    pub insight_tag: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
struct TopicRow {
    topic: Option<String>,
}

/// Supabase (PostgREST) client for the notes table.
pub struct VaultClient {
    http: Client,
    base_url: String,
    key: String,
    table: String,
}

impl VaultClient {
    /// Fails when either credential is missing.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let url = config.url.as_deref().filter(|v| !v.is_empty());
        let key = config.service_role_key.as_deref().filter(|v| !v.is_empty());
        match (url, key) {
            (Some(url), Some(key)) => Ok(Self::with_base_url(url, key, &config.table)),
            _ => {
                let missing: Vec<&str> = [("SUPABASE_URL", url), ("SUPABASE_SERVICE_ROLE_KEY", key)]
                    .into_iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(name, _)| name)
                    .collect();
                anyhow::bail!("Missing Supabase credentials: {}", missing.join(", "))
            }
        }
    }

    pub fn with_base_url(base_url: &str, key: &str, table: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            table: table.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.key).bearer_auth(&self.key)
    }

    /// Insert one note and return the stored rows.
    pub async fn insert_note(&self, note: &NewNote) -> Result<Vec<Value>> {
        let resp = self
            .authed(self.http.post(self.endpoint()))
            .header("Prefer", "return=representation")
            .json(note)
            .send()
            .await?;
        let rows: Vec<Value> = check(resp).await?.json().await?;
        debug!("Inserted note under topic '{}'", note.topic);
        Ok(rows)
    }

    /// All distinct topics, sorted alphabetically.
    pub async fn fetch_topics(&self) -> Result<Vec<String>> {
        let resp = self
            .authed(self.http.get(self.endpoint()))
            .query(&[("select", "topic")])
            .send()
            .await?;
        let rows: Vec<TopicRow> = check(resp).await?.json().await?;
        let unique: BTreeSet<String> = rows.into_iter().filter_map(|r| r.topic).collect();
        Ok(unique.into_iter().collect())
    }

    /// Notes under `topic`, oldest first.
    pub async fn notes_for_topic(&self, topic: &str) -> Result<Vec<Note>> {
        let topic_filter = format!("eq.{}", topic.trim());
        let resp = self
            .authed(self.http.get(self.endpoint()))
            .query(&[
                ("select", "content,insight_tag,created_at"),
                ("topic", topic_filter.as_str()),
                ("order", "created_at.asc"),
            ])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

#[async_trait]
impl TopicDirectory for VaultClient {
    async fn list_topics(&self) -> Vec<String> {
        match self.fetch_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                warn!("Error fetching topics: {e:#}");
                Vec::new()
            }
        }
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("Supabase request failed ({status}): {}", body.trim())
}
