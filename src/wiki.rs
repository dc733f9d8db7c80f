use std::fmt;

use anyhow::Result;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::config::WikiConfig;

const CONTENT_API: &str = "/wiki/rest/api/content";

/// One entry of a published page.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Snippet {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishAction {
    Created,
    Updated,
}

impl fmt::Display for PublishAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Updated => write!(f, "Updated"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub action: PublishAction,
    pub page_url: String,
}

#[derive(Debug, PartialEq, Eq)]
struct ExistingPage {
    id: String,
    version: u64,
}

/// Confluence Cloud client. Pages are keyed by title within one space.
pub struct WikiClient {
    http: Client,
    base_url: String,
    user_email: String,
    api_token: String,
    space: String,
}

impl WikiClient {
    /// Fails when the site, user or token is missing.
    pub fn from_config(config: &WikiConfig) -> Result<Self> {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        match (
            present(&config.site_name),
            present(&config.user_email),
            present(&config.api_token),
        ) {
            (Some(site), Some(user), Some(token)) => Ok(Self::with_base_url(
                &format!("https://{site}.atlassian.net"),
                &user,
                &token,
                &config.space,
            )),
            _ => anyhow::bail!(
                "Missing Atlassian credentials (ATLASSIAN_SITE_NAME, ATLASSIAN_USER_EMAIL, ATLASSIAN_API_TOKEN)"
            ),
        }
    }

    pub fn with_base_url(base_url: &str, user_email: &str, api_token: &str, space: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_email: user_email.to_string(),
            api_token: api_token.to_string(),
            space: space.to_string(),
        }
    }

    /// Create the page, or overwrite it if one with this title already exists.
    pub async fn publish(&self, title: &str, snippets: &[Snippet]) -> Result<PublishOutcome> {
        let html = render_page(title, snippets);
        let (action, page) = match self.find_page(title).await? {
            Some(existing) => (PublishAction::Updated, self.update_page(&existing, title, &html).await?),
            None => (PublishAction::Created, self.create_page(title, &html).await?),
        };
        let page_url = self.page_url(&page)?;
        info!("{action} page '{title}' in space {}: {page_url}", self.space);
        Ok(PublishOutcome { action, page_url })
    }

    async fn find_page(&self, title: &str) -> Result<Option<ExistingPage>> {
        let resp = self
            .http
            .get(format!("{}{CONTENT_API}", self.base_url))
            .basic_auth(&self.user_email, Some(&self.api_token))
            .query(&[
                ("spaceKey", self.space.as_str()),
                ("title", title),
                ("expand", "version"),
            ])
            .send()
            .await?;
        let json: Value = check(resp).await?.json().await?;
        let Some(page) = json["results"].as_array().and_then(|r| r.first()) else {
            return Ok(None);
        };
        let id = page["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Page lookup returned no id"))?;
        Ok(Some(ExistingPage {
            id: id.to_string(),
            version: page["version"]["number"].as_u64().unwrap_or(1),
        }))
    }

    async fn create_page(&self, title: &str, html: &str) -> Result<Value> {
        let resp = self
            .http
            .post(format!("{}{CONTENT_API}", self.base_url))
            .basic_auth(&self.user_email, Some(&self.api_token))
            .json(&json!({
                "type": "page",
                "title": title,
                "space": { "key": self.space },
                "body": { "storage": { "value": html, "representation": "storage" } },
            }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn update_page(&self, page: &ExistingPage, title: &str, html: &str) -> Result<Value> {
        let resp = self
            .http
            .put(format!("{}{CONTENT_API}/{}", self.base_url, page.id))
            .basic_auth(&self.user_email, Some(&self.api_token))
            .json(&json!({
                "id": page.id,
                "type": "page",
                "title": title,
                "version": { "number": page.version + 1 },
                "body": { "storage": { "value": html, "representation": "storage" } },
            }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    fn page_url(&self, page: &Value) -> Result<String> {
        let webui = page["_links"]["webui"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Confluence response has no page link"))?;
        let base = page["_links"]["base"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/wiki", self.base_url));
        Ok(format!("{base}{webui}"))
    }
}

/// Storage-format body: a heading, then one preformatted block per snippet.
pub fn render_page(title: &str, snippets: &[Snippet]) -> String {
    let mut html = format!(
        "<h1>Research Log: {}</h1><p>Raw insights captured via InsightVault.</p><hr/>",
        escape_html(title)
    );
    for (i, snippet) in snippets.iter().enumerate() {
        html.push_str(&format!(
            "<h3>Entry #{}</h3><pre style='background: #f4f4f4; padding: 10px; border-radius: 5px;'>{}</pre><hr/>",
            i + 1,
            escape_html(&snippet.content)
        ));
    }
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("Confluence request failed ({status}): {}", body.trim())
}
