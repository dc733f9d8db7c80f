use anyhow::Result;
use serde_json::json;

use crate::config::AppConfig;
use crate::wiki::{Snippet, WikiClient};

/// Publish a JSON array of `{content}` notes as one page titled `title`.
pub async fn run(title: &str, snippets_json: &str, space: Option<&str>, config: &AppConfig) -> Result<()> {
    let mut wiki = config.wiki.clone();
    if let Some(space) = space {
        wiki.space = space.to_string();
    }
    let client = WikiClient::from_config(&wiki)?;

    let snippets: Vec<Snippet> = serde_json::from_str(snippets_json)
        .map_err(|e| anyhow::anyhow!("Invalid snippets JSON: {e}"))?;
    let outcome = client.publish(title, &snippets).await?;

    println!(
        "{}",
        json!({
            "success": true,
            "action": outcome.action,
            "page_url": outcome.page_url,
        })
    );
    Ok(())
}
