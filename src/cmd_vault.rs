use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use crate::config::AppConfig;
use crate::vault::{NewNote, VaultClient};

/// Note storage commands, invoked by the agent's capture skill.
#[derive(Subcommand)]
pub enum VaultAction {
    /// Save a raw note under a topic
    Insert {
        /// Note text, stored as-is
        content: String,
        /// Topic to file the note under
        topic: String,
        /// Short label for the note
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Print all topics as a JSON array
    List,
    /// Print all notes under a topic as a JSON array
    Notes {
        /// Topic to fetch
        topic: String,
    },
}

pub async fn run(action: &VaultAction, config: &AppConfig) -> Result<()> {
    let client = VaultClient::from_config(&config.vault)?;

    match action {
        VaultAction::Insert {
            content,
            topic,
            tag,
        } => {
            let note = NewNote::new(content, topic, tag.as_deref());
            let rows = client.insert_note(&note).await?;
            println!("{}", json!({ "success": true, "data": rows }));
        }
        VaultAction::List => {
            let topics = client.fetch_topics().await?;
            println!("{}", serde_json::to_string(&topics)?);
        }
        VaultAction::Notes { topic } => {
            let notes = client.notes_for_topic(topic).await?;
            println!("{}", serde_json::to_string(&notes)?);
        }
    }
    Ok(())
}
