mod agent;
mod app;
mod clipboard;
mod cmd_config;
mod cmd_publish;
mod cmd_vault;
mod commands;
mod config;
mod console;
mod dispatch;
mod prompts;
mod protocol;
mod render;
mod repl;
mod session;
#[cfg(test)]
mod testing;
mod vault;
mod watcher;
mod wiki;

use std::future::Future;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cmd_vault::VaultAction;

#[derive(Parser)]
#[command(
    name = "insightvault",
    about = "Clipboard research capture with an agent-backed notes vault",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and write notes in the vault
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// Publish notes as a Confluence page (create or update by title)
    Publish {
        /// Page title
        title: String,
        /// JSON array of objects with a "content" field
        snippets_json: String,
        /// Confluence space key (default from config)
        #[arg(long)]
        space: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Create default settings.json
    Init,
    /// Show current configuration (secrets masked)
    Show,
    /// Set a config value (dot notation: vault.service_role_key)
    Set {
        /// Config key path
        key: String,
        /// Value to set
        value: String,
    },
    /// Print config file path
    Path,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix into the session transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = config::default_config_path();

    if let Some(Commands::Config { action }) = &cli.command {
        return cmd_config::run(action, &config_path);
    }

    let config = config::AppConfig::resolve(&config_path)?;
    info!("Config loaded");

    match cli.command {
        None => app::run_session(config).await,
        Some(Commands::Vault { action }) => {
            skill_entry(cmd_vault::run(&action, &config)).await
        }
        Some(Commands::Publish {
            title,
            snippets_json,
            space,
        }) => {
            skill_entry(cmd_publish::run(
                &title,
                &snippets_json,
                space.as_deref(),
                &config,
            ))
            .await
        }
        Some(Commands::Config { .. }) => Ok(()),
    }
}

/// Entry points called by the agent report failures as JSON on stderr and exit 1.
async fn skill_entry(fut: impl Future<Output = Result<()>>) -> Result<()> {
    if let Err(e) = fut.await {
        eprintln!(
            "{}",
            serde_json::json!({ "success": false, "error": format!("{e:#}") })
        );
        std::process::exit(1);
    }
    Ok(())
}
