use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default config directory: ~/.insightvault/
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".insightvault")
}

/// Default config file path: ~/.insightvault/settings.json
pub fn default_config_path() -> PathBuf {
    config_dir().join("settings.json")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub wiki: WikiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            agent: AgentSettings::default(),
            vault: VaultConfig::default(),
            wiki: WikiConfig::default(),
        }
    }
}

/// How the agent runtime is launched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    #[serde(default = "default_setting_sources")]
    pub setting_sources: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            cli_path: default_cli_path(),
            workspace: default_workspace(),
            allowed_tools: default_allowed_tools(),
            setting_sources: default_setting_sources(),
        }
    }
}

/// Supabase credentials for the notes table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub service_role_key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_role_key: None,
            table: default_table(),
        }
    }
}

/// Confluence credentials for publishing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WikiConfig {
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_space")]
    pub space: String,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            site_name: None,
            user_email: None,
            api_token: None,
            space: default_space(),
        }
    }
}

fn default_version() -> u32 {
    1
}
fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_cli_path() -> String {
    "claude".to_string()
}
fn default_workspace() -> String {
    "./".to_string()
}
fn default_allowed_tools() -> Vec<String> {
    ["Skill", "Bash", "Read", "Write"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_setting_sources() -> Vec<String> {
    vec!["project".to_string()]
}
fn default_table() -> String {
    "reading_notes".to_string()
}
fn default_space() -> String {
    "InsightVau".to_string()
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load the settings file if present, otherwise defaults, then apply env
    /// overrides. A `.env` in the working directory fills in variables the
    /// process environment does not set.
    pub fn resolve(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        let dotenv = read_env_file(Path::new(".env"))?;
        Ok(config.with_overrides_from(|key| {
            std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
        }))
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CLAUDE_CLI_PATH") {
            self.agent.cli_path = v;
        }
        if let Some(v) = get("INSIGHTVAULT_MODEL") {
            self.agent.model = v;
        }
        if let Some(v) = get("SUPABASE_URL") {
            self.vault.url = Some(v);
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.vault.service_role_key = Some(v);
        }
        if let Some(v) = get("ATLASSIAN_SITE_NAME") {
            self.wiki.site_name = Some(v);
        }
        if let Some(v) = get("ATLASSIAN_USER_EMAIL") {
            self.wiki.user_email = Some(v);
        }
        if let Some(v) = get("ATLASSIAN_API_TOKEN") {
            self.wiki.api_token = Some(v);
        }
        if let Some(v) = get("CONFLUENCE_SPACE") {
            self.wiki.space = v;
        }
        self
    }
}

/// Variables declared in a dotenv file. A missing file yields none.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    dotenvy::from_path_iter(path)
        .and_then(|vars| vars.collect())
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))
}
