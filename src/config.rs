//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/harvest.sqlite"
//!
//! [storage]
//! uploads_dir = "./uploads"
//!
//! [telegram]
//! # bot_token = "123:abc"        # or TELEGRAM_BOT_TOKEN
//! default_chat_id = "5247292298"
//! default_mode = "download"
//!
//! [sync]
//! page_size = 100
//!
//! [owner]
//! id = "user1"
//! name = "Demo User"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{Owner, StorageMode};

/// Environment variable consulted when no bot token is stored.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub owner: OwnerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Seeds the stored credential the first time sync state is created.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub default_chat_id: Option<String>,
    #[serde(default = "default_mode")]
    pub default_mode: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            bot_token: None,
            default_chat_id: None,
            default_mode: default_mode(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_mode() -> String {
    "download".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}
fn default_max_retries() -> u32 {
    2
}
/// Upper bound for the first retry delay; later delays double from it.
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

fn default_retry_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct OwnerConfig {
    #[serde(default = "default_owner_id")]
    pub id: String,
    #[serde(default = "default_owner_name")]
    pub name: String,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            id: default_owner_id(),
            name: default_owner_name(),
        }
    }
}

fn default_owner_id() -> String {
    "user1".to_string()
}
fn default_owner_name() -> String {
    "Demo User".to_string()
}

impl OwnerConfig {
    pub fn to_owner(&self) -> Owner {
        Owner {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            webhook_secret: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Storage mode new sync state starts with.
    pub fn default_storage_mode(&self) -> StorageMode {
        self.telegram
            .default_mode
            .parse()
            .unwrap_or(StorageMode::Download)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // getUpdates caps `limit` at 100
    if config.sync.page_size == 0 || config.sync.page_size > 100 {
        anyhow::bail!("sync.page_size must be in [1, 100]");
    }

    if config.sync.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
        anyhow::bail!(
            "sync.retry_backoff_ms must be <= {} (one minute)",
            MAX_RETRY_BACKOFF_MS
        );
    }

    if config.telegram.timeout_secs == 0 {
        anyhow::bail!("telegram.timeout_secs must be > 0");
    }

    if config.telegram.api_base.trim().is_empty() {
        anyhow::bail!("telegram.api_base must not be empty");
    }

    if config.owner.id.trim().is_empty() {
        anyhow::bail!("owner.id must not be empty");
    }

    config
        .telegram
        .default_mode
        .parse::<StorageMode>()
        .map_err(|e| anyhow::anyhow!("telegram.default_mode: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!(
            r#"
[db]
path = "/tmp/harvest.sqlite"

[storage]
uploads_dir = "/tmp/uploads"
{}
"#,
            extra
        );
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let config = parse("").unwrap();
        assert_eq!(config.sync.page_size, 100);
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.default_storage_mode(), StorageMode::Download);
        assert_eq!(config.owner.id, "user1");
        assert!(config.server.webhook_secret.is_none());
    }

    #[test]
    fn rejects_oversized_page() {
        let err = parse("[sync]\npage_size = 500\n").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn rejects_huge_retry_backoff() {
        let err = parse("[sync]\nretry_backoff_ms = 100000000000\n").unwrap_err();
        assert!(err.to_string().contains("retry_backoff_ms"));
        assert!(parse("[sync]\nretry_backoff_ms = 60000\n").is_ok());
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = parse("[telegram]\ndefault_mode = \"mirror\"\n").unwrap_err();
        assert!(err.to_string().contains("default_mode"));
    }

    #[test]
    fn accepts_reference_only_mode() {
        let config = parse("[telegram]\ndefault_mode = \"reference-only\"\n").unwrap();
        assert_eq!(config.default_storage_mode(), StorageMode::ReferenceOnly);
    }
}
