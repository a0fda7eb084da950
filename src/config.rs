use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityOverride>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    pub app_id: String,
    pub version_id: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_key_env")]
    pub key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_path() -> String {
    "luis/authoring/v3.0-preview".to_string()
}
fn default_schema_version() -> String {
    "7.0.0".to_string()
}
fn default_key_env() -> String {
    "LUIS_AUTHORING_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

impl ProviderConfig {
    /// Base URL for authoring requests, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.api_path.trim_matches('/')
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on status polls. `None` waits indefinitely.
    #[serde(default)]
    pub max_polls: Option<u32>,
    /// Publish to the production slot instead of staging.
    #[serde(default)]
    pub production: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_polls: None,
            production: false,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl TrainingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Registry entry declared in `[entities.<type_id>]`.
#[derive(Debug, Deserialize, Clone)]
pub struct EntityOverride {
    #[serde(default = "default_provider_supported")]
    pub provider_supported: bool,
    pub provider_name: Option<String>,
}

fn default_provider_supported() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let provider = &config.provider;

    if !(provider.endpoint.starts_with("http://") || provider.endpoint.starts_with("https://")) {
        anyhow::bail!(
            "provider.endpoint must be an http(s) URL, got '{}'",
            provider.endpoint
        );
    }
    if provider.app_id.trim().is_empty() {
        anyhow::bail!("provider.app_id must not be empty");
    }
    if provider.version_id.trim().is_empty() {
        anyhow::bail!("provider.version_id must not be empty");
    }
    if provider.key_env.trim().is_empty() {
        anyhow::bail!("provider.key_env must not be empty");
    }

    if config.training.poll_interval_ms == 0 {
        anyhow::bail!("training.poll_interval_ms must be > 0");
    }
    if config.training.max_polls == Some(0) {
        anyhow::bail!("training.max_polls must be >= 1 when set");
    }

    if config.corpus.include_globs.is_empty() {
        anyhow::bail!("corpus.include_globs must not be empty");
    }

    for (type_id, entry) in &config.entities {
        if entry.provider_supported && entry.provider_name.is_none() {
            anyhow::bail!(
                "entities.{}.provider_name is required when provider_supported = true",
                type_id
            );
        }
    }

    Ok(())
}
