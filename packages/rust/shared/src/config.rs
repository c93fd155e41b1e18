//! Application configuration for hrlex.
//!
//! User config lives at `~/.hrlex/hrlex.toml`. CLI flags override config
//! file values, which override defaults. API keys are never stored in the
//! file; the config only names the environment variable that holds them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HrlexError, Result};
use crate::types::{Jurisdiction, SeedUrl, DEFAULT_EMBEDDING_DIMENSIONS};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "hrlex.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".hrlex";

// ---------------------------------------------------------------------------
// Config structs (matching hrlex.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenAI-compatible API settings (embeddings + ranking).
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Ingestion pacing and bounds.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Seed URL overrides; the built-in registry is used when empty.
    #[serde(default)]
    pub seeds: Vec<SeedUrl>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Deployment jurisdiction applied to all ingested passages.
    #[serde(default)]
    pub jurisdiction: Jurisdiction,

    /// Path to the passage database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            jurisdiction: Jurisdiction::default(),
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.hrlex/passages.db".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Embedding model or deployment name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensionality, fixed for the whole store at ingestion time.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Chat model used for listwise reranking.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            chat_model: default_chat_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "HRLEX_OPENAI_API_KEY".into()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}

/// `[ingest]` section: pacing and bounds for seeding and the real-time
/// fallback. Delays exist for politeness toward upstream sites and the
/// embedding service; tests zero them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum new URLs fetched per real-time fallback invocation.
    #[serde(default = "default_max_realtime_urls")]
    pub max_realtime_urls: usize,

    /// Delay between URL fetches in the fallback, in ms.
    #[serde(default = "default_url_delay_ms")]
    pub url_delay_ms: u64,

    /// Delay between per-chunk embedding calls in the fallback, in ms.
    #[serde(default = "default_embed_delay_ms")]
    pub embed_delay_ms: u64,

    /// Delay between per-chunk embedding calls during batch seeding, in ms.
    #[serde(default = "default_seed_delay_ms")]
    pub seed_delay_ms: u64,

    /// Minimum extracted-text length; shorter pages are extraction failures.
    #[serde(default = "default_min_extract_chars")]
    pub min_extract_chars: usize,

    /// Chunk size bound in characters (~1000 tokens).
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Staleness window in days; older rows are purged on refresh.
    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_realtime_urls: default_max_realtime_urls(),
            url_delay_ms: default_url_delay_ms(),
            embed_delay_ms: default_embed_delay_ms(),
            seed_delay_ms: default_seed_delay_ms(),
            min_extract_chars: default_min_extract_chars(),
            max_chunk_chars: default_max_chunk_chars(),
            staleness_days: default_staleness_days(),
        }
    }
}

fn default_max_realtime_urls() -> usize {
    2
}
fn default_url_delay_ms() -> u64 {
    2000
}
fn default_embed_delay_ms() -> u64 {
    500
}
fn default_seed_delay_ms() -> u64 {
    1000
}
fn default_min_extract_chars() -> usize {
    100
}
fn default_max_chunk_chars() -> usize {
    3000
}
fn default_staleness_days() -> i64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.hrlex/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HrlexError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.hrlex/hrlex.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HrlexError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HrlexError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HrlexError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HrlexError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HrlexError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the API key from the env var named in config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(HrlexError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(config).map(|_| ())
}

/// Expand a leading `~/` in a configured path against the user's home.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| HrlexError::config("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("jurisdiction"));
        assert!(toml_str.contains("HRLEX_OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.ingest.max_realtime_urls, 2);
        assert_eq!(parsed.openai.embedding_dimensions, 1536);
        assert_eq!(parsed.ingest.staleness_days, 30);
    }

    #[test]
    fn config_with_seeds() {
        let toml_str = r#"
[defaults]
jurisdiction = "UK"

[[seeds]]
url = "https://www.gov.uk/holiday-entitlement-rights"
topic = "Holiday"
title = "Holiday entitlement"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.seeds.len(), 1);
        assert_eq!(config.seeds[0].topic, crate::types::Topic::Holiday);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openai.api_key_env = "HRLEX_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn expand_home_passthrough() {
        let p = expand_home("/var/db/passages.db").unwrap();
        assert_eq!(p, PathBuf::from("/var/db/passages.db"));
    }
}
