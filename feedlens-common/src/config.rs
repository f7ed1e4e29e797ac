//! Bootstrap configuration loading and resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (--config, --port, --database)
//! 2. Environment variables (FEEDLENS_*)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: the service starts on defaults and
//! logs a warning. A TOML file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG_PATH: &str = "FEEDLENS_CONFIG";
/// Environment variable overriding the database path
pub const ENV_DATABASE_PATH: &str = "FEEDLENS_DATABASE";
/// Environment variable overriding the HTTP port
pub const ENV_PORT: &str = "FEEDLENS_PORT";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5740;

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional; absent keys take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// Path to the SQLite database file
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    /// Language model endpoint
    pub llm: LlmConfig,
    /// Ingestion, search and clustering bounds
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG still wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Language model endpoint settings (OpenAI-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key; environment variables take precedence
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: crate::embedding::DEFAULT_EMBEDDING_DIMENSION,
            temperature: 0.3,
            max_tokens: 500,
            timeout_secs: 30,
        }
    }
}

/// Bounds applied by the ingestion gateway and retrieval facade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum feedback text length in characters
    pub max_text_chars: usize,
    /// CSV rows beyond this count are dropped
    pub csv_max_rows: usize,
    /// Larger CSV bodies are rejected outright
    pub csv_max_bytes: usize,
    /// Analyses in flight while processing one CSV batch
    pub analysis_concurrency: usize,
    /// Most recent items considered by a clustering rebuild
    pub cluster_window: usize,
    pub search_threshold: f32,
    pub search_limit: usize,
    pub search_max_limit: usize,
    /// Webhook bearer tokens shorter than this are rejected unseen
    pub webhook_min_token_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_chars: crate::models::MAX_TEXT_CHARS,
            csv_max_rows: 100,
            csv_max_bytes: 5 * 1024 * 1024,
            analysis_concurrency: 4,
            cluster_window: 200,
            search_threshold: 0.75,
            search_limit: 10,
            search_max_limit: 50,
            webhook_min_token_len: 32,
        }
    }
}

impl TomlConfig {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;

        if limits.max_text_chars == 0 || limits.max_text_chars > crate::models::MAX_TEXT_CHARS {
            return Err(Error::Config(format!(
                "limits.max_text_chars must be within 1..={}",
                crate::models::MAX_TEXT_CHARS
            )));
        }
        if limits.csv_max_rows == 0 {
            return Err(Error::Config("limits.csv_max_rows must be positive".to_string()));
        }
        if limits.csv_max_bytes == 0 {
            return Err(Error::Config("limits.csv_max_bytes must be positive".to_string()));
        }
        if limits.analysis_concurrency == 0 {
            return Err(Error::Config(
                "limits.analysis_concurrency must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&limits.search_threshold) {
            return Err(Error::Config(
                "limits.search_threshold must be within [0, 1]".to_string(),
            ));
        }
        if limits.search_limit == 0 || limits.search_limit > limits.search_max_limit {
            return Err(Error::Config(
                "limits.search_limit must be within 1..=limits.search_max_limit".to_string(),
            ));
        }
        if self.llm.embedding_dimension == 0 {
            return Err(Error::Config("llm.embedding_dimension must be positive".to_string()));
        }

        Ok(())
    }
}

/// Locate the configuration file
///
/// Order: explicit path → FEEDLENS_CONFIG → user config dir
/// (`~/.config/feedlens/config.toml` on Linux) → `/etc/feedlens/config.toml`.
/// An explicit path is returned even if it does not exist so the caller can
/// report it.
pub fn find_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("feedlens").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/feedlens/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration, falling back to defaults when no file exists
pub fn load_or_default(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let config = match find_config_file(cli_path) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)?
        }
        Some(path) => {
            warn!(
                "Configuration file {} not found, using built-in defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            warn!("No configuration file found, using built-in defaults");
            TomlConfig::default()
        }
    };

    config.validate()?;
    Ok(config)
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("feedlens").join("feedlens.db"))
        .unwrap_or_else(|| PathBuf::from("./feedlens_data/feedlens.db"))
}

/// Resolve the database path: CLI → FEEDLENS_DATABASE → TOML → default
pub fn resolve_database_path(cli_path: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    config
        .database_path
        .clone()
        .unwrap_or_else(default_database_path)
}

/// Resolve the HTTP port: CLI → FEEDLENS_PORT → TOML (which carries the default)
pub fn resolve_port(cli_port: Option<u16>, config: &TomlConfig) -> u16 {
    if let Some(port) = cli_port {
        return port;
    }

    match std::env::var(ENV_PORT) {
        Ok(value) => match value.trim().parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                warn!("Ignoring invalid {}='{}'", ENV_PORT, value);
                config.server.port
            }
        },
        Err(_) => config.server.port,
    }
}
