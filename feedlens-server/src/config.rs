//! Language model credential resolution
//!
//! Priority: FEEDLENS_LLM_API_KEY → OPENAI_API_KEY → TOML `llm.api_key`.
//! No key is not an error: analysis then runs on the keyword fallback only.

use feedlens_common::config::TomlConfig;
use tracing::{info, warn};

pub const ENV_LLM_API_KEY: &str = "FEEDLENS_LLM_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| is_valid_key(k))
}

/// Resolve the API key for the model endpoint
pub fn resolve_llm_api_key(toml_config: &TomlConfig) -> Option<String> {
    let candidates = [
        (ENV_LLM_API_KEY, env_key(ENV_LLM_API_KEY)),
        (ENV_OPENAI_API_KEY, env_key(ENV_OPENAI_API_KEY)),
        (
            "TOML config",
            toml_config.llm.api_key.clone().filter(|k| is_valid_key(k)),
        ),
    ];

    let found: Vec<&str> = candidates
        .iter()
        .filter(|(_, key)| key.is_some())
        .map(|(source, _)| *source)
        .collect();

    if found.len() > 1 {
        warn!(
            "LLM API key found in multiple sources: {}. Using {}.",
            found.join(", "),
            found[0]
        );
    }

    match candidates.into_iter().find_map(|(source, key)| key.map(|k| (source, k))) {
        Some((source, key)) => {
            info!("LLM API key loaded from {}", source);
            Some(key.trim().to_string())
        }
        None => {
            warn!("No LLM API key configured; analysis will use keyword fallback only");
            None
        }
    }
}
