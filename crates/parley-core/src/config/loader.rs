//! Config loader: reads `~/.parley/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.parley/config.json`
//! 3. Environment variables `PARLEY_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Provider names accepted in `PARLEY_PROVIDERS__<NAME>__API_BASE`.
const PROVIDER_ENV_NAMES: &[&str] = &[
    "openai",
    "anthropic",
    "gemini",
    "groq",
    "deepseek",
    "mistral",
    "openrouter",
];

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `PARLEY_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `PARLEY_DEFAULTS__MODELS` → `defaults.models` (comma-separated)
/// - `PARLEY_DEFAULTS__TEMPERATURE` → `defaults.temperature`
/// - `PARLEY_DEFAULTS__MAX_TOKENS` → `defaults.max_tokens`
/// - `PARLEY_DEFAULTS__PRESET` → `defaults.preset`
/// - `PARLEY_PROVIDERS__<NAME>__API_BASE` → `providers.<name>.api_base`
/// - `PARLEY_ORCHESTRATOR__TASK_TIMEOUT_SECS` → `orchestrator.task_timeout_secs`
/// - `PARLEY_ROUTING__AUTO_ROUTE` → `routing.auto_route`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("PARLEY_DEFAULTS__MODELS") {
        config.defaults.models = parse_model_list(&val);
    }
    if let Ok(val) = std::env::var("PARLEY_DEFAULTS__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.defaults.temperature = t;
        }
    }
    if let Ok(val) = std::env::var("PARLEY_DEFAULTS__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.defaults.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("PARLEY_DEFAULTS__PRESET") {
        config.defaults.preset = Some(val).filter(|p| !p.is_empty());
    }

    for name in PROVIDER_ENV_NAMES {
        let var = format!("PARLEY_PROVIDERS__{}__API_BASE", name.to_uppercase());
        if let Ok(val) = std::env::var(&var) {
            if let Some(provider) = config.providers.get_by_name_mut(name) {
                provider.api_base = Some(val);
            }
        }
    }

    if let Ok(val) = std::env::var("PARLEY_ORCHESTRATOR__TASK_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.orchestrator.task_timeout_secs = Some(n);
        }
    }

    if let Ok(val) = std::env::var("PARLEY_ROUTING__AUTO_ROUTE") {
        config.routing.auto_route = val == "true" || val == "1";
    }

    config
}

/// Split a comma-separated model list, dropping blanks.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
