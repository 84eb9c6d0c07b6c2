//! Configuration types and loading.
//!
//! Config is loaded from an optional JSON file (e.g. `~/.relaybot/config.json`), then a `.env`
//! file in the working directory, then environment variables (which win).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Discord bot settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Remote AnythingLLM workspace settings.
    #[serde(default)]
    pub anythingllm: AnythingLlmConfig,

    /// Extensions loaded at startup (default: `["ai"]`).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord: DiscordConfig::default(),
            anythingllm: AnythingLlmConfig::default(),
            extensions: default_extensions(),
        }
    }
}

/// Discord token, command prefix and optional test guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Bot token. Overridden by DISCORD_TOKEN env.
    pub token: Option<String>,

    /// Command prefix (default "!"). Messages starting with it are never relayed.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Guild used while testing; 0 means none.
    #[serde(default)]
    pub test_guild_id: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            prefix: default_prefix(),
            test_guild_id: 0,
        }
    }
}

/// AnythingLLM host, API key and workspace slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnythingLlmConfig {
    /// Server root, e.g. `http://localhost:3001/api`.
    pub host: Option<String>,

    pub api_key: Option<String>,

    /// Workspace slug to chat with (default "default"). Falls back to the first remote workspace when absent.
    #[serde(default = "default_workspace_slug")]
    pub workspace_slug: String,
}

impl Default for AnythingLlmConfig {
    fn default() -> Self {
        Self {
            host: None,
            api_key: None,
            workspace_slug: default_workspace_slug(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_workspace_slug() -> String {
    "default".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["ai".to_string()]
}

impl Config {
    /// Check that every setting without a default is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.token.is_none() {
            return Err(ConfigError::Missing("DISCORD_TOKEN"));
        }
        if self.anythingllm.host.is_none() {
            return Err(ConfigError::Missing("ANYTHINGLLM_HOST"));
        }
        if self.anythingllm.api_key.is_none() {
            return Err(ConfigError::Missing("ANYTHINGLLM_API_KEY"));
        }
        Ok(())
    }

    /// Test guild id, if one is configured.
    pub fn test_guild(&self) -> Option<u64> {
        Some(self.discord.test_guild_id).filter(|id| *id != 0)
    }

    /// Apply environment overrides through `lookup` (the process env in production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        if let Some(v) = get("DISCORD_TOKEN") {
            self.discord.token = Some(v);
        }
        if let Some(v) = get("DISCORD_PREFIX") {
            self.discord.prefix = v;
        }
        if let Some(v) = get("DISCORD_TEST_GUILD_ID") {
            match v.parse() {
                Ok(id) => self.discord.test_guild_id = id,
                Err(_) => log::warn!("ignoring invalid DISCORD_TEST_GUILD_ID: {}", v),
            }
        }
        if let Some(v) = get("ANYTHINGLLM_HOST") {
            self.anythingllm.host = Some(v);
        }
        if let Some(v) = get("ANYTHINGLLM_API_KEY") {
            self.anythingllm.api_key = Some(v);
        }
        if let Some(v) = get("ANYTHINGLLM_WORKSPACE_SLUG") {
            self.anythingllm.workspace_slug = v;
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAYBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relaybot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Read a JSON config file. Missing file => default config.
pub fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

/// Load config from the default path (or RELAYBOT_CONFIG_PATH), then `.env`, then the environment.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>, env_file: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = read_config_file(&path)?;

    let loaded = match env_file {
        Some(p) => dotenvy::from_path(&p)
            .map(|_| Some(p.clone()))
            .with_context(|| format!("loading env file {}", p.display()))?,
        None => dotenvy::dotenv().ok(),
    };
    if let Some(p) = loaded {
        log::debug!("loaded environment from {}", p.display());
    }

    config.apply_env(|key| std::env::var(key).ok());
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.discord.prefix, "!");
        assert_eq!(config.anythingllm.workspace_slug, "default");
        assert_eq!(config.test_guild(), None);
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.discord.prefix, "!");
        assert_eq!(config.extensions, vec!["ai".to_string()]);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = serde_json::from_str(
            r#"{"discord":{"prefix":"?"},"anythingllm":{"host":"http://file"}}"#,
        )
        .unwrap();
        let vars = env(&[
            ("DISCORD_TOKEN", "tok"),
            ("ANYTHINGLLM_HOST", "http://env/api"),
            ("ANYTHINGLLM_API_KEY", " key "),
            ("ANYTHINGLLM_WORKSPACE_SLUG", "team"),
            ("DISCORD_TEST_GUILD_ID", "42"),
        ]);
        config.apply_env(|k| vars.get(k).cloned());
        assert_eq!(config.discord.token.as_deref(), Some("tok"));
        assert_eq!(config.discord.prefix, "?");
        assert_eq!(config.anythingllm.host.as_deref(), Some("http://env/api"));
        assert_eq!(config.anythingllm.api_key.as_deref(), Some("key"));
        assert_eq!(config.anythingllm.workspace_slug, "team");
        assert_eq!(config.test_guild(), Some(42));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_guild_id_is_ignored() {
        let mut config = Config::default();
        let vars = env(&[("DISCORD_TEST_GUILD_ID", "abc")]);
        config.apply_env(|k| vars.get(k).cloned());
        assert_eq!(config.discord.test_guild_id, 0);
    }

    #[test]
    fn validate_reports_first_missing_setting() {
        let mut config = Config::default();
        assert_eq!(config.validate(), Err(ConfigError::Missing("DISCORD_TOKEN")));
        config.discord.token = Some("t".into());
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("ANYTHINGLLM_HOST"))
        );
        config.anythingllm.host = Some("h".into());
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("ANYTHINGLLM_API_KEY"))
        );
    }

    #[test]
    fn missing_config_file_is_default() {
        let path = std::env::temp_dir().join("relaybot-no-such-config.json");
        let config = read_config_file(&path).unwrap();
        assert_eq!(config.discord.prefix, "!");
    }
}
