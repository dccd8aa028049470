//! Runtime configuration
//!
//! Settings are resolved in three layers, later layers winning:
//! 1. Built-in defaults (local Ollama on localhost, Together.AI endpoint)
//! 2. `config.toml` in the data dir (~/.local/share/chit/config.toml)
//! 3. Environment variables (`OLLAMA_HOST`, `TOGETHER_API_URL`,
//!    `TOGETHER_API_KEY`, `CHIT_MODEL`, `CHIT_HISTORY_DIR`)

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default local backend host.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Default hosted chat-completions endpoint.
pub const DEFAULT_TOGETHER_URL: &str = "https://api.together.xyz/v1/chat/completions";

/// Default vision model for analysis.
pub const DEFAULT_MODEL: &str = "qwen2.5-vl:3b";

/// Hosted model offered alongside whatever the local backend reports.
pub const DEFAULT_HOSTED_MODEL: &str = "Together.AI/google/gemma-3n-E4B-it";

/// Default history directory, relative to the working directory.
pub const DEFAULT_HISTORY_DIR: &str = "receipt_history";

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local backend base URL.
    pub ollama_host: String,
    /// Hosted backend chat-completions URL.
    pub together_url: String,
    /// Bearer key for the hosted backend; hosted calls fail without one.
    pub together_api_key: Option<String>,
    /// Model used when the caller does not pick one.
    pub default_model: String,
    /// Where analysis records are stored.
    pub history_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            together_url: DEFAULT_TOGETHER_URL.to_string(),
            together_api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
        }
    }
}

/// On-disk shape of `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    ollama_host: Option<String>,
    together_url: Option<String>,
    together_api_key: Option<String>,
    default_model: Option<String>,
    history_dir: Option<PathBuf>,
}

impl Config {
    /// Load config from the default data-dir location plus env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from an explicit TOML file, without env overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(raw)?;
        let defaults = Self::default();
        Ok(Self {
            ollama_host: file.ollama_host.unwrap_or(defaults.ollama_host),
            together_url: file.together_url.unwrap_or(defaults.together_url),
            together_api_key: file.together_api_key,
            default_model: file.default_model.unwrap_or(defaults.default_model),
            history_dir: file.history_dir.unwrap_or(defaults.history_dir),
        })
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                self.ollama_host = host;
            }
        }
        if let Ok(url) = std::env::var("TOGETHER_API_URL") {
            if !url.is_empty() {
                self.together_url = url;
            }
        }
        if let Ok(key) = std::env::var("TOGETHER_API_KEY") {
            if !key.is_empty() {
                self.together_api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("CHIT_MODEL") {
            if !model.is_empty() {
                self.default_model = model;
            }
        }
        if let Ok(dir) = std::env::var("CHIT_HISTORY_DIR") {
            if !dir.is_empty() {
                self.history_dir = PathBuf::from(dir);
            }
        }
    }
}

/// Default config file location (~/.local/share/chit/config.toml).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("chit").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ollama_host, DEFAULT_OLLAMA_HOST);
        assert_eq!(config.together_url, DEFAULT_TOGETHER_URL);
        assert_eq!(config.default_model, "qwen2.5-vl:3b");
        assert!(config.together_api_key.is_none());
        assert_eq!(config.history_dir, PathBuf::from("receipt_history"));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = Config::from_toml(
            r#"
            ollama_host = "http://10.0.0.5:11434"
            default_model = "llava-phi3"
            "#,
        )
        .unwrap();
        assert_eq!(config.ollama_host, "http://10.0.0.5:11434");
        assert_eq!(config.default_model, "llava-phi3");
        // Unset keys keep their defaults
        assert_eq!(config.together_url, DEFAULT_TOGETHER_URL);
    }

    #[test]
    fn test_from_toml_full() {
        let config = Config::from_toml(
            r#"
            ollama_host = "http://box:11434"
            together_url = "https://example.test/v1/chat/completions"
            together_api_key = "tgp_test"
            default_model = "qwen2.5-vl:7b"
            history_dir = "/tmp/receipts"
            "#,
        )
        .unwrap();
        assert_eq!(config.together_api_key.as_deref(), Some("tgp_test"));
        assert_eq!(config.history_dir, PathBuf::from("/tmp/receipts"));
    }

    #[test]
    fn test_from_toml_rejects_bad_syntax() {
        assert!(Config::from_toml("ollama_host = [not toml").is_err());
    }
}
