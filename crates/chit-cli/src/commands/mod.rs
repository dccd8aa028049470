//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Run the analysis pipeline on a receipt image
//! - `chat` - Follow-up conversation about a saved analysis
//! - `history` - History listing and single-record display
//! - `models` - Model listing and backend health checks

pub mod analyze;
pub mod chat;
pub mod history;
pub mod models;

// Re-export command functions for main.rs
pub use analyze::*;
pub use chat::*;
pub use history::*;
pub use models::*;

use std::path::Path;

use anyhow::{Context, Result};
use chit_core::{BackendClient, Config, ModelRef, RecordStore};

/// Load the configuration, applying the `--history` override when given
pub fn load_config(history_override: Option<&Path>) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(dir) = history_override {
        config.history_dir = dir.to_path_buf();
    }
    Ok(config)
}

/// Open the record store at the configured history directory
pub fn open_store(config: &Config) -> Result<RecordStore> {
    RecordStore::new(&config.history_dir).with_context(|| {
        format!(
            "Failed to open history directory: {}",
            config.history_dir.display()
        )
    })
}

/// Resolve a backend client for the requested model (or the configured default)
pub fn backend_for(config: &Config, model: Option<&str>) -> Result<BackendClient> {
    let model = ModelRef::parse(model.unwrap_or(&config.default_model));
    BackendClient::for_model(&model, config)
        .with_context(|| format!("Failed to set up backend for model: {}", model))
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
