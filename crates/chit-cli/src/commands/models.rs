//! Model listing and backend health checks

use std::io::{self, Write};

use anyhow::Result;
use chit_core::config::{DEFAULT_HOSTED_MODEL, DEFAULT_MODEL};
use chit_core::{ChatBackend, Config, ModelRef, OllamaBackend};

/// List local models via the Ollama tags endpoint plus the hosted suggestion
pub async fn cmd_models(config: &Config) -> Result<()> {
    let default_model = ModelRef::parse(&config.default_model);
    // Pull hints should name a local model even when the default is hosted
    let local_name = if default_model.is_hosted() {
        DEFAULT_MODEL
    } else {
        default_model.name()
    };
    let backend = OllamaBackend::from_config(config, local_name);

    print!("🔍 Checking local backend at {} ... ", config.ollama_host);
    io::stdout().flush()?;

    if backend.health_check().await {
        println!("✅ up");

        let models = backend.list_models().await?;
        println!();
        if models.is_empty() {
            println!("No local models installed. Pull a vision model with:");
            println!("  ollama pull {}", local_name);
        } else {
            println!("Local models:");
            for name in &models {
                let marker = if !default_model.is_hosted() && name == default_model.name() {
                    "  (default)"
                } else {
                    ""
                };
                println!("  - {}{}", name, marker);
            }
        }
    } else {
        println!("❌ down");
        println!();
        println!("⚠️  Could not reach Ollama at {}", config.ollama_host);
        println!();
        println!("To set up the local backend:");
        println!("  1. Install Ollama: https://ollama.ai/download");
        println!("  2. Start the server: ollama serve");
        println!("  3. Pull a vision model: ollama pull {}", local_name);
        println!("  4. Point chit at it: export OLLAMA_HOST={}", config.ollama_host);
    }

    println!();
    println!("Hosted models (need TOGETHER_API_KEY):");
    let hosted_marker = if config.default_model == DEFAULT_HOSTED_MODEL {
        "  (default)"
    } else {
        ""
    };
    println!("  - {}{}", DEFAULT_HOSTED_MODEL, hosted_marker);
    match config.together_api_key {
        Some(_) => println!("  API key: set"),
        None => println!("  API key: not set"),
    }

    Ok(())
}
