//! Chit CLI - Receipt fraud auditor
//!
//! Usage:
//!   chit analyze receipt.jpg        Audit a receipt photo
//!   chit chat <id> "question"       Ask a follow-up about a saved analysis
//!   chit history                    List saved analyses
//!   chit show <id>                  Dump one record as JSON
//!   chit models                     List available models

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.history.as_deref())?;

    match cli.command {
        Commands::Analyze { image, model } => {
            let client = commands::backend_for(&config, model.as_deref())?;
            let store = commands::open_store(&config)?;
            commands::cmd_analyze(&client, &store, &image).await
        }
        Commands::Chat { id, message, model } => {
            let client = commands::backend_for(&config, model.as_deref())?;
            let store = commands::open_store(&config)?;
            commands::cmd_chat(&client, &store, &id, &message).await
        }
        Commands::History => {
            let store = commands::open_store(&config)?;
            commands::cmd_history(&store)
        }
        Commands::Show { id } => {
            let store = commands::open_store(&config)?;
            commands::cmd_show(&store, &id)
        }
        Commands::Models => commands::cmd_models(&config).await,
    }
}
