//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chit - Receipt fraud auditor
#[derive(Parser)]
#[command(name = "chit")]
#[command(about = "Audit receipt photos for fraud with a multimodal model", long_about = None)]
#[command(version)]
pub struct Cli {
    /// History directory for saved analyses
    ///
    /// Overrides the configured directory (default: receipt_history).
    #[arg(long, global = true)]
    pub history: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a receipt photo for fraud signals
    Analyze {
        /// Image file to analyze (JPEG or PNG)
        image: PathBuf,

        /// Model to use. Local Ollama models by name ("qwen2.5-vl:3b"),
        /// hosted models with the "Together.AI/" prefix.
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Ask a follow-up question about a saved analysis
    Chat {
        /// Record id (see `chit history`)
        id: String,

        /// Your question
        message: String,

        /// Model to use (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List saved analyses
    History,

    /// Print one record as JSON (image payload omitted)
    Show {
        /// Record id (see `chit history`)
        id: String,
    },

    /// List available models and check backend health
    Models,
}
