//! History listing and single-record display

use anyhow::{Context, Result};
use chit_core::RecordStore;

use super::truncate;

/// List saved analyses, newest first
pub fn cmd_history(store: &RecordStore) -> Result<()> {
    let summaries = store.list()?;

    if summaries.is_empty() {
        println!("No saved analyses in {}.", store.history_dir().display());
        println!();
        println!("Run one with: chit analyze <image>");
        return Ok(());
    }

    println!(
        "{:<46} {:<22} {:<18} {:>8} {:>9}",
        "ID", "MERCHANT", "MODEL", "TOKENS", "WALL"
    );
    println!("{}", "-".repeat(107));

    for summary in &summaries {
        // The listing already skips unreadable files; a record vanishing
        // between list and load is still possible, so tolerate here too.
        let record = match store.load(&summary.id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", summary.id, e);
                continue;
            }
        };

        let usage = &record.analysis.token_usage;
        let wall = record
            .timings
            .get("total_wall_time")
            .map(String::as_str)
            .unwrap_or("unknown");

        println!(
            "{:<46} {:<22} {:<18} {:>8} {:>9}",
            summary.id,
            truncate(&record.merchant, 20),
            truncate(&record.analysis.model_used, 16),
            usage.input + usage.output,
            wall
        );
    }

    println!();
    println!("{} saved analyses", summaries.len());

    Ok(())
}

/// Print one record as pretty JSON, dropping the image payload
pub fn cmd_show(store: &RecordStore, id: &str) -> Result<()> {
    let record = store
        .load(id)
        .with_context(|| format!("No saved analysis with id: {}", id))?;

    let mut doc = serde_json::to_value(&record)?;
    if let Some(map) = doc.as_object_mut() {
        map.remove("image_base64");
    }

    println!("Record: {}", record.id);
    println!("{}", serde_json::to_string_pretty(&doc)?);

    Ok(())
}
