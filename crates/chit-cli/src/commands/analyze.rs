//! Analyze command implementation

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chit_core::{audit, Auditor, BackendClient, ChatBackend, PromptId, PromptLibrary, RecordStore};

/// Run the full analysis pipeline on a receipt image and print the findings
pub async fn cmd_analyze(
    client: &BackendClient,
    store: &RecordStore,
    image: &Path,
) -> Result<()> {
    let bytes = std::fs::read(image)
        .with_context(|| format!("Failed to read image: {}", image.display()))?;
    let image_base64 = STANDARD.encode(&bytes);

    println!("🔍 Analyzing receipt: {}", image.display());
    println!("   Model: {} @ {}", client.model(), client.host());
    println!("   History: {}", store.history_dir().display());

    // Warn when this exact photo already has an analysis on disk
    let hash = audit::image_hash(&image_base64);
    if !hash.is_empty() {
        if let Some(existing) = store.find_by_image_hash(&hash)? {
            println!();
            println!("ℹ️  This image was already analyzed: {}", existing);
            println!("   Continue with a fresh analysis, or revisit it with:");
            println!("   chit chat {} \"...\"", existing);
        }
    }

    let mut prompts = PromptLibrary::new();
    let prompt = prompts.get(PromptId::AuditReceipt)?;

    println!();
    println!("⏳ Waiting for the model...");

    let auditor = Auditor::new(client.clone(), store.clone());
    let record = auditor.run_analysis(&image_base64, &prompt.content).await?;

    let analysis = &record.analysis;

    if !analysis.auditor_scratchpad.is_empty() {
        println!();
        println!("--- Auditor's notes ---");
        println!("{}", analysis.auditor_scratchpad.trim());
    }

    println!();
    println!("--- Extracted fields ---");
    let data = &analysis.extracted_data;
    println!("   Merchant:  {}", data.merchant_name);
    println!("   Receipt #: {}", data.receipt_no);
    println!("   Amount:    {}", data.amount);
    println!("   Date:      {}", data.receipt_date);
    println!("   Location:  {}", data.location);

    println!();
    if analysis.fraud_suspected() {
        println!("🚨 Fraud suspected: {}", analysis.validation_result.conclusion);
    } else {
        println!("✅ Looks clean: {}", analysis.validation_result.conclusion);
    }
    if !analysis.validation_result.reasoning.is_empty() {
        println!("   {}", analysis.validation_result.reasoning);
    }

    let stats = &record.usage_stats;
    let wall = record
        .timings
        .get("total_wall_time")
        .map(String::as_str)
        .unwrap_or("unknown");
    println!();
    println!(
        "📊 {} tokens in / {} out, model time {}, wall {}",
        stats.prompt_tokens, stats.completion_tokens, stats.total_duration, wall
    );
    println!("💾 Saved as {}", record.id);
    println!();
    println!("Ask a follow-up with: chit chat {} \"...\"", record.id);

    Ok(())
}
