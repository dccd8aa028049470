//! Analysis orchestration
//!
//! Drives one receipt through the full pipeline: backend analysis, JSON
//! extraction, metadata injection, and the first save. The whole run is
//! atomic in the sense that a record reaches storage only if every stage
//! succeeded, so a failed analysis leaves no partial file behind.

use std::collections::BTreeMap;
use std::time::Instant;

use base64::Engine;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::ai::{parsing, BackendClient, ChatBackend};
use crate::error::Result;
use crate::models::{current_timestamp, Analysis, AnalysisRecord, UsageStats};
use crate::store::RecordStore;

/// Runs one-shot receipt analyses and persists the results.
pub struct Auditor {
    client: BackendClient,
    store: RecordStore,
}

impl Auditor {
    pub fn new(client: BackendClient, store: RecordStore) -> Self {
        Self { client, store }
    }

    /// Analyze a receipt image and persist the resulting record
    ///
    /// Stages: backend call, JSON extraction, metadata injection, save.
    /// Any failing stage aborts the run before anything is written.
    pub async fn run_analysis(
        &self,
        image_base64: &str,
        system_prompt: &str,
    ) -> Result<AnalysisRecord> {
        let started = Instant::now();
        let mut timings = BTreeMap::new();
        timings.insert("start".to_string(), wall_clock());

        debug!(
            "Starting analysis: model={} host={}",
            self.client.model(),
            self.client.host()
        );

        let api_started = Instant::now();
        let reply = self.client.analyze(image_base64, system_prompt).await?;
        timings.insert(
            "api_call_duration".to_string(),
            format!("{:.2}s", api_started.elapsed().as_secs_f64()),
        );

        let extraction = parsing::extract(&reply.message_content)?;

        // The model's document plus metadata only this side of the wire knows
        let mut document = extraction.json;
        document["model_used"] = json!(reply.model_used);
        document["token_usage"] = json!({
            "input": reply.prompt_tokens,
            "output": reply.completion_tokens,
        });
        document["auditor_scratchpad"] = json!(extraction.scratchpad);

        let analysis: Analysis = serde_json::from_value(document)?;

        timings.insert("end".to_string(), wall_clock());
        timings.insert(
            "total_wall_time".to_string(),
            format!("{:.2}s", started.elapsed().as_secs_f64()),
        );

        let mut record = AnalysisRecord {
            id: String::new(),
            timestamp: current_timestamp(),
            merchant: analysis.merchant_display().to_string(),
            image_base64: image_base64.to_string(),
            image_sha256: image_hash(image_base64),
            analysis,
            chat_history: Vec::new(),
            usage_stats: UsageStats::from_reply(&reply),
            timings,
        };

        let id = self.store.save(&mut record)?;
        info!("Analysis complete: {}", id);
        Ok(record)
    }
}

/// Local wall-clock time as HH:MM:SS, for the timing checkpoints.
fn wall_clock() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// SHA-256 of the decoded image bytes, hex encoded
///
/// Empty when the input is not valid base64; the hash only spots repeat
/// analyses, so it never fails the pipeline.
pub fn image_hash(image_base64: &str) -> String {
    match base64::engine::general_purpose::STANDARD.decode(image_base64) {
        Ok(bytes) => hex::encode(Sha256::digest(&bytes)),
        Err(_) => String::new(),
    }
}
