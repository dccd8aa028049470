//! Domain models for chit
//!
//! `AnalysisRecord` is the unit of persistence: one receipt photo, the
//! model's structured findings, and any follow-up conversation, stored as a
//! single JSON document. Everything else here is a piece of that record.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ai::types::ModelReply;

/// Timestamp layout used for record ids and the `timestamp` field.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%y-%H%M";

/// Current local time in record-timestamp form (`DD-MM-YY-HHMM`).
pub fn current_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// One persisted receipt analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Storage key, `<timestamp>-<sanitized merchant>`. Lives in the filename,
    /// not the document; re-derived on load.
    #[serde(skip)]
    pub id: String,
    /// Creation/last-save time, `DD-MM-YY-HHMM`. Refreshed on every re-save;
    /// the id keeps the creation stamp.
    pub timestamp: String,
    /// Display merchant, may be "Unknown".
    pub merchant: String,
    /// Receipt photo, base64. Immutable after creation.
    pub image_base64: String,
    /// SHA-256 of the raw image bytes, hex; spots repeat analyses of one photo.
    #[serde(default)]
    pub image_sha256: String,
    /// The model's findings plus injected metadata.
    pub analysis: Analysis,
    /// Follow-up conversation, in turn order. Even length after every
    /// completed turn.
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
    pub usage_stats: UsageStats,
    /// Named wall-clock checkpoints recorded during the analysis.
    #[serde(default)]
    pub timings: BTreeMap<String, String>,
}

/// The JSON document the model produced, after metadata injection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    pub extracted_data: ExtractedData,
    pub validation_result: ValidationResult,
    /// Free-text reasoning the model emitted before its JSON block, verbatim.
    pub auditor_scratchpad: String,
    pub model_used: String,
    pub token_usage: TokenUsage,
    /// Anything else the model chose to emit alongside the known keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Analysis {
    /// Loose fraud signal: the model's free-text conclusion mentions
    /// "yes" or "fraud" in any casing. The conclusion is unstructured by
    /// contract, so this stays a substring check rather than an enum.
    pub fn fraud_suspected(&self) -> bool {
        let verdict = self.validation_result.conclusion.to_lowercase();
        verdict.contains("yes") || verdict.contains("fraud")
    }

    /// Merchant name for display, falling back to "Unknown".
    pub fn merchant_display(&self) -> &str {
        let name = self.extracted_data.merchant_name.trim();
        if name.is_empty() {
            "Unknown"
        } else {
            name
        }
    }
}

/// Fields the model reads off the receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedData {
    pub merchant_name: String,
    pub receipt_no: String,
    /// Decimal string exactly as printed on the receipt, never a rounded
    /// float. Models occasionally emit a bare number here; it is coerced
    /// back to its string form.
    #[serde(deserialize_with = "stringly")]
    pub amount: String,
    pub receipt_date: String,
    pub location: String,
}

/// The model's verdict on the receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationResult {
    pub reasoning: String,
    /// Free text, expected to carry an affirmative/negative fraud signal.
    pub conclusion: String,
}

/// Prompt/completion token counts as injected into the analysis document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// Per-analysis usage figures, pre-formatted for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// "1.23s"-style seconds, or "unknown" when the backend reported nothing.
    pub eval_duration: String,
    pub prompt_eval_duration: String,
    pub total_duration: String,
}

impl UsageStats {
    /// Build display-ready stats from a normalized backend reply.
    pub fn from_reply(reply: &ModelReply) -> Self {
        Self {
            model: reply.model_used.clone(),
            prompt_tokens: reply.prompt_tokens,
            completion_tokens: reply.completion_tokens,
            eval_duration: format_duration_ns(reply.eval_duration_ns),
            prompt_eval_duration: format_duration_ns(reply.prompt_eval_duration_ns),
            total_duration: format_duration_ns(reply.total_duration_ns),
        }
    }
}

/// Nanoseconds as "1.23s", or "unknown" for zero (backends that report no
/// durations send zeros).
pub fn format_duration_ns(ns: u64) -> String {
    if ns == 0 {
        "unknown".to_string()
    } else {
        format!("{:.2}s", ns as f64 / 1e9)
    }
}

/// One message in a record's follow-up conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Who spoke a chat turn. System prompts never land in the history, so
/// there is no system variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub timestamp: String,
    pub merchant: String,
}

/// Accept a JSON string, number, or bool and keep it as a string.
fn stringly<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Bool(bool),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Bool(b) => b.to_string(),
    })
}
