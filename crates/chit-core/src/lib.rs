//! Chit Core Library
//!
//! Shared functionality for the chit receipt auditing tool:
//! - Pluggable multimodal chat backends (local Ollama, hosted Together.AI)
//! - Robust JSON extraction from mixed prose model replies
//! - File-per-record analysis history
//! - Streaming chat sessions with drain-to-commit semantics
//! - Analysis orchestration with atomic persistence
//! - Prompt library for customizable audit prompts

pub mod ai;
pub mod audit;
pub mod config;
pub mod error;
pub mod models;
pub mod prompts;
pub mod session;
pub mod store;

/// Test utilities including a mock model server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    BackendClient, ChatBackend, MockBackend, ModelRef, ModelReply, OllamaBackend, ReplyStream,
    TogetherBackend, HOSTED_PREFIX,
};
pub use audit::Auditor;
pub use config::Config;
pub use error::{Error, Result};
pub use models::{
    Analysis, AnalysisRecord, ChatTurn, ExtractedData, RecordSummary, Role, TokenUsage,
    UsageStats, ValidationResult,
};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use session::{Session, TurnStream};
pub use store::RecordStore;
