//! Mock backend for testing
//!
//! Returns scripted replies for analysis and chat without a running model
//! server. Tests configure the reply text, the chat deltas, and whether
//! calls should fail.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::ChatTurn;

use super::types::{ModelReply, ReplyStream};
use super::ChatBackend;

/// Default analysis reply: scratchpad prose followed by a fenced verdict.
const DEFAULT_ANALYSIS_REPLY: &str = r#"Let me work through this receipt.
The merchant line reads "Blue Bottle Coffee" and the printed total is $12.40.
The date formatting is consistent and the arithmetic checks out.

```json
{
  "extracted_data": {
    "merchant_name": "Blue Bottle Coffee",
    "receipt_no": "R-1138",
    "amount": "12.40",
    "receipt_date": "2025-03-14",
    "location": "Oakland, CA"
  },
  "validation_result": {
    "reasoning": "Totals are arithmetically consistent and the layout matches a standard register template.",
    "conclusion": "No"
  }
}
```"#;

/// Mock chat backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    analysis_reply: Option<String>,
    chat_deltas: Vec<String>,
    fail_analyze: bool,
    fail_chat: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            analysis_reply: None,
            chat_deltas: vec![
                "The totals on ".to_string(),
                "this receipt ".to_string(),
                "are consistent.".to_string(),
            ],
            fail_analyze: false,
            fail_chat: false,
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Script the raw analysis reply
    pub fn with_analysis_reply(mut self, reply: &str) -> Self {
        self.analysis_reply = Some(reply.to_string());
        self
    }

    /// Script the chat deltas, one stream item per entry
    pub fn with_chat_deltas(mut self, deltas: &[&str]) -> Self {
        self.chat_deltas = deltas.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Make analyze calls fail as if the server were down
    pub fn with_analyze_failure(mut self) -> Self {
        self.fail_analyze = true;
        self
    }

    /// Make chat calls fail as if the server were down
    pub fn with_chat_failure(mut self) -> Self {
        self.fail_chat = true;
        self
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn analyze(&self, _image_base64: &str, _system_prompt: &str) -> Result<ModelReply> {
        if self.fail_analyze {
            return Err(Error::BackendUnreachable("mock backend offline".into()));
        }

        let content = self
            .analysis_reply
            .clone()
            .unwrap_or_else(|| DEFAULT_ANALYSIS_REPLY.to_string());

        Ok(ModelReply {
            model_used: "mock".to_string(),
            message_content: content,
            prompt_tokens: 512,
            completion_tokens: 128,
            eval_duration_ns: 2_400_000_000,
            prompt_eval_duration_ns: 600_000_000,
            total_duration_ns: 3_100_000_000,
        })
    }

    async fn chat(
        &self,
        _system_prompt: &str,
        _history: &[ChatTurn],
        _user_text: &str,
        _image_base64: &str,
    ) -> Result<ReplyStream> {
        if self.fail_chat {
            return Err(Error::BackendUnreachable("mock backend offline".into()));
        }
        Ok(ReplyStream::from_deltas(self.chat_deltas.clone()))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
