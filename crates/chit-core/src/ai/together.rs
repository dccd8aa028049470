//! Together.AI backend
//!
//! Hosted OpenAI-compatible chat completions with bearer-token auth. Vision
//! input travels as a data-URL image part. Replies arrive whole rather than
//! streamed, so chat turns surface as single-delta streams.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::ChatTurn;

use super::types::{ModelReply, ReplyStream};
use super::{error_from_response, ChatBackend};

/// Backend for the Together.AI chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct TogetherBackend {
    http_client: Client,
    /// Full chat-completions URL, not a base to append paths to.
    endpoint: String,
    /// Upstream model name, reserved prefix already stripped.
    model: String,
    api_key: String,
}

impl TogetherBackend {
    /// Create a new Together.AI backend
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            endpoint: self.endpoint.clone(),
            model: model.to_string(),
            api_key: self.api_key.clone(),
        }
    }

    /// Create from resolved configuration; fails without an API key.
    pub fn from_config(config: &Config, model: &str) -> Result<Self> {
        let api_key = config.together_api_key.as_deref().ok_or_else(|| {
            Error::Config(
                "TOGETHER_API_KEY is not set; the hosted backend needs a bearer key".into(),
            )
        })?;
        Ok(Self::new(&config.together_url, model, api_key))
    }

    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(Error::transport)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Error::BackendProtocol(format!("chat completions response: {}", e)))
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: ChatContent,
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: ChatContent::Text(content.to_string()),
        }
    }

    fn with_image(role: &str, text: &str, image_base64: &str) -> Self {
        Self {
            role: role.to_string(),
            content: ChatContent::Parts(vec![
                ContentPart::Text {
                    text: text.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/jpeg;base64,{}", image_base64),
                    },
                },
            ]),
        }
    }
}

/// Chat message content (text or multimodal)
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Content part for multimodal messages
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image URL for vision requests
#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Token usage; hosted responses may omit it entirely
#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// First choice's text, or a protocol error when the list is empty.
fn first_choice(response: ChatCompletionResponse) -> Result<(String, Usage)> {
    let ChatCompletionResponse { choices, usage } = response;
    let content = choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| Error::BackendProtocol("no choices in chat completions response".into()))?;
    Ok((content, usage))
}

#[async_trait]
impl ChatBackend for TogetherBackend {
    async fn analyze(&self, image_base64: &str, system_prompt: &str) -> Result<ModelReply> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::text("system", system_prompt),
                ChatMessage::with_image(
                    "user",
                    "Analyze this receipt according to the system prompt.",
                    image_base64,
                ),
            ],
            temperature: Some(0.1),
            max_tokens: Some(4096),
            stream: false,
        };

        let response = self.chat_completion(&request).await?;
        let (content, usage) = first_choice(response)?;
        debug!(
            "Together analyze: model={} completion_tokens={}",
            self.model, usage.completion_tokens
        );

        // Together reports token counts but no durations
        Ok(ModelReply {
            model_used: self.model.clone(),
            message_content: content,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            eval_duration_ns: 0,
            prompt_eval_duration_ns: 0,
            total_duration_ns: 0,
        })
    }

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_text: &str,
        image_base64: &str,
    ) -> Result<ReplyStream> {
        let mut messages = vec![ChatMessage::text("system", system_prompt)];
        for turn in history {
            messages.push(ChatMessage::text(turn.role.as_str(), &turn.content));
        }
        messages.push(ChatMessage::with_image("user", user_text, image_base64));

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
        };

        let response = self.chat_completion(&request).await?;
        let (content, _) = first_choice(response)?;
        // Single-shot reply surfaced as a one-delta stream
        Ok(ReplyStream::from_text(content))
    }

    async fn health_check(&self) -> bool {
        // No cheap probe; failures surface on the first real call
        true
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_message_is_tagged_parts() {
        let msg = ChatMessage::with_image("user", "look at this", "aGVsbG8=");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(
            json["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,aGVsbG8="
        );
    }

    #[test]
    fn test_text_message_is_plain_string() {
        let msg = ChatMessage::text("assistant", "the totals match");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "the totals match");
    }

    #[test]
    fn test_request_omits_unset_sampling_fields() {
        let request = ChatCompletionRequest {
            model: "google/gemma-3n-E4B-it".to_string(),
            messages: vec![],
            temperature: None,
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_first_choice_empty_is_protocol_error() {
        let response = ChatCompletionResponse {
            choices: vec![],
            usage: Usage::default(),
        };
        assert!(matches!(
            first_choice(response),
            Err(Error::BackendProtocol(_))
        ));
    }

    #[test]
    fn test_response_tolerates_missing_usage() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"No"}}]}"#,
        )
        .unwrap();
        let (content, usage) = first_choice(response).unwrap();
        assert_eq!(content, "No");
        assert_eq!(usage.prompt_tokens, 0);
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = Config::default();
        assert!(matches!(
            TogetherBackend::from_config(&config, "google/gemma-3n-E4B-it"),
            Err(Error::Config(_))
        ));
    }
}
