//! Ollama backend
//!
//! HTTP client for a local Ollama server: non-streaming analysis calls,
//! NDJSON-streaming chat turns, and model discovery via `/api/tags`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::ChatTurn;

use super::types::{ModelReply, ReplyStream};
use super::{error_from_response, ChatBackend};

/// Backend for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
        }
    }

    /// Create from resolved configuration
    pub fn from_config(config: &Config, model: &str) -> Self {
        Self::new(&config.ollama_host, model)
    }

    /// Names of the models the server has pulled, via `GET /api/tags`.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(Error::transport)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendProtocol(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn send_chat(&self, request: &OllamaChatRequest) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(Error::transport)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }
}

/// Request to the Ollama chat API
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    stream: bool,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

/// One chat message; `images` only rides on the image-bearing user message
#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

impl OllamaMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            images: None,
        }
    }

    fn with_image(role: &str, content: &str, image_base64: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            images: Some(vec![image_base64.to_string()]),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Non-streaming response from the Ollama chat API
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    eval_duration: u64,
    #[serde(default)]
    prompt_eval_duration: u64,
    #[serde(default)]
    total_duration: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

/// Response from the Ollama tags API
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn analyze(&self, image_base64: &str, system_prompt: &str) -> Result<ModelReply> {
        let request = OllamaChatRequest {
            model: self.model.clone(),
            stream: false,
            messages: vec![
                OllamaMessage::text("system", system_prompt),
                OllamaMessage::with_image("user", "Analyze this receipt.", image_base64),
            ],
            options: Some(OllamaOptions { temperature: 0.1 }),
        };

        let response = self.send_chat(&request).await?;
        let body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendProtocol(format!("ollama analyze response: {}", e)))?;

        debug!(
            "Ollama analyze: model={} eval_count={} prompt_eval_count={}",
            body.model, body.eval_count, body.prompt_eval_count
        );

        Ok(ModelReply {
            model_used: if body.model.is_empty() {
                self.model.clone()
            } else {
                body.model
            },
            message_content: body.message.content,
            prompt_tokens: body.prompt_eval_count,
            completion_tokens: body.eval_count,
            eval_duration_ns: body.eval_duration,
            prompt_eval_duration_ns: body.prompt_eval_duration,
            total_duration_ns: body.total_duration,
        })
    }

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_text: &str,
        image_base64: &str,
    ) -> Result<ReplyStream> {
        let mut messages = vec![OllamaMessage::text("system", system_prompt)];
        // Prior turns travel text-only; the image rides on the new message
        for turn in history {
            messages.push(OllamaMessage::text(turn.role.as_str(), &turn.content));
        }
        messages.push(OllamaMessage::with_image("user", user_text, image_base64));

        let request = OllamaChatRequest {
            model: self.model.clone(),
            stream: true,
            messages,
            options: None,
        };

        debug!("Ollama chat: model={} turns={}", self.model, history.len());
        let response = self.send_chat(&request).await?;
        Ok(ReplyStream::from_response(response))
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
