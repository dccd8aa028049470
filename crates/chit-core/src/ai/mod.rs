//! Pluggable chat backend abstraction
//!
//! Two interchangeable multimodal backends sit behind one trait: a local
//! Ollama server and the hosted Together.AI endpoint. Callers pick a backend
//! by model reference, then never branch on which one they got.
//!
//! # Architecture
//!
//! - `ChatBackend` trait: defines the interface for all model operations
//! - `BackendClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - `ModelRef`: parsed model reference that routes to local or hosted
//! - Backend implementations: `OllamaBackend`, `TogetherBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let model = ModelRef::parse("Together.AI/google/gemma-3n-E4B-it");
//! let client = BackendClient::for_model(&model, &config)?;
//! let reply = client.analyze(&image_base64, &system_prompt).await?;
//! ```

mod mock;
mod ollama;
pub mod parsing;
mod together;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use together::TogetherBackend;
pub use types::*;

use std::fmt;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::ChatTurn;

/// Model-name prefix that routes to the hosted backend. Exact match,
/// case-sensitive; every other name is treated as a local Ollama tag.
pub const HOSTED_PREFIX: &str = "Together.AI/";

/// Trait defining the interface for all chat backends
///
/// Backends must be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run a one-shot receipt analysis against the given image
    async fn analyze(&self, image_base64: &str, system_prompt: &str) -> Result<ModelReply>;

    /// Start a follow-up chat turn; the reply arrives as a delta stream
    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_text: &str,
        image_base64: &str,
    ) -> Result<ReplyStream>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for metrics)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Parsed model reference
///
/// Resolved once at the edge; everything downstream dispatches on the
/// variant instead of re-inspecting model-name strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// Local Ollama model tag
    Local { name: String },
    /// Hosted Together.AI model, prefix already stripped
    Hosted { name: String },
}

impl ModelRef {
    /// Parse a raw model reference as entered by the user
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(HOSTED_PREFIX) {
            Some(rest) => ModelRef::Hosted {
                name: rest.to_string(),
            },
            None => ModelRef::Local {
                name: raw.to_string(),
            },
        }
    }

    /// The bare upstream model name, without any routing prefix
    pub fn name(&self) -> &str {
        match self {
            ModelRef::Local { name } | ModelRef::Hosted { name } => name,
        }
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, ModelRef::Hosted { .. })
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Local { name } => write!(f, "{}", name),
            ModelRef::Hosted { name } => write!(f, "{}{}", HOSTED_PREFIX, name),
        }
    }
}

/// Concrete chat client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum BackendClient {
    /// Local Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Hosted Together.AI backend
    Together(TogetherBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl BackendClient {
    /// Build the backend a model reference routes to
    ///
    /// Hosted references fail here when no API key is configured, before
    /// any request goes out.
    pub fn for_model(model: &ModelRef, config: &Config) -> Result<Self> {
        match model {
            ModelRef::Local { name } => Ok(BackendClient::Ollama(OllamaBackend::from_config(
                config, name,
            ))),
            ModelRef::Hosted { name } => Ok(BackendClient::Together(
                TogetherBackend::from_config(config, name)?,
            )),
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        BackendClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            BackendClient::Ollama(b) => BackendClient::Ollama(b.with_model(model)),
            BackendClient::Together(b) => BackendClient::Together(b.with_model(model)),
            BackendClient::Mock(b) => BackendClient::Mock(b.with_model(model)),
        }
    }
}

// Implement ChatBackend for BackendClient by delegating to the inner backend
#[async_trait]
impl ChatBackend for BackendClient {
    async fn analyze(&self, image_base64: &str, system_prompt: &str) -> Result<ModelReply> {
        match self {
            BackendClient::Ollama(b) => b.analyze(image_base64, system_prompt).await,
            BackendClient::Together(b) => b.analyze(image_base64, system_prompt).await,
            BackendClient::Mock(b) => b.analyze(image_base64, system_prompt).await,
        }
    }

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_text: &str,
        image_base64: &str,
    ) -> Result<ReplyStream> {
        match self {
            BackendClient::Ollama(b) => {
                b.chat(system_prompt, history, user_text, image_base64).await
            }
            BackendClient::Together(b) => {
                b.chat(system_prompt, history, user_text, image_base64).await
            }
            BackendClient::Mock(b) => b.chat(system_prompt, history, user_text, image_base64).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            BackendClient::Ollama(b) => b.health_check().await,
            BackendClient::Together(b) => b.health_check().await,
            BackendClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            BackendClient::Ollama(b) => b.model(),
            BackendClient::Together(b) => b.model(),
            BackendClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            BackendClient::Ollama(b) => b.host(),
            BackendClient::Together(b) => b.host(),
            BackendClient::Mock(b) => b.host(),
        }
    }
}

/// Turn a non-2xx response into a status + body error.
pub(crate) async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::BackendError { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_local() {
        let model = ModelRef::parse("qwen2.5-vl:3b");
        assert_eq!(
            model,
            ModelRef::Local {
                name: "qwen2.5-vl:3b".to_string()
            }
        );
        assert_eq!(model.name(), "qwen2.5-vl:3b");
        assert!(!model.is_hosted());
        assert_eq!(model.to_string(), "qwen2.5-vl:3b");
    }

    #[test]
    fn test_model_ref_hosted_strips_prefix() {
        let model = ModelRef::parse("Together.AI/google/gemma-3n-E4B-it");
        assert_eq!(
            model,
            ModelRef::Hosted {
                name: "google/gemma-3n-E4B-it".to_string()
            }
        );
        assert_eq!(model.name(), "google/gemma-3n-E4B-it");
        assert!(model.is_hosted());
        // Display restores the form the user typed
        assert_eq!(model.to_string(), "Together.AI/google/gemma-3n-E4B-it");
    }

    #[test]
    fn test_model_ref_prefix_is_case_sensitive() {
        let model = ModelRef::parse("together.ai/google/gemma-3n-E4B-it");
        assert!(!model.is_hosted());
        assert_eq!(model.name(), "together.ai/google/gemma-3n-E4B-it");
    }

    #[test]
    fn test_for_model_local_routes_to_ollama() {
        let config = crate::config::Config::default();
        let model = ModelRef::parse("llava-phi3");
        let client = BackendClient::for_model(&model, &config).unwrap();
        assert!(matches!(client, BackendClient::Ollama(_)));
        assert_eq!(client.model(), "llava-phi3");
    }

    #[test]
    fn test_for_model_hosted_needs_api_key() {
        let config = crate::config::Config::default();
        let model = ModelRef::parse("Together.AI/google/gemma-3n-E4B-it");
        assert!(matches!(
            BackendClient::for_model(&model, &config),
            Err(Error::Config(_))
        ));

        let with_key = Config {
            together_api_key: Some("tok_test".to_string()),
            ..Config::default()
        };
        let client = BackendClient::for_model(&model, &with_key).unwrap();
        assert!(matches!(client, BackendClient::Together(_)));
        assert_eq!(client.model(), "google/gemma-3n-E4B-it");
    }

    #[tokio::test]
    async fn test_mock_client_health_check() {
        let client = BackendClient::mock();
        assert_eq!(client.model(), "mock");
        assert!(client.health_check().await);
    }
}
