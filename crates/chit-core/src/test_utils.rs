//! Test utilities for chit-core
//!
//! Provides a mock model server speaking both backend dialects: the local
//! `/api/chat` endpoint (including NDJSON streaming) and the hosted
//! chat-completions endpoint. Reserved model names trigger failure paths.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Model name that makes every endpoint answer 500.
pub const ERROR_MODEL: &str = "error-model";
/// Model name that makes `/api/chat` answer 200 with a non-JSON body.
pub const GARBAGE_MODEL: &str = "garbage-model";

/// Reply served for every successful analysis-style request.
pub const MOCK_AUDIT_REPLY: &str = r#"### AUDITOR SCRATCHPAD
1. **Item analysis:**
   - Nasi Lemak Ayam | Qty: 2 | Unit: RM 12.00 | Total: RM 24.00
     -> Math: MATCH
     -> Price logic: plausible for a mid-range restoran
   - Teh Tarik | Qty: 3 | Unit: RM 6.00 | Total: RM 18.00
     -> Math: MATCH
     -> Price logic: plausible
2. **Tax and totals review:**
   - Subtotal: RM 42.00
   - Service Charge (10%): RM 4.20
   - SST (6%): RM 2.52
   - Rounding: RM -0.02
   - Expected grand total: RM 48.70 vs printed: RM 48.70
3. **Verdict:** VALID

```json
{
  "extracted_data": {
    "merchant_name": "Restoran Seri Melaka",
    "receipt_no": "INV-20250314-077",
    "amount": "48.70",
    "receipt_date": "2025-03-14",
    "location": "12 Jalan Hang Tuah, Melaka"
  },
  "validation_result": {
    "reasoning": "Line items, service charge, SST, and rounding all reconcile with the printed grand total.",
    "conclusion": "No"
  }
}
```"#;

/// Deltas served on the streaming chat path, in order.
pub const MOCK_CHAT_DELTAS: &[&str] = &["The ", "printed ", "totals ", "match."];

/// Mock model server for testing and development
pub struct MockModelServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockModelServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/chat", post(handle_ollama_chat))
            .route("/v1/chat/completions", post(handle_completions));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the full hosted chat-completions URL
    pub fn completions_url(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockModelServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tags endpoint (model listing, doubles as the health probe)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![
            ModelInfo {
                name: "qwen2.5-vl:3b".to_string(),
                modified_at: "2025-01-01T00:00:00Z".to_string(),
                size: 3_200_000_000,
            },
            ModelInfo {
                name: "llava-phi3:latest".to_string(),
                modified_at: "2025-01-01T00:00:00Z".to_string(),
                size: 2_900_000_000,
            },
        ],
    })
}

/// Local chat endpoint: JSON reply when `stream` is false, NDJSON otherwise
async fn handle_ollama_chat(Json(request): Json<ChatRequest>) -> Response {
    if request.model == ERROR_MODEL {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model exploded").into_response();
    }
    if request.model == GARBAGE_MODEL {
        return (StatusCode::OK, "{this is not json").into_response();
    }

    if request.stream {
        let mut lines: Vec<String> = MOCK_CHAT_DELTAS
            .iter()
            .map(|delta| {
                format!(
                    "{}\n",
                    serde_json::json!({
                        "model": request.model,
                        "message": {"role": "assistant", "content": delta},
                        "done": false,
                    })
                )
            })
            .collect();
        lines.push(format!(
            "{}\n",
            serde_json::json!({
                "model": request.model,
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "eval_count": 21,
                "prompt_eval_count": 102,
            })
        ));

        let stream = futures_util::stream::iter(lines.into_iter().map(Ok::<_, Infallible>));
        return Response::builder()
            .header("content-type", "application/x-ndjson")
            .body(Body::from_stream(stream))
            .unwrap();
    }

    Json(serde_json::json!({
        "model": request.model,
        "message": {"role": "assistant", "content": MOCK_AUDIT_REPLY},
        "done": true,
        "prompt_eval_count": 421,
        "eval_count": 97,
        "eval_duration": 1_900_000_000u64,
        "prompt_eval_duration": 350_000_000u64,
        "total_duration": 2_300_000_000u64,
    }))
    .into_response()
}

/// Hosted chat-completions endpoint; requires a bearer token
async fn handle_completions(
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }

    if request.model == ERROR_MODEL {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model exploded").into_response();
    }

    Json(serde_json::json!({
        "choices": [
            {"message": {"role": "assistant", "content": MOCK_AUDIT_REPLY}}
        ],
        "usage": {"prompt_tokens": 388, "completion_tokens": 104},
    }))
    .into_response()
}

// Request/Response types for the mock server

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    model: String,
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}
