//! Backend-agnostic reply types
//!
//! Both backends answer in their own wire shape; everything past the adapter
//! boundary sees only [`ModelReply`] (single-shot calls) or [`ReplyStream`]
//! (chat turns, one delta at a time).

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt, TryStreamExt};
use serde::Deserialize;

use crate::error::{Error, Result};

/// One backend answer, normalized across wire shapes. Counters and durations
/// are zero when the backend does not report them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub model_used: String,
    /// The assistant's raw text, which may embed a JSON object.
    pub message_content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub eval_duration_ns: u64,
    pub prompt_eval_duration_ns: u64,
    pub total_duration_ns: u64,
}

type ByteStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Vec<u8>, reqwest::Error>> + Send>>;

/// A lazy sequence of assistant text deltas.
///
/// Local chat turns stream NDJSON over a held-open connection; hosted turns
/// arrive whole and yield a single delta. Consumption is pull-based, so
/// dropping the stream mid-way simply closes the connection.
pub struct ReplyStream {
    inner: StreamInner,
}

enum StreamInner {
    Ndjson {
        bytes: ByteStream,
        buf: String,
        done: bool,
    },
    Scripted {
        deltas: VecDeque<String>,
    },
}

impl ReplyStream {
    /// Wrap a streaming HTTP response whose body is newline-delimited JSON
    /// chunks, each carrying an incremental `message.content` fragment.
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        let bytes = response.bytes_stream().map_ok(|chunk| chunk.to_vec());
        Self {
            inner: StreamInner::Ndjson {
                bytes: Box::pin(bytes),
                buf: String::new(),
                done: false,
            },
        }
    }

    /// A single-delta stream for backends that answer in one piece. An empty
    /// reply yields no deltas.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut deltas = VecDeque::new();
        if !text.is_empty() {
            deltas.push_back(text);
        }
        Self {
            inner: StreamInner::Scripted { deltas },
        }
    }

    /// A scripted stream with one delta per entry.
    pub fn from_deltas(deltas: Vec<String>) -> Self {
        Self {
            inner: StreamInner::Scripted {
                deltas: deltas.into(),
            },
        }
    }

    /// Next text delta, `None` once the reply is complete.
    ///
    /// Each delta is observed exactly once, in arrival order. Unparseable
    /// stream lines and empty fragments are skipped rather than surfaced.
    pub async fn next(&mut self) -> Result<Option<String>> {
        match &mut self.inner {
            StreamInner::Scripted { deltas } => Ok(deltas.pop_front()),
            StreamInner::Ndjson { bytes, buf, done } => loop {
                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    if let Some(content) = delta_from_line(line.trim()) {
                        if !content.is_empty() {
                            return Ok(Some(content));
                        }
                    }
                }

                if *done {
                    return Ok(None);
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buf.push_str(&String::from_utf8_lossy(&chunk)),
                    Some(Err(e)) => {
                        *done = true;
                        return Err(Error::transport(e));
                    }
                    None => {
                        // Connection closed: flush a final unterminated line
                        *done = true;
                        let tail = std::mem::take(buf);
                        if let Some(content) = delta_from_line(tail.trim()) {
                            if !content.is_empty() {
                                return Ok(Some(content));
                            }
                        }
                        return Ok(None);
                    }
                }
            },
        }
    }

    /// Drain the remaining deltas into one string.
    pub async fn collect_remaining(&mut self) -> Result<String> {
        let mut full = String::new();
        while let Some(delta) = self.next().await? {
            full.push_str(&delta);
        }
        Ok(full)
    }
}

impl std::fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            StreamInner::Ndjson { buf, done, .. } => f
                .debug_struct("ReplyStream::Ndjson")
                .field("buffered", &buf.len())
                .field("done", done)
                .finish(),
            StreamInner::Scripted { deltas } => f
                .debug_struct("ReplyStream::Scripted")
                .field("remaining", &deltas.len())
                .finish(),
        }
    }
}

/// One NDJSON line from a streaming chat response. Newer servers put the
/// fragment under `message.content`; some put it under a bare `response`.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

fn delta_from_line(line: &str) -> Option<String> {
    if line.is_empty() {
        return None;
    }
    // Unparseable lines (keep-alives, partial junk) are skipped
    let chunk: StreamChunk = serde_json::from_str(line).ok()?;
    chunk.message.map(|m| m.content).or(chunk.response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_stream_in_order() {
        let mut stream =
            ReplyStream::from_deltas(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(stream.next().await.unwrap(), Some("a".to_string()));
        assert_eq!(stream.next().await.unwrap(), Some("b".to_string()));
        assert_eq!(stream.next().await.unwrap(), Some("c".to_string()));
        assert_eq!(stream.next().await.unwrap(), None);
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_from_text_single_delta() {
        let mut stream = ReplyStream::from_text("whole reply");
        assert_eq!(stream.next().await.unwrap(), Some("whole reply".to_string()));
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_from_text_empty_yields_nothing() {
        let mut stream = ReplyStream::from_text("");
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_collect_remaining() {
        let mut stream =
            ReplyStream::from_deltas(vec!["The ".to_string(), "total ".to_string(), "matches.".to_string()]);
        assert_eq!(stream.collect_remaining().await.unwrap(), "The total matches.");
    }

    #[test]
    fn test_delta_from_line_message_content() {
        let line = r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(delta_from_line(line), Some("Hi".to_string()));
    }

    #[test]
    fn test_delta_from_line_response_fallback() {
        let line = r#"{"response":"legacy fragment"}"#;
        assert_eq!(delta_from_line(line), Some("legacy fragment".to_string()));
    }

    #[test]
    fn test_delta_from_line_skips_junk() {
        assert_eq!(delta_from_line("not json at all"), None);
        assert_eq!(delta_from_line(""), None);
    }

    #[test]
    fn test_delta_from_line_final_done_chunk_is_empty() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":true,"eval_count":42}"#;
        assert_eq!(delta_from_line(line), Some(String::new()));
    }
}
