//! Streaming chat completions over an OpenAI-compatible API.
//!
//! This is Component A: the only part of the engine that talks to the LLM
//! over the wire. It owns SSE parsing, tool-call delta aggregation, retry
//! with backoff, and cooperative cancellation. Every other component
//! consumes [`ChatDelta`] values from [`stream_chat`] rather than touching
//! `reqwest`/wire types directly.

use crate::retry::{RetryConfig, retry_with_backoff_conditional};
use crate::types::{SessionId, ToolCallIntent};
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A cooperative cancellation flag shared between a controller and the
/// agents/LLM calls it spawns. Checked at stream-consumption points rather
/// than threaded through every `await`.
#[derive(Clone, Debug)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// A token sharing this one's underlying flag: cancelling either side
    /// cancels both. Used for agent-as-tool sub-session recursion, where
    /// cancelling the parent must stop an in-flight child.
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// WIRE TYPES (OpenAI-compatible chat completions)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: OpenAIDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// ============================================================================
// CHAT DELTA (what the rest of the engine actually consumes)
// ============================================================================

/// A model-agnostic piece of a streamed chat completion.
#[derive(Debug, Clone)]
pub enum ChatDelta {
    /// Incremental assistant text.
    Text(String),
    /// A complete tool call (assembled from wire-level argument deltas).
    ToolCall(ToolCallIntent),
    /// Terminal event for this completion, carrying token usage if the
    /// provider reported it.
    Done { usage: Option<(u64, u64)> },
}

/// Plain request shape accepted by [`stream_chat`]; callers build this from
/// [`crate::types::Message`] history plus an optional tool schema list.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tools: Option<Vec<serde_json::Value>>,
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatDelta>> + Send>>;

/// Accumulates wire-level deltas into [`ChatDelta`]s, mirroring the
/// index-keyed accumulation used for tool call argument streaming.
#[derive(Default)]
struct DeltaAggregator {
    tool_calls: HashMap<u32, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl DeltaAggregator {
    fn process(&mut self, chunk: OpenAIChunk) -> Result<Vec<ChatDelta>> {
        let mut out = Vec::new();
        let usage = chunk
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens));

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    out.push(ChatDelta::Text(content));
                }
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for tc in tool_calls {
                    let entry = self.tool_calls.entry(tc.index).or_default();
                    if let Some(id) = tc.id {
                        entry.id = Some(id);
                    }
                    if let Some(function) = tc.function {
                        if let Some(name) = function.name {
                            entry.name = Some(name);
                        }
                        if let Some(args) = function.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
            }

            if choice.finish_reason.is_some() {
                for (_, partial) in self.tool_calls.drain() {
                    if let (Some(id), Some(name)) = (partial.id, partial.name) {
                        let arguments: serde_json::Value = if partial.arguments.trim().is_empty()
                        {
                            serde_json::json!({})
                        } else {
                            serde_json::from_str(&partial.arguments)?
                        };
                        out.push(ChatDelta::ToolCall(ToolCallIntent::new(id, name, arguments)));
                    }
                }
                out.push(ChatDelta::Done { usage });
            }
        }

        Ok(out)
    }
}

fn parse_sse_stream(
    body: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>> {
    // A single network read can carry more than one "data: " line (SSE
    // events are newline-delimited, not one-per-TCP-chunk), so every line
    // in a chunk is parsed, not just the first.
    let stream = body.bytes_stream().map(move |result| {
        let bytes = match result {
            Ok(b) => b,
            Err(e) => return vec![Err(Error::LlmTransport(e))],
        };

        let text = String::from_utf8_lossy(&bytes).into_owned();

        text.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .filter(|data| *data != "[DONE]")
            .map(|data| serde_json::from_str::<OpenAIChunk>(data).map_err(Error::Json))
            .collect::<Vec<_>>()
    });

    Box::pin(stream.flat_map(futures::stream::iter))
}

/// True for errors worth retrying at the LLM-transport layer: network
/// failures, 429 (rate limit), and 5xx. Any other HTTP status fails fast.
fn is_retryable_llm_error(err: &Error) -> bool {
    match err {
        Error::LlmTransport(e) => {
            if let Some(status) = e.status() {
                status.as_u16() == 429 || status.is_server_error()
            } else {
                // connect/timeout/decode errors with no status: transient
                true
            }
        }
        Error::Json(_) => false,
        _ => false,
    }
}

/// Issue one streaming chat completion request, retrying on transient
/// failures, and return a lazy stream of [`ChatDelta`]s.
///
/// `step_name` and `session_id` are used only for structured logging; the
/// wire request carries neither.
pub async fn stream_chat(
    http_client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: ChatRequest,
    cancel: &CancellationToken,
    session_id: &SessionId,
    step_name: &str,
) -> Result<ChatStream> {
    let retry_config = RetryConfig::default();
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let response = retry_with_backoff_conditional(
        || async {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let body = OpenAIRequest {
                model: request.model.clone(),
                messages: request.messages.clone(),
                stream: true,
                max_tokens: request.max_tokens,
                temperature: request.temperature,
                tools: request.tools.clone(),
            };

            let resp = http_client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(Error::LlmTransport)?;

            if !resp.status().is_success() {
                let err = resp.error_for_status_ref().unwrap_err();
                return Err(Error::LlmTransport(err));
            }

            Ok(resp)
        },
        &retry_config,
        is_retryable_llm_error,
    )
    .await?;

    tracing::debug!(session_id = %session_id, step = step_name, "llm stream opened");

    let cancel = cancel.clone();
    let sse = parse_sse_stream(response);
    let stream = sse.scan(DeltaAggregator::default(), move |agg, chunk_result| {
        let result = if cancel.is_cancelled() {
            None
        } else {
            match chunk_result {
                Ok(chunk) => match agg.process(chunk) {
                    Ok(deltas) => Some(Ok(deltas)),
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            }
        };
        futures::future::ready(result)
    });

    let flattened = stream.flat_map(|result| {
        futures::stream::iter(match result {
            Ok(deltas) => deltas.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })
    });

    Ok(Box::pin(flattened))
}

/// Build an HTTP client with the engine's default per-request timeout.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(Error::LlmTransport)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: Option<&str>, finish: Option<&str>) -> OpenAIChunk {
        OpenAIChunk {
            id: "x".into(),
            model: "m".into(),
            usage: None,
            choices: vec![OpenAIChoice {
                index: 0,
                delta: OpenAIDelta {
                    role: None,
                    content: content.map(|s| s.to_string()),
                    tool_calls: None,
                },
                finish_reason: finish.map(|s| s.to_string()),
            }],
        }
    }

    #[test]
    fn test_delta_aggregator_text() {
        let mut agg = DeltaAggregator::default();
        let out1 = agg.process(chunk(Some("Hello "), None)).unwrap();
        assert!(out1.iter().all(|d| matches!(d, ChatDelta::Text(_))));

        let out2 = agg.process(chunk(Some("world"), Some("stop"))).unwrap();
        assert!(matches!(out2.last(), Some(ChatDelta::Done { .. })));
    }

    #[test]
    fn test_delta_aggregator_tool_call() {
        let mut agg = DeltaAggregator::default();
        let c1 = OpenAIChunk {
            id: "x".into(),
            model: "m".into(),
            usage: None,
            choices: vec![OpenAIChoice {
                index: 0,
                delta: OpenAIDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![OpenAIToolCallDelta {
                        index: 0,
                        id: Some("call_1".into()),
                        function: Some(OpenAIFunctionDelta {
                            name: Some("search".into()),
                            arguments: Some("{\"q\":".into()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
        };
        agg.process(c1).unwrap();

        let c2 = OpenAIChunk {
            id: "x".into(),
            model: "m".into(),
            usage: None,
            choices: vec![OpenAIChoice {
                index: 0,
                delta: OpenAIDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![OpenAIToolCallDelta {
                        index: 0,
                        id: None,
                        function: Some(OpenAIFunctionDelta {
                            name: None,
                            arguments: Some("\"rust\"}".into()),
                        }),
                    }]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
        };
        let out = agg.process(c2).unwrap();
        let tool_call = out
            .iter()
            .find_map(|d| match d {
                ChatDelta::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .expect("expected a tool call");
        assert_eq!(tool_call.name, "search");
        assert_eq!(tool_call.arguments["q"], "rust");
    }

    #[test]
    fn test_is_retryable_llm_error_json_not_retryable() {
        let err: Error = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(!is_retryable_llm_error(&err));
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.child().is_cancelled());
    }
}
