//! Shared test support: a minimal mock OpenAI-compatible chat completions
//! endpoint, speaking just enough of the streaming SSE wire format to drive
//! end-to-end tests against `agent_orchestrator::Controller` without a real
//! LLM server.

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Starts a mock endpoint that serves `bodies[i]` (a pre-formatted SSE
/// response body) to the `i`-th request it receives, closing the connection
/// after each response so the client opens a fresh one for the next call.
/// Requests beyond `bodies.len()` get an immediate `[DONE]`. Returns the
/// base URL to plug into `AgentDeps::base_url`, plus every request's raw
/// bytes (headers + body) for tests that want to inspect what was sent.
pub async fn spawn_mock_llm(bodies: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock llm listener");
    let addr = listener.local_addr().expect("local_addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_handle = requests.clone();

    tokio::spawn(async move {
        let mut bodies = bodies.into_iter();
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };

            let mut received = Vec::new();
            let mut buf = [0u8; 8192];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        received.extend_from_slice(&buf[..n]);
                        if received.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            requests_handle
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&received).into_owned());

            let body = bodies.next().unwrap_or_else(|| "data: [DONE]\n".to_string());
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/v1"), requests)
}

/// An SSE body for a plain text completion: one content delta followed by a
/// terminal chunk carrying `finish_reason: "stop"` and usage.
pub fn text_sse(text: &str) -> String {
    let delta = serde_json::json!({
        "id": "c1", "model": "m",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}],
    });
    let done = serde_json::json!({
        "id": "c1", "model": "m",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2},
    });
    format!("data: {delta}\ndata: {done}\ndata: [DONE]\n")
}

/// An SSE body for a completion that requests one tool call.
pub fn tool_call_sse(call_id: &str, tool_name: &str, arguments_json: &str) -> String {
    let delta = serde_json::json!({
        "id": "c1", "model": "m",
        "choices": [{
            "index": 0,
            "delta": {
                "tool_calls": [{
                    "index": 0,
                    "id": call_id,
                    "function": {"name": tool_name, "arguments": arguments_json},
                }],
            },
            "finish_reason": null,
        }],
    });
    let done = serde_json::json!({
        "id": "c1", "model": "m",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2},
    });
    format!("data: {delta}\ndata: {done}\ndata: [DONE]\n")
}
