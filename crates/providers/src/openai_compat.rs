//! OpenAI-compatible streaming provider.
//!
//! Works with: llama.cpp server, vLLM, Ollama, LM Studio, OpenAI, OpenRouter,
//! and any endpoint exposing `/v1/chat/completions` with SSE streaming.
//!
//! Supports:
//! - Streaming chat completions with usage totals
//! - Reasoning deltas (`reasoning_content` or `reasoning`)
//! - Tool use / function calling, delivered as index-keyed fragments
//! - A non-streamed JSON body as a fallback when the server ignores `stream`
//! - Model listing
//!
//! Streams have no overall deadline: a response may keep producing tokens
//! for as long as it likes, and only a connection that stalls for longer
//! than the configured timeout is abandoned.

use async_trait::async_trait;
use chatloom_core::error::ProviderError;
use chatloom_core::message::{Message, Role};
use chatloom_core::provider::*;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::sse::{SseDecoder, SseLine};

/// In-band answer used when a non-streamed body cannot be parsed.
pub const FALLBACK_PARSE_ERROR: &str = "**Error:** Could not parse model response.";

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    /// Total deadline for short, non-streamed requests.
    request_timeout: Duration,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// `timeout_secs` bounds connecting and each wait for the next body
    /// bytes; it is not a limit on how long a streamed response may run.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
            request_timeout: timeout,
        })
    }

    /// Create a provider for a local llama.cpp-style server (no key).
    pub fn local(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new("local", base_url.unwrap_or("http://localhost:8080/v1"), None, 120)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Build the JSON body for one round.
    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": request.stream,
        });

        if request.include_usage {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Provider streaming error");
            let message = if error_body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown status").to_string()
            } else {
                error_body
            };
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(pump(response.bytes_stream(), tx, provider_name));

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown status").to_string(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(model_ids(&body))
    }

}

fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Extract `data[].id` from a `/models` listing.
fn model_ids(body: &serde_json::Value) -> Vec<String> {
    body["data"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m["id"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

// ── Stream pump ───────────────────────────────────────────────────────────

/// Read a response body to completion, forwarding one [`StreamChunk`] per
/// decoded event. Stops at the sentinel, at a read error (forwarded as
/// `StreamInterrupted`), or when the receiver is dropped.
pub(crate) async fn pump<S, B, E>(
    mut byte_stream: S,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
    provider_name: String,
) where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();
    let mut saw_text = false;

    while let Some(chunk_result) = byte_stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
        };

        for line in decoder.push(bytes.as_ref()) {
            let SseLine::Data(data) = line else {
                break;
            };

            match parse_event(&data) {
                Ok(chunk) => {
                    saw_text |= has_text(&chunk);
                    if tx.send(Ok(chunk)).await.is_err() {
                        return; // receiver dropped
                    }
                }
                Err(e) => {
                    warn!(
                        provider = %provider_name,
                        data = %data,
                        error = %e,
                        "Skipping malformed stream event"
                    );
                }
            }
        }

        if decoder.is_finished() {
            trace!(provider = %provider_name, "Stream sentinel received");
            return;
        }
    }

    let trailing = decoder.finish();
    if !saw_text && !trailing.is_empty() {
        debug!(provider = %provider_name, "No streamed text, parsing body as a single response");
        let _ = tx.send(Ok(parse_fallback(&trailing))).await;
    }
}

fn has_text(chunk: &StreamChunk) -> bool {
    chunk.content.as_deref().is_some_and(|c| !c.is_empty())
        || chunk.reasoning.as_deref().is_some_and(|r| !r.is_empty())
}

/// Parse one `data:` payload into an event record.
pub(crate) fn parse_event(data: &str) -> Result<StreamChunk, serde_json::Error> {
    let parsed: StreamResponse = serde_json::from_str(data)?;

    let mut chunk = StreamChunk {
        usage: parsed.usage.and_then(|u| serde_json::from_value::<Usage>(u).ok()),
        ..StreamChunk::default()
    };

    if let Some(delta) = parsed.choices.into_iter().next().and_then(|c| c.delta) {
        chunk.content = delta.content;
        chunk.reasoning = delta.reasoning_content.or(delta.reasoning);
        chunk.tool_calls = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let function = tc.function.unwrap_or_default();
                ToolCallDelta {
                    index: tc.index.unwrap_or(0),
                    id: tc.id,
                    name: function.name,
                    arguments: function.arguments,
                }
            })
            .collect();
    }

    Ok(chunk)
}

/// Interpret leftover body text as a complete non-streamed response.
pub(crate) fn parse_fallback(body: &str) -> StreamChunk {
    let Ok(parsed) = serde_json::from_str::<FallbackResponse>(body) else {
        return StreamChunk::content(FALLBACK_PARSE_ERROR);
    };

    let mut chunk = StreamChunk {
        usage: parsed.usage.and_then(|u| serde_json::from_value::<Usage>(u).ok()),
        ..StreamChunk::default()
    };

    if let Some(message) = parsed.choices.into_iter().next().map(|c| c.message) {
        chunk.content = message.content;
        chunk.reasoning = message.reasoning_content.or(message.reasoning);
        chunk.tool_calls = message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCallDelta {
                index: i as u32,
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();
    }

    chunk
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` record.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across records.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// --- Non-streamed fallback types ---

#[derive(Debug, Deserialize)]
struct FallbackResponse {
    #[serde(default)]
    choices: Vec<FallbackChoice>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FallbackChoice {
    #[serde(default)]
    message: FallbackMessage,
}

#[derive(Debug, Default, Deserialize)]
struct FallbackMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<FallbackToolCall>,
}

#[derive(Debug, Deserialize)]
struct FallbackToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: StreamFunctionDelta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_core::message::MessageToolCall;

    async fn collect(parts: Vec<&'static str>) -> Vec<Result<StreamChunk, ProviderError>> {
        let stream = futures::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, std::io::Error>(p.as_bytes().to_vec())),
        );
        let (tx, mut rx) = mpsc::channel(16);
        pump(stream, tx, "test".into()).await;
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn local_constructor() {
        let provider = OpenAiCompatProvider::local(None).unwrap();
        assert_eq!(provider.name(), "local");
        assert!(provider.base_url.contains("localhost:8080"));
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_tool_calls(vec![MessageToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            arguments: r#"{"expression":"2*3"}"#.into(),
        }]);
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "calculator");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "6");
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_with_tools() {
        let request = ProviderRequest::streaming(
            "llama",
            vec![Message::user("hi")],
            vec![ToolDefinition {
                name: "calculator".into(),
                description: "math".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        );
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
    }

    #[test]
    fn request_body_without_tools_omits_tool_choice() {
        let request = ProviderRequest::streaming("llama", vec![Message::user("hi")], vec![]);
        let body = OpenAiCompatProvider::request_body(&request);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn parse_content_and_reasoning() {
        let chunk = parse_event(r#"{"choices":[{"delta":{"content":"Hi","reasoning_content":"hm"}}]}"#).unwrap();
        assert_eq!(chunk.content.as_deref(), Some("Hi"));
        assert_eq!(chunk.reasoning.as_deref(), Some("hm"));
    }

    #[test]
    fn parse_reasoning_alias() {
        let chunk = parse_event(r#"{"choices":[{"delta":{"reasoning":"step"}}]}"#).unwrap();
        assert_eq!(chunk.reasoning.as_deref(), Some("step"));
    }

    #[test]
    fn parse_tool_call_fragments() {
        let chunk = parse_event(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"calc","arguments":"{\"e"}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            chunk.tool_calls,
            vec![ToolCallDelta {
                index: 1,
                id: Some("call_b".into()),
                name: Some("calc".into()),
                arguments: Some("{\"e".into()),
            }]
        );
    }

    #[test]
    fn parse_usage_only_record() {
        let chunk = parse_event(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        )
        .unwrap();
        assert_eq!(chunk.usage.unwrap().total_tokens, 15);
        assert!(chunk.content.is_none());
    }

    #[test]
    fn usage_without_total_is_ignored() {
        let chunk = parse_event(r#"{"choices":[],"usage":{"prompt_tokens":1}}"#).unwrap();
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn fallback_parses_full_message() {
        let chunk = parse_fallback(
            r#"{"choices":[{"message":{"content":"4","tool_calls":[{"id":"c1","function":{"name":"calculator","arguments":"{}"}}]}}],"usage":{"total_tokens":3}}"#,
        );
        assert_eq!(chunk.content.as_deref(), Some("4"));
        assert_eq!(chunk.tool_calls[0].index, 0);
        assert_eq!(chunk.tool_calls[0].name.as_deref(), Some("calculator"));
        assert_eq!(chunk.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn fallback_garbage_becomes_inband_error() {
        let chunk = parse_fallback("<html>oops</html>");
        assert_eq!(chunk.content.as_deref(), Some(FALLBACK_PARSE_ERROR));
    }

    #[test]
    fn model_ids_from_listing() {
        let body = serde_json::json!({"data": [{"id": "a"}, {"id": "b"}, {"object": "x"}]});
        assert_eq!(model_ids(&body), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn pump_skips_malformed_lines() {
        let out = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n",
            "data: {not json}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n",
            "data: [DONE]\n",
        ])
        .await;
        let texts: Vec<String> = out
            .into_iter()
            .map(|r| r.unwrap().content.unwrap_or_default())
            .collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn pump_stops_at_sentinel() {
        let out = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ])
        .await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn pump_falls_back_to_plain_json_body() {
        let out = collect(vec!["{\"choices\":[{\"message\":{\"content\":\"plain\"}}]}"]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap().content.as_deref(), Some("plain"));
    }

    #[tokio::test]
    async fn pump_no_fallback_after_streamed_text() {
        let out = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n",
            "partial tail",
        ])
        .await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn pump_forwards_read_errors() {
        let stream = futures::stream::iter(vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        pump(stream, tx, "test".into()).await;
        assert!(rx.recv().await.unwrap().is_ok());
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }

    /// Serve one request with a chunked SSE body, pausing between events.
    async fn slow_sse_server(events: Vec<String>, pause: Duration) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            let head_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if let Some(at) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break at + 4;
                }
            };
            let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
            let length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            while request.len() < head_end + length {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                      Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for event in events {
                tokio::time::sleep(pause).await;
                let chunk = format!("{:x}\r\n{}\r\n", event.len(), event);
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn stream_outlives_the_configured_timeout() {
        let mut events: Vec<String> = (0..4)
            .map(|i| format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"t{i} \"}}}}]}}\n\n"))
            .collect();
        events.push("data: [DONE]\n\n".into());
        let addr = slow_sse_server(events, Duration::from_millis(400)).await;

        let provider = OpenAiCompatProvider::new("slow", format!("http://{addr}"), None, 1).unwrap();
        let started = std::time::Instant::now();
        let mut rx = provider
            .stream(ProviderRequest::streaming("m", vec![Message::user("hi")], vec![]))
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(item) = rx.recv().await {
            let chunk = item.expect("stream should not time out between events");
            text.push_str(chunk.content.as_deref().unwrap_or(""));
        }
        assert_eq!(text, "t0 t1 t2 t3 ");
        assert!(started.elapsed() > Duration::from_secs(1));
    }
}
