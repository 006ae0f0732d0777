//! Provider trait — the abstraction over streaming chat-completion backends.
//!
//! A Provider knows how to send a message sequence to a model and hand back
//! the response as a channel of incremental [`StreamChunk`]s. Each chunk is one
//! decoded event record; the channel closing means the stream is finished.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// One outbound request (one round of an exchange).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model identifier (e.g., "llama", "gpt-4o")
    pub model: String,

    /// The full working message sequence
    pub messages: Vec<Message>,

    /// Tool declarations the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Ask the backend to append a usage-totals record to the stream
    #[serde(default = "default_true")]
    pub include_usage: bool,
}

fn default_true() -> bool {
    true
}

impl ProviderRequest {
    /// A streaming request with usage totals enabled.
    pub fn streaming(
        model: impl Into<String>,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            tools,
            stream: true,
            include_usage: true,
        }
    }
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A fragment of one tool call, keyed by its position in the model's call list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Partial argument text, to be concatenated in arrival order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A single decoded event record from a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Answer text delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Reasoning text delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Partial tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Usage totals (typically only in the last record)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A chunk carrying only answer text.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying only reasoning text.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying tool call fragments.
    pub fn tool_calls(deltas: Vec<ToolCallDelta>) -> Self {
        Self {
            tool_calls: deltas,
            ..Self::default()
        }
    }
}

/// The receiving half handed back by [`Provider::stream`].
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// The orchestrator calls `stream()` once per round without knowing which
/// backend is behind it. A transport failure is either returned directly
/// (request rejected) or delivered as an `Err` item on the channel (read failed
/// mid-stream); both are terminal for the exchange.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "llama.cpp").
    fn name(&self) -> &str;

    /// Send a request and get a stream of decoded event records.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError>;

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}
