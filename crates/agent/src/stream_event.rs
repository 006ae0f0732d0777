//! Exchange-level streaming events.
//!
//! `ExchangeEvent` is what the orchestrator publishes while an exchange runs.
//! The presentation side subscribes and feeds the render scheduler; the
//! orchestrator itself never touches markup.

use chatloom_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted during one exchange.
///
/// - `text_changed`        — answer or reasoning grew; carries the full document text
/// - `tool_call`           — a finalized call is about to run
/// - `tool_result`         — that call finished (successfully or not)
/// - `round_completed`     — a round ended with tool calls and another may follow
/// - `round_limit_reached` — the round bound stopped the loop with calls pending
/// - `done`                — the exchange finished; final metadata
/// - `error`               — a transport failure ended the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangeEvent {
    /// Render-ready text after the latest fragment.
    TextChanged {
        round: u32,
        document: String,
        answer: String,
        reasoning: String,
    },

    /// The model asked for a tool.
    ToolCall {
        round: u32,
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        round: u32,
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// A round ended with tool traffic appended to the working sequence.
    RoundCompleted { round: u32, tool_calls: usize },

    /// The bound was hit while the model still wanted tools.
    RoundLimitReached { rounds: u32 },

    /// The exchange is complete.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        rounds: u32,
        tool_calls_made: usize,
    },

    /// An error ended the exchange.
    Error { message: String },
}

impl ExchangeEvent {
    /// Stable event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextChanged { .. } => "text_changed",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::RoundCompleted { .. } => "round_completed",
            Self::RoundLimitReached { .. } => "round_limit_reached",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_text_changed() {
        let event = ExchangeEvent::TextChanged {
            round: 1,
            document: "Hello".into(),
            answer: "Hello".into(),
            reasoning: String::new(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"text_changed""#));
        assert!(json.contains(r#""document":"Hello""#));
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = ExchangeEvent::ToolCall {
            round: 1,
            id: "call_1".into(),
            name: "calculator".into(),
            input: serde_json::json!({"expression": "2*3"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"calculator""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = ExchangeEvent::Done {
            conversation_id: "abc".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            rounds: 2,
            tool_calls_made: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""rounds":2"#));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            ExchangeEvent::RoundLimitReached { rounds: 4 }.event_type(),
            "round_limit_reached"
        );
        assert_eq!(
            ExchangeEvent::RoundCompleted {
                round: 1,
                tool_calls: 2
            }
            .event_type(),
            "round_completed"
        );
        assert_eq!(
            ExchangeEvent::Error {
                message: "x".into()
            }
            .event_type(),
            "error"
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"round_limit_reached","rounds":4}"#;
        let event: ExchangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ExchangeEvent::RoundLimitReached { rounds: 4 });
    }
}
