//! Sequential execution of a finalized tool call list.
//!
//! Every requested call yields exactly one [`ToolResult`], in request order.
//! A failing or unknown tool becomes an `{"error": "..."}` record instead of
//! aborting the remaining calls.

use chatloom_core::message::MessageToolCall;
use chatloom_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::{debug, warn};

/// Parse argument text, falling back to an empty object.
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => serde_json::Value::Object(serde_json::Map::new()),
    }
}

/// Run one call and serialize its outcome.
pub async fn execute_one(registry: &ToolRegistry, call: &MessageToolCall) -> ToolResult {
    let request = ToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments: parse_arguments(&call.arguments),
    };

    let start = std::time::Instant::now();
    let result = registry.execute(&request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(output) => {
            debug!(tool = %call.name, duration_ms, "Tool executed");
            ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content: output.content,
                success: true,
            }
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
            ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content: serde_json::json!({ "error": e.to_string() }).to_string(),
                success: false,
            }
        }
    }
}

/// Run every call in order. Later calls may depend on earlier side effects,
/// so nothing runs concurrently.
pub async fn execute_all(registry: &ToolRegistry, calls: &[MessageToolCall]) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(execute_one(registry, call).await);
    }
    results
}
