//! `get_time` tool — the current time, optionally in an IANA timezone.

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::tool::{Tool, ToolOutput};
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use tracing::debug;

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current time in ISO format, optionally formatted for a timezone."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "Optional IANA timezone. Example: America/Denver"
                }
            },
            "required": [],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let timezone = arguments["timezone"].as_str().unwrap_or_default();
        Ok(ToolOutput::json(describe(Utc::now(), timezone)))
    }
}

/// Build the tool's return record for a given instant.
///
/// A blank timezone yields `{"iso"}` only. An unknown zone still echoes the
/// name back, with `formatted: null`.
pub fn describe(now: DateTime<Utc>, timezone: &str) -> serde_json::Value {
    let iso = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let timezone = timezone.trim();
    if timezone.is_empty() {
        return serde_json::json!({ "iso": iso });
    }

    let formatted = match timezone.parse::<Tz>() {
        Ok(tz) => Some(
            now.with_timezone(&tz)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        Err(e) => {
            debug!(timezone, error = %e, "Unknown timezone");
            None
        }
    };

    serde_json::json!({
        "iso": iso,
        "timezone": timezone,
        "formatted": formatted,
    })
}
