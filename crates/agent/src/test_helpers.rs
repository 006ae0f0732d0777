//! Shared test helpers for exchange tests.

use chatloom_core::error::ProviderError;
use chatloom_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolCallDelta, Usage,
};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub type Script = Vec<Result<StreamChunk, ProviderError>>;

/// A mock provider that replays one scripted stream per round.
///
/// Each call to `stream` plays the next script; once the scripts run out the
/// last one repeats, so a single tool-call script models a model that never
/// stops asking for tools.
pub struct ScriptedProvider {
    scripts: Vec<Script>,
    requests: Mutex<Vec<ProviderRequest>>,
    reject_with: Option<ProviderError>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            requests: Mutex::new(Vec::new()),
            reject_with: None,
        }
    }

    /// A provider whose request is refused before any stream opens.
    pub fn rejecting(error: ProviderError) -> Self {
        Self {
            reject_with: Some(error),
            ..Self::new(vec![])
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let round = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };

        if let Some(error) = &self.reject_with {
            return Err(error.clone());
        }

        let script = self
            .scripts
            .get(round)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(script.len().max(1));
        for item in script {
            tx.send(item).await.unwrap();
        }
        Ok(rx)
    }
}

/// A plain streamed answer, split into fragments, ending with usage.
pub fn text_script(fragments: &[&str]) -> Script {
    let mut script: Script = fragments
        .iter()
        .map(|f| Ok(StreamChunk::content(*f)))
        .collect();
    script.push(Ok(usage_chunk(15)));
    script
}

/// One tool call streamed in two argument fragments.
pub fn tool_call_script(id: &str, name: &str, args: &str) -> Script {
    let (head, tail) = args.split_at(args.len() / 2);
    vec![
        Ok(StreamChunk::tool_calls(vec![ToolCallDelta {
            index: 0,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: Some(head.into()),
        }])),
        Ok(StreamChunk::tool_calls(vec![ToolCallDelta {
            index: 0,
            arguments: Some(tail.into()),
            ..ToolCallDelta::default()
        }])),
        Ok(usage_chunk(20)),
    ]
}

pub fn usage_chunk(total: u32) -> StreamChunk {
    StreamChunk {
        usage: Some(Usage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
        }),
        ..StreamChunk::default()
    }
}
