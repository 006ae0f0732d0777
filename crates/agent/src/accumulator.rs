//! Per-round accumulation of streamed deltas.
//!
//! Answer and reasoning text are independent append-only channels. Tool
//! call fragments merge into a table keyed by their index until the round
//! ends and [`DeltaAccumulator::finalize`] turns them into a call list.

use std::collections::BTreeMap;

use chatloom_core::message::MessageToolCall;
use chatloom_core::provider::{StreamChunk, ToolCallDelta, Usage};

/// A tool call still being assembled from fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl PendingToolCall {
    fn merge(&mut self, delta: ToolCallDelta) {
        if self.id.is_none() {
            self.id = delta.id.filter(|id| !id.is_empty());
        }
        if self.name.is_none() {
            self.name = delta.name.filter(|name| !name.is_empty());
        }
        if let Some(fragment) = delta.arguments {
            self.arguments.push_str(&fragment);
        }
    }
}

/// What a single [`DeltaAccumulator::apply`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    /// Answer or reasoning text grew.
    pub text_changed: bool,
    /// This record carried the round's first answer fragment.
    pub first_answer: bool,
}

#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    answer: String,
    reasoning: String,
    calls: BTreeMap<u32, PendingToolCall>,
    usage: Option<Usage>,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded event record into the running state.
    pub fn apply(&mut self, chunk: StreamChunk) -> Applied {
        let mut applied = Applied::default();

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        for delta in chunk.tool_calls {
            self.calls
                .entry(delta.index)
                .or_insert_with(|| PendingToolCall {
                    index: delta.index,
                    ..PendingToolCall::default()
                })
                .merge(delta);
        }

        if let Some(reasoning) = chunk.reasoning.filter(|r| !r.is_empty()) {
            self.reasoning.push_str(&reasoning);
            applied.text_changed = true;
        }

        if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
            applied.first_answer = self.answer.is_empty();
            self.answer.push_str(&content);
            applied.text_changed = true;
        }

        applied
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// The raw partial-call table, ordered by index.
    pub fn pending(&self) -> impl Iterator<Item = &PendingToolCall> {
        self.calls.values()
    }

    /// Ordered, validated call list. Entries lacking an id or a name are
    /// dropped without error.
    pub fn finalize(&self) -> Vec<MessageToolCall> {
        self.calls
            .values()
            .filter_map(|pending| {
                Some(MessageToolCall {
                    id: pending.id.clone()?,
                    name: pending.name.clone()?,
                    arguments: pending.arguments.clone(),
                })
            })
            .collect()
    }
}
