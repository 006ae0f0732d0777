//! The bounded multi-round exchange.
//!
//! One exchange turns a user payload into a final answer. Each round streams
//! one model response; if the model asks for tools they run, their traffic is
//! appended to the working sequence, and the next round starts. The number of
//! rounds is capped regardless of how many calls the model keeps requesting.

use std::sync::Arc;

use chatloom_config::ChatConfig;
use chatloom_core::message::{Conversation, Message, MessageToolCall, Role};
use chatloom_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use chatloom_core::tool::{ToolRegistry, ToolResult};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::accumulator::DeltaAccumulator;
use crate::stream_event::ExchangeEvent;
use crate::tool_stage;

/// What a finished exchange produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    /// The final round's answer text (possibly empty).
    pub answer: String,
    /// The final round's reasoning text.
    pub reasoning: String,
    /// Render-ready text: prior rounds' annotations followed by the answer.
    pub document: String,
    pub rounds: u32,
    pub tool_calls_made: usize,
    pub usage: Option<Usage>,
    /// The loop stopped at the bound while the model still wanted tools.
    pub round_limit_reached: bool,
}

/// Drives provider rounds and tool execution for one conversation.
pub struct ExchangeRunner {
    provider: Arc<dyn Provider>,
    model: String,
    tools: Arc<ToolRegistry>,
    max_rounds: u32,
    max_messages: usize,
    include_reasoning: bool,
    system_prompt: Option<String>,
}

impl ExchangeRunner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            tools,
            max_rounds: 4,
            max_messages: 20,
            include_reasoning: true,
            system_prompt: None,
        }
    }

    /// Apply the `[chat]` section of the configuration.
    pub fn with_chat_config(self, config: &ChatConfig) -> Self {
        let runner = self
            .with_max_rounds(config.max_tool_rounds)
            .with_max_messages(config.max_messages)
            .with_include_reasoning(config.include_reasoning);
        match &config.system_prompt {
            Some(prompt) => runner.with_system_prompt(prompt.clone()),
            None => runner,
        }
    }

    /// Set the maximum number of provider rounds per exchange (at least one).
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    /// Set the rolling window applied to the conversation after an exchange.
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    /// Whether reasoning is placed into the document text.
    pub fn with_include_reasoning(mut self, include: bool) -> Self {
        self.include_reasoning = include;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one exchange.
    ///
    /// On success the conversation becomes the working sequence plus the final
    /// answer, trimmed to the rolling window. On a transport failure the
    /// conversation is left untouched, an `Error` event is published, and the
    /// error is returned.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        user_payload: &str,
        events: Option<&mpsc::UnboundedSender<ExchangeEvent>>,
    ) -> Result<ExchangeOutcome, chatloom_core::Error> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            model = %self.model,
            "Starting exchange"
        );

        match self.drive(conversation, user_payload, events).await {
            Ok((outcome, working)) => {
                let mut messages = working;
                messages.push(Message::assistant(&outcome.answer));
                conversation.replace(messages);
                conversation.trim_to_window(self.max_messages);

                emit(
                    events,
                    ExchangeEvent::Done {
                        conversation_id: conversation.id.to_string(),
                        usage: outcome.usage,
                        rounds: outcome.rounds,
                        tool_calls_made: outcome.tool_calls_made,
                    },
                );
                info!(
                    conversation_id = %conversation.id,
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls_made,
                    "Exchange complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "Exchange failed");
                emit(events, ExchangeEvent::Error { message: e.to_string() });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        conversation: &Conversation,
        user_payload: &str,
        events: Option<&mpsc::UnboundedSender<ExchangeEvent>>,
    ) -> Result<(ExchangeOutcome, Vec<Message>), chatloom_core::Error> {
        let mut working = self.working_sequence(conversation, user_payload);
        let tool_definitions = self.tools.definitions();
        let mut blocks = Annotations::default();

        let mut answer = String::new();
        let mut reasoning = String::new();
        let mut usage = None;
        let mut rounds = 0;
        let mut tool_calls_made = 0;
        let mut round_limit_reached = false;
        let mut tail_reasoning = true;

        for round in 1..=self.max_rounds {
            rounds = round;
            debug!(round, messages = working.len(), "Exchange round");

            let acc = self
                .stream_round(round, &working, &tool_definitions, &blocks, events)
                .await?;

            answer = acc.answer().to_string();
            reasoning = acc.reasoning().to_string();
            usage = acc.usage().or(usage);

            let calls = acc.finalize();
            if calls.is_empty() {
                tail_reasoning = true;
                break;
            }

            debug!(round, tool_count = calls.len(), "Executing tool calls");
            for call in &calls {
                emit(
                    events,
                    ExchangeEvent::ToolCall {
                        round,
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: tool_stage::parse_arguments(&call.arguments),
                    },
                );
            }

            let results = tool_stage::execute_all(&self.tools, &calls).await;
            for result in &results {
                emit(
                    events,
                    ExchangeEvent::ToolResult {
                        round,
                        id: result.call_id.clone(),
                        name: result.name.clone(),
                        output: result.content.clone(),
                        success: result.success,
                    },
                );
            }

            if self.include_reasoning {
                blocks.reasoning(round, &reasoning);
            }
            blocks.tools(&calls, &results);
            tail_reasoning = false;

            tool_calls_made += calls.len();
            working.push(Message::assistant_tool_calls(calls));
            working.extend(
                results
                    .into_iter()
                    .map(|r| Message::tool_result(r.call_id, r.content)),
            );

            emit(
                events,
                ExchangeEvent::RoundCompleted {
                    round,
                    tool_calls: tool_calls_made,
                },
            );

            if round == self.max_rounds {
                round_limit_reached = true;
                warn!(
                    rounds = round,
                    "Round limit reached with tool calls pending, using last answer"
                );
                emit(events, ExchangeEvent::RoundLimitReached { rounds: round });
            }
        }

        let document = if tail_reasoning && self.include_reasoning {
            blocks.compose(rounds, &reasoning, ReasoningState::Done, &answer)
        } else {
            blocks.compose(rounds, "", ReasoningState::Done, &answer)
        };

        let outcome = ExchangeOutcome {
            answer,
            reasoning,
            document,
            rounds,
            tool_calls_made,
            usage,
            round_limit_reached,
        };
        Ok((outcome, working))
    }

    /// Stream one round to completion, publishing text changes as they land.
    async fn stream_round(
        &self,
        round: u32,
        working: &[Message],
        tool_definitions: &[ToolDefinition],
        blocks: &Annotations,
        events: Option<&mpsc::UnboundedSender<ExchangeEvent>>,
    ) -> Result<DeltaAccumulator, chatloom_core::Error> {
        let request = ProviderRequest::streaming(
            self.model.clone(),
            working.to_vec(),
            tool_definitions.to_vec(),
        );
        let mut rx = self.provider.stream(request).await?;

        let mut acc = DeltaAccumulator::new();
        let mut state = ReasoningState::Live;

        while let Some(item) = rx.recv().await {
            let applied = acc.apply(item?);
            if applied.first_answer {
                state = ReasoningState::Done;
            }
            if !applied.text_changed {
                continue;
            }

            let shown_reasoning = if self.include_reasoning { acc.reasoning() } else { "" };
            emit(
                events,
                ExchangeEvent::TextChanged {
                    round,
                    document: blocks.compose(round, shown_reasoning, state, acc.answer()),
                    answer: acc.answer().to_string(),
                    reasoning: acc.reasoning().to_string(),
                },
            );
        }

        Ok(acc)
    }

    /// Conversation + optional system prompt + this exchange's user turn.
    fn working_sequence(&self, conversation: &Conversation, user_payload: &str) -> Vec<Message> {
        let mut working = conversation.messages.clone();
        if let Some(prompt) = &self.system_prompt {
            match working.first_mut() {
                Some(first) if first.role == Role::System => first.content = prompt.clone(),
                _ => working.insert(0, Message::system(prompt)),
            }
        }
        working.push(Message::user(user_payload));
        working
    }
}

fn emit(events: Option<&mpsc::UnboundedSender<ExchangeEvent>>, event: ExchangeEvent) {
    if let Some(tx) = events {
        // A dropped subscriber only loses presentation.
        let _ = tx.send(event);
    }
}

// ── Document text ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReasoningState {
    Live,
    Done,
}

impl ReasoningState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Done => "done",
        }
    }
}

/// Finished annotation blocks from earlier rounds, in order.
#[derive(Debug, Default)]
struct Annotations {
    blocks: Vec<String>,
}

impl Annotations {
    fn reasoning(&mut self, round: u32, text: &str) {
        if !text.trim().is_empty() {
            self.blocks.push(think_block(round, text, ReasoningState::Done));
        }
    }

    fn tools(&mut self, calls: &[MessageToolCall], results: &[ToolResult]) {
        for (call, result) in calls.iter().zip(results) {
            let input = if call.arguments.trim().is_empty() {
                "{}"
            } else {
                call.arguments.as_str()
            };
            self.blocks.push(format!(
                "<tool id=\"{}\" name=\"{}\" state=\"done\">INPUT:\n{}\n\nOUTPUT:\n{}</tool>",
                call.id,
                call.name,
                defuse_closers(input),
                defuse_closers(&result.content)
            ));
        }
    }

    /// Earlier blocks, then the current round's reasoning and answer.
    fn compose(&self, round: u32, reasoning: &str, state: ReasoningState, answer: &str) -> String {
        let mut parts: Vec<&str> = self.blocks.iter().map(String::as_str).collect();
        let think = (!reasoning.is_empty()).then(|| think_block(round, reasoning, state));
        if let Some(think) = &think {
            parts.push(think);
        }
        if !answer.is_empty() {
            parts.push(answer);
        }
        parts.join("\n\n")
    }
}

fn think_block(round: u32, text: &str, state: ReasoningState) -> String {
    format!(
        "<think id=\"r{round}\" state=\"{}\">{}</think>",
        state.as_str(),
        defuse_closers(text)
    )
}

/// Closing tags the renderer ends annotation spans on.
const SPAN_CLOSERS: [&str; 3] = ["</think>", "</reasoning>", "</tool>"];

/// Break any span closer inside an annotation body with a zero-width space,
/// so model or tool text cannot end the enclosing span early.
fn defuse_closers(text: &str) -> String {
    SPAN_CLOSERS.iter().fold(text.to_string(), |acc, closer| {
        if acc.contains(closer) {
            acc.replace(closer, &format!("<\u{200B}{}", &closer[1..]))
        } else {
            acc
        }
    })
}
