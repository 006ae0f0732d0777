//! End-to-end tests for chatloom.
//!
//! These drive a full session: scripted provider stream → exchange runner →
//! render relay → document tree, with the real tool registry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatloom::ChatSession;
use chatloom_agent::{ExchangeEvent, ExchangeRunner};
use chatloom_config::ChatConfig;
use chatloom_core::error::ProviderError;
use chatloom_core::message::Role;
use chatloom_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolCallDelta, Usage,
};
use chatloom_render::{AnnotationKind, DocumentTree, RenderScheduler};
use chatloom_tools::default_registry;
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

type Script = Vec<Result<StreamChunk, ProviderError>>;

/// Replays one script per round; the last script repeats.
struct ScriptedProvider {
    scripts: Vec<Script>,
    reject_with: Option<ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            reject_with: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(error: ProviderError) -> Self {
        Self {
            reject_with: Some(error),
            ..Self::new(vec![])
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
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

fn usage(total: u32) -> StreamChunk {
    StreamChunk {
        usage: Some(Usage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
        }),
        ..StreamChunk::default()
    }
}

fn text(fragments: &[&str]) -> Script {
    let mut script: Script = fragments.iter().map(|f| Ok(StreamChunk::content(*f))).collect();
    script.push(Ok(usage(12)));
    script
}

fn tool_call(id: &str, name: &str, args: &str) -> Script {
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
        Ok(usage(20)),
    ]
}

fn session(provider: Arc<ScriptedProvider>) -> ChatSession {
    let runner = ExchangeRunner::new(provider, "mock", Arc::new(default_registry()));
    let scheduler = RenderScheduler::with_timing(DocumentTree::new(), Duration::from_millis(5), 180);
    ChatSession::new(runner, scheduler)
}

fn observe() -> (
    mpsc::UnboundedSender<ExchangeEvent>,
    mpsc::UnboundedReceiver<ExchangeEvent>,
) {
    mpsc::unbounded_channel()
}

fn drain(mut rx: mpsc::UnboundedReceiver<ExchangeEvent>) -> Vec<ExchangeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── Plain answers ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_plain_answer_is_rendered_and_finalized() {
    let provider = Arc::new(ScriptedProvider::new(vec![text(&["Hello, ", "**world**", "!"])]));
    let mut session = session(provider.clone());

    let turn = session.send("hi there", None).await.expect("exchange should succeed");

    assert_eq!(turn.outcome.answer, "Hello, **world**!");
    assert_eq!(turn.outcome.rounds, 1);
    assert_eq!(provider.calls(), 1);

    let tree = session.tree();
    assert_eq!(tree.len().await, 2);
    assert_eq!(turn.message, 1);
    let body = tree.message_html(turn.message).await.unwrap();
    assert!(body.contains("<strong>world</strong>"));

    let html = tree.to_html().await;
    assert!(html.contains("class=\"message user finalized\""));
    assert!(html.contains("class=\"message assistant finalized\""));
    assert!(html.contains("hi there"));
}

#[tokio::test]
async fn e2e_conversation_carries_across_turns() {
    let provider = Arc::new(ScriptedProvider::new(vec![text(&["first"]), text(&["second"])]));
    let mut session = session(provider.clone());

    session.send("one", None).await.unwrap();
    session.send("two", None).await.unwrap();

    let roles: Vec<Role> = session.conversation().messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);

    // Second request sees the whole history plus the new user message.
    let second = provider.request(1);
    let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "first", "two"]);

    assert_eq!(session.tree().len().await, 4);
}

#[tokio::test]
async fn e2e_observer_sees_text_then_done() {
    let provider = Arc::new(ScriptedProvider::new(vec![text(&["a", "b"])]));
    let mut session = session(provider);
    let (tx, rx) = observe();

    session.send("go", Some(tx)).await.unwrap();
    let events = drain(rx);

    let kinds: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(kinds, vec!["text_changed", "text_changed", "done"]);
    match events.last() {
        Some(ExchangeEvent::Done { usage, rounds, .. }) => {
            assert_eq!(*rounds, 1);
            assert_eq!(usage.map(|u| u.total_tokens), Some(12));
        }
        other => panic!("expected done, got {other:?}"),
    }
}

// ── Tool rounds ──────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_calculator_round_then_answer() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("call_1", "calculator", r#"{"expression":"6*7"}"#),
        text(&["The answer is 42."]),
    ]));
    let mut session = session(provider.clone());
    let (tx, rx) = observe();

    let turn = session.send("what is 6*7?", Some(tx)).await.unwrap();

    assert_eq!(turn.outcome.answer, "The answer is 42.");
    assert_eq!(turn.outcome.rounds, 2);
    assert_eq!(turn.outcome.tool_calls_made, 1);
    assert!(!turn.outcome.round_limit_reached);
    assert_eq!(provider.calls(), 2);

    // Round two sees the call and its result.
    let second = provider.request(1);
    let tool_msg = second
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result in working sequence");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_msg.content.contains("42"));

    let events = drain(rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ExchangeEvent::ToolResult { name, success: true, output, .. }
            if name == "calculator" && output.contains("42")
    )));

    // The tool block is part of the rendered answer and closed once final.
    let body = session.tree().message_html(turn.message).await.unwrap();
    assert!(body.contains("tool-block"));
    assert!(body.contains("Tool: calculator"));
    assert!(body.contains("The answer is 42."));
    assert_eq!(
        session.tree().is_open(turn.message, AnnotationKind::Tool, 0).await,
        Some(false)
    );
}

#[tokio::test]
async fn e2e_unknown_tool_result_is_reported_to_model() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("call_x", "teleport", r#"{"to":"mars"}"#),
        text(&["I cannot do that."]),
    ]));
    let mut session = session(provider.clone());

    let turn = session.send("beam me up", None).await.unwrap();
    assert_eq!(turn.outcome.answer, "I cannot do that.");

    let second = provider.request(1);
    let tool_msg = second.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert!(payload["error"].as_str().unwrap().contains("teleport"));
}

#[tokio::test]
async fn e2e_round_limit_stops_endless_tool_calls() {
    // The single script repeats, so the model never stops asking.
    let provider = Arc::new(ScriptedProvider::new(vec![tool_call(
        "call_loop",
        "get_time",
        r#"{"timezone":"UTC"}"#,
    )]));
    let runner = ExchangeRunner::new(provider.clone(), "mock", Arc::new(default_registry()))
        .with_chat_config(&ChatConfig::default());
    let scheduler = RenderScheduler::with_timing(DocumentTree::new(), Duration::from_millis(5), 180);
    let mut session = ChatSession::new(runner, scheduler);
    let (tx, rx) = observe();

    let turn = session.send("what time is it?", Some(tx)).await.unwrap();

    assert_eq!(provider.calls(), 4);
    assert_eq!(turn.outcome.rounds, 4);
    assert!(turn.outcome.round_limit_reached);
    assert_eq!(turn.outcome.answer, "");

    let events = drain(rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ExchangeEvent::RoundLimitReached { rounds: 4 })));
    assert_eq!(events.last().map(|e| e.event_type()), Some("done"));
}

// ── Reasoning and math ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_reasoning_block_closes_on_finalize() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        Ok(StreamChunk::reasoning("Consider ")),
        Ok(StreamChunk::reasoning("the options.")),
        Ok(StreamChunk::content("Pick B.")),
        Ok(usage(9)),
    ]]));
    let mut session = session(provider);

    let turn = session.send("A or B?", None).await.unwrap();
    assert_eq!(turn.outcome.reasoning, "Consider the options.");

    let body = session.tree().message_html(turn.message).await.unwrap();
    assert!(body.contains("think-block"));
    assert!(body.contains("Consider the options."));
    assert!(body.contains("Pick B."));
    assert_eq!(
        session.tree().is_open(turn.message, AnnotationKind::Reasoning, 0).await,
        Some(false)
    );
}

#[tokio::test]
async fn e2e_math_is_painted_after_the_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![text(&["Euler: $e^{i\\pi}+1=0$ ", "done"])]));
    let mut session = session(provider);

    let turn = session.send("show me euler", None).await.unwrap();

    let body = session.tree().message_html(turn.message).await.unwrap();
    assert!(body.contains("math-slot"));
    assert!(body.contains("<span class=\"math-tex\">\\(e^{i\\pi}+1=0\\)</span>"));
}

// ── Failures ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_rejected_request_renders_error_message() {
    let provider = Arc::new(ScriptedProvider::rejecting(ProviderError::ApiError {
        status_code: 500,
        message: "upstream exploded".into(),
    }));
    let mut session = session(provider);
    let (tx, rx) = observe();

    let err = session.send("hello?", Some(tx)).await.unwrap_err();
    assert!(err.to_string().contains("upstream exploded"));

    // The failed exchange leaves no trace in the conversation.
    assert!(session.conversation().is_empty());

    let tree = session.tree();
    assert_eq!(tree.len().await, 3);
    let error_body = tree.message_html(2).await.unwrap();
    assert!(error_body.contains("<strong>Error:</strong>"));
    assert!(error_body.contains("upstream exploded"));

    let events = drain(rx);
    assert!(matches!(events.last(), Some(ExchangeEvent::Error { .. })));
}

#[tokio::test]
async fn e2e_interrupted_stream_keeps_partial_answer_visible() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        Ok(StreamChunk::content("Partial ans")),
        Err(ProviderError::StreamInterrupted("connection reset".into())),
    ]]));
    let mut session = session(provider);

    let err = session.send("tell me", None).await.unwrap_err();
    assert!(err.to_string().contains("connection reset"));

    let tree = session.tree();
    let partial = tree.message_html(1).await.unwrap();
    assert!(partial.contains("Partial ans"));
    let error_body = tree.message_html(2).await.unwrap();
    assert!(error_body.contains("connection reset"));
}
