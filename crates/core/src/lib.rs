//! # chatloom Core
//!
//! Domain types, traits, and error definitions for the chatloom streaming
//! chat orchestrator. This crate has **zero framework dependencies**; it
//! defines the domain model that the provider, tool, agent, and render
//! crates implement against.
//!
//! ## Layout
//!
//! - [`message`] — conversation turns and the rolling conversation window
//! - [`provider`] — the streaming provider trait and incremental delta records
//! - [`tool`] — the tool trait, registry, and per-call results
//! - [`error`] — `thiserror` error hierarchy shared by every crate

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, StreamChunk, ToolCallDelta, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolOutput, ToolRegistry, ToolResult};
