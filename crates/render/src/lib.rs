//! # chatloom Render
//!
//! Turns accumulated exchange text into a document: reasoning and tool
//! annotations become disclosure blocks, math spans become cached render
//! slots, the rest goes through markdown. Redraws are coalesced by the
//! [`RenderScheduler`] so a fast stream does not redraw per token.
//!
//! Pipeline for one body, in order:
//! 1. [`annotation::extract`] — `<think>` / `<tool>` spans → placeholders
//! 2. [`math::extract`] — delimited math → placeholders + cache keys
//! 3. [`markup::markdown_to_html`] — markdown → sanitized HTML
//! 4. placeholders → disclosure blocks and math slots ([`document`])

pub mod annotation;
pub mod document;
pub mod error;
pub mod markup;
pub mod math;
mod scan;
pub mod scheduler;
pub mod scroll;

pub use annotation::{AnnotationKind, AnnotationSegment, AnnotationState};
pub use document::{Author, DocumentTree, MessageId, RenderReport};
pub use error::RenderError;
pub use math::{MathCache, MathRenderer, MathSegment, TexSourceRenderer};
pub use scheduler::RenderScheduler;
pub use scroll::{ScrollViewport, VirtualViewport};
