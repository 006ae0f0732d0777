//! # chatloom
//!
//! Glue between the exchange runner and the document renderer, shared by
//! the `chatloom` binary and the end-to-end tests.

pub mod session;

pub use session::{ChatSession, Turn};
