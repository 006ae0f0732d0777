//! Rendering errors.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The math renderer rejected or failed on a formula.
    #[error("Math render failed for `{tex}`: {reason}")]
    Math { tex: String, reason: String },

    /// No message with this id exists in the document.
    #[error("Unknown message: {0}")]
    UnknownMessage(usize),
}
