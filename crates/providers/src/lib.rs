//! LLM provider implementations for chatloom.
//!
//! Every backend speaks the OpenAI-compatible streaming protocol and
//! implements the `chatloom_core::Provider` trait.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::{FALLBACK_PARSE_ERROR, OpenAiCompatProvider};

use chatloom_config::AppConfig;
use chatloom_core::error::ProviderError;
use chatloom_core::provider::Provider;
use tracing::{debug, warn};

/// Model used when nothing is configured and the listing yields nothing.
pub const DEFAULT_MODEL: &str = "llama";

/// Build the provider described by the configuration.
pub fn from_config(config: &AppConfig) -> Result<OpenAiCompatProvider, ProviderError> {
    OpenAiCompatProvider::new(
        "openai-compat",
        &config.endpoint,
        config.api_key.clone(),
        config.request_timeout_secs,
    )
}

/// Prefer the first id mentioning `llama`, else the first id.
pub fn pick_default_model(models: &[String]) -> Option<&str> {
    models
        .iter()
        .find(|m| m.to_ascii_lowercase().contains("llama"))
        .or_else(|| models.first())
        .map(String::as_str)
}

/// Resolve the model for this session.
///
/// An explicitly configured model always wins. Otherwise, with `auto_model`
/// set, the provider's listing is consulted; a failed listing is logged and
/// falls through to [`DEFAULT_MODEL`].
pub async fn resolve_model(config: &AppConfig, provider: &dyn Provider) -> String {
    if !config.model.is_empty() {
        return config.model.clone();
    }

    if config.auto_model {
        match provider.list_models().await {
            Ok(models) => {
                if let Some(model) = pick_default_model(&models) {
                    debug!(model, "Auto-selected model");
                    return model.to_string();
                }
            }
            Err(e) => warn!(error = %e, "Model listing failed, using default model"),
        }
    }

    DEFAULT_MODEL.to_string()
}
