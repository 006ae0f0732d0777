//! `chatloom models` — list the models the endpoint serves.

use chatloom_config::AppConfig;
use chatloom_core::provider::Provider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let provider = chatloom_providers::from_config(&config)?;

    let models = provider
        .list_models()
        .await
        .map_err(|e| format!("Could not list models from {}: {e}", config.endpoint))?;

    if models.is_empty() {
        println!("No models listed by {}", config.endpoint);
        return Ok(());
    }

    let preferred = if config.model.is_empty() {
        chatloom_providers::pick_default_model(&models)
    } else {
        Some(config.model.as_str())
    };

    println!("Models at {}:", config.endpoint);
    for model in &models {
        let marker = if Some(model.as_str()) == preferred { "*" } else { " " };
        println!("  {marker} {model}");
    }

    Ok(())
}
