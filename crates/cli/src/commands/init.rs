//! `chatloom init` — write the default configuration.

use chatloom_config::AppConfig;

pub async fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Wrote config to: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set `endpoint` (and `api_key` if the server needs one)");
    println!("  2. Run: chatloom models");
    println!("  3. Run: chatloom chat");

    Ok(())
}
