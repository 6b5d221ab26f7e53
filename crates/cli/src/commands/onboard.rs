//! `scanpilot onboard`: first-time setup.

use scanpilot_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_path(config_path);

    println!("scanpilot: first-time setup");
    println!("===========================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    tokio::fs::write(&config_path, AppConfig::default_toml()).await?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Add your API key to {} (or set SCANPILOT_API_KEY)", config_path.display());
    println!("   2. Point the [scanners] paths at your sqlmap, SSTImap, OneForAll and WebTree checkouts");
    println!("   3. Run: scanpilot doctor\n");

    Ok(())
}
