//! `scanpilot doctor`: system diagnostics.

use scanpilot_core::provider::Provider;
use scanpilot_providers::OpenAiCompatProvider;
use scanpilot_tools::check_tools;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("scanpilot doctor: system diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let path = super::config_path(config_path);
    if !path.exists() {
        println!("  ⚠️  No config file at {}, using defaults (run `scanpilot onboard`)", path.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  1 issue found. Fix the config and re-run.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
        match OpenAiCompatProvider::from_config(&config) {
            Ok(provider) => match provider.health_check().await {
                Ok(true) => println!("  ✅ Backend reachable at {}", config.base_url),
                Ok(false) => {
                    println!("  ❌ Backend at {} rejected the health check", config.base_url);
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Backend unreachable: {e}");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ Could not build the backend client: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  No API key configured. Set SCANPILOT_API_KEY or add api_key to the config");
        issues += 1;
    }

    println!("\n  Scanners:");
    for tool in check_tools(&config.scanners).await {
        match &tool.location {
            Some(location) => println!("  ✅ {:<10} {location}", tool.name),
            None => {
                println!("  ❌ {:<10} not found", tool.name);
                issues += 1;
            }
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
