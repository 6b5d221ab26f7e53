//! `scanpilot inject|domain|site`: run one analysis session.

use chrono::Utc;
use scanpilot_agent::{AnalysisFlavor, AnalysisLoop};
use scanpilot_config::AppConfig;
use scanpilot_core::CapabilityRegistry;
use scanpilot_core::event::EventBus;
use scanpilot_core::provider::Provider;
use scanpilot_providers::OpenAiCompatProvider;
use scanpilot_tools::{SqlmapService, default_registry};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::progress::ConsoleProgress;

const POC_INSTRUCTION: &str = "Enable proof-of-concept checks";

pub async fn run(
    config_path: Option<&Path>,
    flavor: AnalysisFlavor,
    target: &str,
    poc: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    execute(config, &super::config_path(config_path), flavor, target, poc).await
}

/// Run a session with an already loaded config.
async fn execute(
    config: AppConfig,
    config_path: &Path,
    flavor: AnalysisFlavor,
    target: &str,
    poc: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Check for API key early, give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set SCANPILOT_API_KEY or OPENAI_API_KEY, or add api_key to:");
        eprintln!("    {}", config_path.display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config)?);
    let sqlmap = Arc::new(SqlmapService::from_config(&config.scanners)?);
    let registry = Arc::new(default_registry(&config.scanners, Arc::clone(&sqlmap))?);

    let analysis = session(provider, registry, &config);
    let prompt = seed_prompt(flavor, target, poc);

    info!(%flavor, scan_target = target, model = %config.model, "Starting session");
    let outcome = tokio::select! {
        result = analysis.run_prompt(flavor, prompt) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    // The sqlmap API must not outlive the session, whatever happened
    sqlmap.stop().await;

    match outcome {
        Some(Ok(report)) => {
            println!("{report}");
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => {
            warn!("Interrupted, session aborted");
            Err("analysis interrupted".into())
        }
    }
}

fn session(
    provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
    config: &AppConfig,
) -> AnalysisLoop {
    AnalysisLoop::from_config(provider, registry, Arc::new(EventBus::default()), config)
        .with_progress(Arc::new(ConsoleProgress::stderr()))
}

fn seed_prompt(flavor: AnalysisFlavor, target: &str, poc: bool) -> String {
    let mut prompt = flavor.seed_prompt(target, Utc::now());
    if poc {
        prompt.push_str("\n\n");
        prompt.push_str(POC_INSTRUCTION);
        prompt.push('.');
    }
    prompt
}
