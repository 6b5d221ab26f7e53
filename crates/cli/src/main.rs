//! scanpilot CLI: the main entry point.
//!
//! Commands:
//! - `inject`   Test one URL for SQL and template injection
//! - `domain`   Map a domain's subdomains and open ports
//! - `site`     Crawl and check a whole website
//! - `doctor`   Diagnose config, backend and scanner availability
//! - `onboard`  Write the default config file

use clap::{Parser, Subcommand};
use scanpilot_agent::AnalysisFlavor;
use std::path::PathBuf;

mod commands;
mod progress;

#[derive(Parser)]
#[command(
    name = "scanpilot",
    about = "scanpilot: model-driven web security analysis",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.scanpilot/config.toml
    #[arg(long, global = true, env = "SCANPILOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Test a URL's parameters for SQL and template injection
    Inject {
        /// The URL to test, including its query string
        url: String,
    },

    /// Enumerate a domain's subdomains and scan for open ports
    Domain {
        /// The domain to map
        host: String,
    },

    /// Crawl a website and review everything found
    Site {
        /// The site's root URL
        url: String,

        /// Enable proof-of-concept checks during the crawl
        #[arg(long)]
        poc: bool,
    },

    /// Diagnose system health
    Doctor,

    /// Initialize configuration
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the report
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Inject { url } => {
            commands::scan::run(config, AnalysisFlavor::Injection, &url, false).await?
        }
        Commands::Domain { host } => {
            commands::scan::run(config, AnalysisFlavor::Domain, &host, false).await?
        }
        Commands::Site { url, poc } => commands::scan::run(config, AnalysisFlavor::Site, &url, poc).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
        Commands::Onboard => commands::onboard::run(config).await?,
    }

    Ok(())
}
