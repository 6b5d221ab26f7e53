//! Capabilities for scanpilot.
//!
//! Each capability is a thin wrapper around one external scanner: it builds
//! the command line, runs it, keeps the raw result under the per-host
//! output directory, and hands a JSON summary back to the loop.
//!
//! The sqlmap wrapper talks to a long-lived REST API process owned by
//! [`SqlmapService`]; the session owner is responsible for stopping it.

pub mod check;
pub mod fetch;
pub mod ffuf;
pub mod nmap;
pub mod oneforall;
pub mod output;
pub mod process;
pub mod sqlmap;
pub mod sstimap;
pub mod webtree;

use scanpilot_config::ScannerConfig;
use scanpilot_core::{CapabilityError, CapabilityRegistry};
use std::sync::Arc;
use std::time::Duration;

pub use check::{ToolStatus, check_tools};
pub use sqlmap::SqlmapService;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the registry of every built-in capability.
pub fn default_registry(
    config: &ScannerConfig,
    sqlmap: Arc<SqlmapService>,
) -> Result<CapabilityRegistry, CapabilityError> {
    let root = &config.output_dir;
    let mut registry = CapabilityRegistry::new();

    registry.register(Arc::new(ffuf::DirectoryFuzzCapability::new(&config.ffuf_wordlist, root)));
    registry.register(Arc::new(sqlmap::SqlInjectionCapability::new(sqlmap, root)));
    registry.register(Arc::new(sstimap::TemplateInjectionCapability::new(
        &config.python,
        &config.sstimap_path,
        root,
    )));
    registry.register(Arc::new(oneforall::SubdomainEnumerationCapability::new(
        &config.python,
        &config.oneforall_path,
        root,
    )));
    registry.register(Arc::new(nmap::PortScanCapability::new(&config.nmap_binary, root)));
    registry.register(Arc::new(fetch::FetchUrlCapability::new(FETCH_TIMEOUT)?));
    registry.register(Arc::new(webtree::FullSiteCapability::new(
        &config.webtree_dir,
        Duration::from_secs(config.webtree_timeout_secs),
        root,
    )));

    Ok(registry)
}
