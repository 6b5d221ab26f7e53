//! Availability checks for the external programs the capabilities wrap.

use futures::future::join_all;
use scanpilot_config::ScannerConfig;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Whether one external program was found, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: String,
    pub location: Option<String>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.location.is_some()
    }
}

async fn locate_binary(name: String) -> ToolStatus {
    let location = match Command::new("which")
        .arg(&name)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
                .filter(|path| !path.is_empty())
        }
        _ => None,
    };
    ToolStatus { name, location }
}

async fn locate_script(name: &str, path: PathBuf) -> ToolStatus {
    let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
    ToolStatus {
        name: name.to_string(),
        location: exists.then(|| path.display().to_string()),
    }
}

/// Check every binary and script the capability set depends on.
///
/// Binaries are looked up on `PATH` concurrently; results come back in
/// the order checked.
pub async fn check_tools(config: &ScannerConfig) -> Vec<ToolStatus> {
    let binaries = [
        config.nmap_binary.clone(),
        "ffuf".to_string(),
        "node".to_string(),
        config.python.clone(),
    ];
    let mut statuses = join_all(binaries.into_iter().map(locate_binary)).await;

    let scripts = [
        ("sqlmapapi", config.sqlmap_api_path.clone()),
        ("sstimap", config.sstimap_path.clone()),
        ("oneforall", config.oneforall_path.clone()),
        ("webtree", config.webtree_dir.join("index.js")),
    ];
    for (name, path) in scripts {
        statuses.push(locate_script(name, path).await);
    }
    statuses
}
