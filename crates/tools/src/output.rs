//! Per-target output directories.
//!
//! Every capability writes its raw result under `<output_dir>/<host-slug>/`
//! so repeated scans of one host land together.

use scanpilot_core::CapabilityError;
use std::path::{Path, PathBuf};

const UNKNOWN_HOST: &str = "unknown_host";

/// Reduce a URL or bare host to a directory-safe slug.
///
/// `http://shop.example-site.com:8080/x` becomes `shop_example_site_com`.
pub fn host_slug(target: &str) -> String {
    let target = target.trim();
    let host = if target.starts_with("http://") || target.starts_with("https://") {
        reqwest::Url::parse(target)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    } else {
        target
            .split(['/', ':'])
            .next()
            .filter(|h| !h.is_empty())
            .map(str::to_string)
    };

    match host {
        Some(host) if !host.is_empty() => host.replace(['.', '-'], "_"),
        _ => UNKNOWN_HOST.to_string(),
    }
}

/// Create (if needed) and return the output directory for `target`.
pub async fn output_dir_for(root: &Path, target: &str) -> Result<PathBuf, CapabilityError> {
    let dir = root.join(host_slug(target));
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}
