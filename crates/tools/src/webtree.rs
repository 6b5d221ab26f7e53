//! Whole-site crawling and checks with WebTree.

use async_trait::async_trait;
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema, typed_args};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::output::output_dir_for;
use crate::process::{ProgramRun, strip_ansi};

#[derive(Deserialize)]
struct FullSiteArgs {
    target_url: String,
    #[serde(default)]
    use_poc: bool,
    max_links: Option<u32>,
    concurrency: Option<u32>,
}

/// `scan_full_site`: run `node index.js URL` inside the WebTree checkout.
pub struct FullSiteCapability {
    node: String,
    webtree_dir: PathBuf,
    timeout: Duration,
    output_root: PathBuf,
}

impl FullSiteCapability {
    pub fn new(webtree_dir: impl Into<PathBuf>, timeout: Duration, output_root: impl Into<PathBuf>) -> Self {
        Self {
            node: "node".into(),
            webtree_dir: webtree_dir.into(),
            timeout,
            output_root: output_root.into(),
        }
    }

    /// Use a different JavaScript runtime than `node`.
    pub fn with_runtime(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }
}

#[async_trait]
impl Capability for FullSiteCapability {
    fn name(&self) -> &str {
        "scan_full_site"
    }

    fn description(&self) -> &str {
        "Crawl a whole website with WebTree, mapping its pages and optionally \
         running proof-of-concept vulnerability checks against them."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("target_url", ParamKind::String, "The site root to crawl")
            .optional("use_poc", ParamKind::Boolean, "Run proof-of-concept checks on discovered pages")
            .optional("max_links", ParamKind::Count, "Maximum number of links to visit")
            .optional("concurrency", ParamKind::Count, "Number of concurrent requests")
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        let args: FullSiteArgs = typed_args(arguments)?;
        let dir = output_dir_for(&self.output_root, &args.target_url).await?;

        let mut run = ProgramRun::new(&self.node)
            .arg("index.js")
            .arg(args.target_url.clone())
            .current_dir(&self.webtree_dir)
            .timeout(self.timeout);
        if let Some(concurrency) = args.concurrency {
            run = run.arg("-c").arg(concurrency.to_string());
        }
        if let Some(max_links) = args.max_links {
            run = run.arg("-m").arg(max_links.to_string());
        }
        if args.use_poc {
            run = run.arg("--poc");
        }

        let output = run.run().await?;
        let cleaned = strip_ansi(&output.stdout);
        if cleaned.trim().is_empty() {
            warn!(url = %args.target_url, "WebTree finished without output");
            return Ok(Value::Null);
        }

        tokio::fs::write(dir.join("webtree_output.txt"), &cleaned).await?;
        Ok(Value::String(cleaned))
    }
}
