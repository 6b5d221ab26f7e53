//! Server-side template injection probing with SSTImap.

use async_trait::async_trait;
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema, typed_args};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use crate::output::output_dir_for;
use crate::process::{ProgramRun, strip_ansi};

const START_MARKER: &str = "SSTImap identified the following injection point:";
const END_MARKER: &str = "Rerun SSTImap providing one of the following options";

#[derive(Deserialize)]
struct TemplateInjectionArgs {
    target_url: String,
    #[serde(default)]
    extra_args: Vec<String>,
}

/// `scan_template_injection`: run `sstimap.py -u URL`.
pub struct TemplateInjectionCapability {
    python: String,
    script: PathBuf,
    output_root: PathBuf,
}

impl TemplateInjectionCapability {
    pub fn new(python: impl Into<String>, script: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
            output_root: output_root.into(),
        }
    }
}

/// Pull the injection-point report out of SSTImap's console output.
///
/// Returns `None` when SSTImap found nothing to report.
fn extract_injection_point(output: &str) -> Option<String> {
    let mut lines = output
        .lines()
        .skip_while(|line| !line.contains(START_MARKER))
        .peekable();
    lines.peek()?;

    let block: Vec<&str> = lines
        .take_while(|line| !line.contains(END_MARKER))
        .map(str::trim_start)
        .collect();
    Some(block.join("\n").trim().to_string())
}

#[async_trait]
impl Capability for TemplateInjectionCapability {
    fn name(&self) -> &str {
        "scan_template_injection"
    }

    fn description(&self) -> &str {
        "Scan a URL for server-side template injection (SSTI) with SSTImap."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required(
                "target_url",
                ParamKind::String,
                "The URL to test, e.g. 'http://example.com/profile?name=guest'",
            )
            .optional(
                "extra_args",
                ParamKind::StringArray,
                "Additional command-line arguments passed to SSTImap",
            )
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        let args: TemplateInjectionArgs = typed_args(arguments)?;
        let dir = output_dir_for(&self.output_root, &args.target_url).await?;

        let output = ProgramRun::new(&self.python)
            .arg(self.script.to_string_lossy())
            .args(["-u".to_string(), args.target_url.clone()])
            .args(args.extra_args)
            .run()
            .await?;

        let cleaned = strip_ansi(&output.stdout);
        let report = match extract_injection_point(&cleaned) {
            Some(block) => block,
            None => {
                debug!(url = %args.target_url, "No injection point reported by SSTImap");
                cleaned.trim().to_string()
            }
        };

        tokio::fs::write(dir.join("sstimap_output.txt"), &report).await?;
        Ok(Value::String(report))
    }
}
