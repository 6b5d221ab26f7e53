//! Subdomain enumeration with OneForAll.

use async_trait::async_trait;
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema, typed_args};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::output::output_dir_for;
use crate::process::ProgramRun;

#[derive(Deserialize)]
struct SubdomainArgs {
    target_host: String,
    #[serde(default)]
    extra_args: Vec<String>,
}

/// `scan_subdomain_enumeration`: run `oneforall.py --target HOST run`.
pub struct SubdomainEnumerationCapability {
    python: String,
    script: PathBuf,
    output_root: PathBuf,
}

impl SubdomainEnumerationCapability {
    pub fn new(python: impl Into<String>, script: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
            output_root: output_root.into(),
        }
    }
}

#[async_trait]
impl Capability for SubdomainEnumerationCapability {
    fn name(&self) -> &str {
        "scan_subdomain_enumeration"
    }

    fn description(&self) -> &str {
        "Enumerate the subdomains of a host with OneForAll."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("target_host", ParamKind::String, "The host to enumerate, e.g. 'example.com'")
            .optional(
                "extra_args",
                ParamKind::StringArray,
                "Additional command-line arguments passed to OneForAll",
            )
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        let args: SubdomainArgs = typed_args(arguments)?;
        let dir = output_dir_for(&self.output_root, &args.target_host).await?;
        let results_file = dir.join("oneforall_output.json");

        ProgramRun::new(&self.python)
            .arg(self.script.to_string_lossy())
            .arg("--fmt=json")
            .arg(format!("--path={}", results_file.display()))
            .args(["--target".to_string(), args.target_host, "run".to_string()])
            .args(args.extra_args)
            .run()
            .await?;

        let text = tokio::fs::read_to_string(&results_file).await.map_err(|e| {
            CapabilityError::Output(format!(
                "OneForAll wrote no results to {}: {e}",
                results_file.display()
            ))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| CapabilityError::Output(format!("OneForAll results are not JSON: {e}")))
    }
}
