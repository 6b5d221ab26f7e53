//! Directory and file fuzzing with ffuf.

use async_trait::async_trait;
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema, typed_args};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::output::output_dir_for;
use crate::process::ProgramRun;

#[derive(Deserialize)]
struct DirectoryFuzzArgs {
    target_url: String,
    wordlist: Option<String>,
    threads: Option<u32>,
    match_codes: Option<String>,
}

#[derive(Deserialize)]
struct FfufReport {
    #[serde(default)]
    results: Vec<FfufHit>,
}

#[derive(Deserialize)]
struct FfufHit {
    input: FfufInput,
    status: u16,
    length: u64,
}

#[derive(Deserialize)]
struct FfufInput {
    #[serde(rename = "FUZZ")]
    fuzz: String,
}

/// `scan_directory_fuzzing`: run ffuf against a `FUZZ` URL.
pub struct DirectoryFuzzCapability {
    binary: String,
    default_wordlist: PathBuf,
    output_root: PathBuf,
}

impl DirectoryFuzzCapability {
    pub fn new(default_wordlist: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: "ffuf".into(),
            default_wordlist: default_wordlist.into(),
            output_root: output_root.into(),
        }
    }
}

/// Reduce ffuf's JSON report to `{key, status, size}` hits.
fn summarize(report: &str) -> Result<Value, CapabilityError> {
    let report: FfufReport = serde_json::from_str(report)
        .map_err(|e| CapabilityError::Output(format!("ffuf report is not valid JSON: {e}")))?;
    Ok(report
        .results
        .into_iter()
        .map(|hit| {
            serde_json::json!({
                "key": hit.input.fuzz,
                "status": hit.status,
                "size": hit.length,
            })
        })
        .collect())
}

#[async_trait]
impl Capability for DirectoryFuzzCapability {
    fn name(&self) -> &str {
        "scan_directory_fuzzing"
    }

    fn description(&self) -> &str {
        "Fuzz a URL for hidden directories and files with ffuf. \
         The URL must contain the FUZZ keyword, e.g. 'http://example.com/FUZZ'."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("target_url", ParamKind::String, "URL containing the FUZZ keyword")
            .optional("wordlist", ParamKind::String, "Path to the wordlist to use")
            .optional("threads", ParamKind::Count, "Number of concurrent threads")
            .optional("match_codes", ParamKind::String, "HTTP status codes to match, e.g. '200,302'")
    }

    fn check(&self, arguments: &Arguments) -> Result<(), String> {
        match arguments.get("target_url").and_then(Value::as_str) {
            Some(url) if url.contains("FUZZ") => Ok(()),
            _ => Err("target_url must contain the FUZZ keyword".into()),
        }
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        let args: DirectoryFuzzArgs = typed_args(arguments)?;
        let dir = output_dir_for(&self.output_root, &args.target_url).await?;
        let report_file = dir.join("ffuf_output.json");
        let wordlist = args
            .wordlist
            .unwrap_or_else(|| self.default_wordlist.to_string_lossy().into_owned());

        let mut run = ProgramRun::new(&self.binary)
            .args(["-u".to_string(), args.target_url, "-w".to_string(), wordlist])
            .args(["-of", "json", "-o"])
            .arg(report_file.to_string_lossy());
        if let Some(threads) = args.threads {
            run = run.arg("-t").arg(threads.to_string());
        }
        if let Some(codes) = args.match_codes {
            run = run.arg("-mc").arg(codes);
        }
        run.run().await?;

        let report = tokio::fs::read_to_string(&report_file).await?;
        summarize(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_hits() {
        let report = r#"{
            "commandline": "ffuf -u http://t/FUZZ",
            "results": [
                {"input": {"FUZZ": "admin"}, "position": 1, "status": 301, "length": 169, "words": 5},
                {"input": {"FUZZ": "index.php"}, "position": 2, "status": 200, "length": 4958, "words": 100}
            ]
        }"#;
        let hits = summarize(report).unwrap();
        assert_eq!(
            hits,
            serde_json::json!([
                {"key": "admin", "status": 301, "size": 169},
                {"key": "index.php", "status": 200, "size": 4958}
            ])
        );
    }

    #[test]
    fn garbage_report_is_output_error() {
        assert!(matches!(summarize("not json"), Err(CapabilityError::Output(_))));
    }

    fn target(url: &str) -> Arguments {
        let mut args = Arguments::new();
        args.insert("target_url".into(), Value::String(url.into()));
        args
    }

    #[test]
    fn url_without_fuzz_keyword_rejected() {
        let cap = DirectoryFuzzCapability::new("/tmp/words.txt", "out");
        assert!(cap.check(&target("http://example.com/")).unwrap_err().contains("FUZZ"));
        assert!(cap.check(&target("http://example.com/FUZZ")).is_ok());
    }

    #[test]
    fn negative_thread_count_fails_schema() {
        let cap = DirectoryFuzzCapability::new("/tmp/words.txt", "out");
        let mut args = target("http://example.com/FUZZ");
        args.insert("threads".into(), Value::from(-4));
        assert!(cap.schema().validate(&args).is_err());
    }
}
