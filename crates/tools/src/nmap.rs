//! Port scanning with nmap's greppable output.

use async_trait::async_trait;
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema, typed_args};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::output::output_dir_for;
use crate::process::ProgramRun;

/// One open port from an nmap run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenPort {
    pub port: u16,
    pub protocol: String,
    pub service: String,
}

#[derive(Deserialize)]
struct PortScanArgs {
    target_host: String,
    ports: Option<String>,
    #[serde(default)]
    extra_args: Vec<String>,
}

/// `scan_port_scanning`: run `nmap -oG - HOST`.
pub struct PortScanCapability {
    binary: String,
    output_root: PathBuf,
}

impl PortScanCapability {
    pub fn new(binary: impl Into<String>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            output_root: output_root.into(),
        }
    }
}

/// Collect the open ports from `-oG` output.
///
/// A host line looks like
/// `Host: 10.0.0.1 ()\tPorts: 22/open/tcp//ssh///, 80/closed/tcp//http///`.
pub fn parse_greppable(output: &str) -> Vec<OpenPort> {
    let mut open = Vec::new();
    for line in output.lines().filter(|l| !l.starts_with('#')) {
        let Some((_, rest)) = line.split_once("Ports: ") else {
            continue;
        };
        let ports = rest.split('\t').next().unwrap_or_default();

        for entry in ports.split(',') {
            let fields: Vec<&str> = entry.trim().split('/').collect();
            if fields.len() < 5 || fields[1] != "open" {
                continue;
            }
            if let Ok(port) = fields[0].parse() {
                open.push(OpenPort {
                    port,
                    protocol: fields[2].to_string(),
                    service: fields[4].to_string(),
                });
            }
        }
    }
    open
}

#[async_trait]
impl Capability for PortScanCapability {
    fn name(&self) -> &str {
        "scan_port_scanning"
    }

    fn description(&self) -> &str {
        "Scan a host for open TCP ports with nmap and report the services found."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("target_host", ParamKind::String, "The host or IP address to scan")
            .optional("ports", ParamKind::String, "Port specification, e.g. '1-1000' or '22,80,443'")
            .optional(
                "extra_args",
                ParamKind::StringArray,
                "Additional command-line arguments passed to nmap",
            )
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        let args: PortScanArgs = typed_args(arguments)?;
        let dir = output_dir_for(&self.output_root, &args.target_host).await?;

        let mut run = ProgramRun::new(&self.binary).args(["-oG", "-"]);
        if let Some(ports) = args.ports {
            run = run.arg("-p").arg(ports);
        }
        let output = run
            .args(args.extra_args)
            .arg(args.target_host.clone())
            .run()
            .await?;

        tokio::fs::write(dir.join("nmap_output.txt"), &output.stdout).await?;

        Ok(serde_json::json!({
            "host": args.target_host,
            "open_ports": parse_greppable(&output.stdout),
        }))
    }
}
