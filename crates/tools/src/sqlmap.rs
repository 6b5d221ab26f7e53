//! SQL-injection probing through the sqlmap REST API.
//!
//! [`SqlmapService`] owns the long-lived `sqlmapapi.py` child process.
//! It is started lazily by the first scan, reused across rounds, and
//! stopped explicitly by the session owner.

use async_trait::async_trait;
use scanpilot_config::ScannerConfig;
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema, typed_args};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::output::output_dir_for;

const STOP_GRACE: Duration = Duration::from_secs(5);
const READY_PROBE_INTERVAL: Duration = Duration::from_millis(250);
const RESULTS_FILE: &str = "sqlmap_output.json";

/// How to launch the API server when it is not already running.
#[derive(Debug, Clone)]
struct LaunchSpec {
    python: String,
    script: PathBuf,
    host: String,
    port: u16,
}

#[derive(Default)]
struct ServiceState {
    child: Option<Child>,
    ready: bool,
}

/// Handle to the sqlmap REST API.
pub struct SqlmapService {
    launch: Option<LaunchSpec>,
    base_url: String,
    startup_timeout: Duration,
    poll_interval: Duration,
    client: reqwest::Client,
    state: Mutex<ServiceState>,
}

impl SqlmapService {
    /// A service that spawns `sqlmapapi.py` on first use.
    pub fn from_config(config: &ScannerConfig) -> Result<Self, CapabilityError> {
        let launch = LaunchSpec {
            python: config.python.clone(),
            script: config.sqlmap_api_path.clone(),
            host: config.sqlmap_host.clone(),
            port: config.sqlmap_port,
        };
        Self::build(
            Some(launch),
            config.sqlmap_api_url(),
            Duration::from_secs(config.sqlmap_startup_timeout_secs),
            Duration::from_secs(config.sqlmap_poll_interval_secs),
        )
    }

    /// A service backed by an API server someone else manages.
    pub fn external(
        base_url: impl Into<String>,
        startup_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, CapabilityError> {
        Self::build(None, base_url.into(), startup_timeout, poll_interval)
    }

    fn build(
        launch: Option<LaunchSpec>,
        base_url: String,
        startup_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CapabilityError::Service(format!("HTTP client: {e}")))?;

        Ok(Self {
            launch,
            base_url: base_url.trim_end_matches('/').to_string(),
            startup_timeout,
            poll_interval,
            client,
            state: Mutex::new(ServiceState::default()),
        })
    }

    /// Start the API server, or reuse the one already running.
    ///
    /// Concurrent callers serialize on the state lock, so at most one
    /// child is ever spawned. A child that has exited is replaced.
    pub async fn ensure_started(&self) -> Result<(), CapabilityError> {
        let mut state = self.state.lock().await;

        if let Some(launch) = &self.launch {
            let alive = match state.child.as_mut() {
                Some(child) => child.try_wait()?.is_none(),
                None => false,
            };
            if alive && state.ready {
                return Ok(());
            }
            if !alive {
                if state.child.take().is_some() {
                    warn!("sqlmap API process exited, restarting");
                }
                state.ready = false;
                state.child = Some(self.spawn(launch)?);
            }
        } else if state.ready {
            return Ok(());
        }

        self.wait_until_ready(&mut state).await?;
        state.ready = true;
        Ok(())
    }

    fn spawn(&self, launch: &LaunchSpec) -> Result<Child, CapabilityError> {
        info!(host = %launch.host, port = launch.port, "Starting sqlmap API");
        Command::new(&launch.python)
            .arg(&launch.script)
            .args(["-s", "--host", launch.host.as_str()])
            .args(["--port".to_string(), launch.port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapabilityError::Spawn {
                program: launch.python.clone(),
                reason: e.to_string(),
            })
    }

    async fn wait_until_ready(&self, state: &mut ServiceState) -> Result<(), CapabilityError> {
        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        let url = format!("{}/version", self.base_url);

        loop {
            if let Ok(response) = self.client.get(&url).send().await {
                if response.status().is_success() {
                    debug!(url = %self.base_url, "sqlmap API ready");
                    return Ok(());
                }
            }

            if let Some(child) = state.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    state.child = None;
                    return Err(CapabilityError::Service(format!(
                        "sqlmap API exited during startup ({status})"
                    )));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(CapabilityError::Timeout {
                    timeout_secs: self.startup_timeout.as_secs(),
                });
            }
            tokio::time::sleep(READY_PROBE_INTERVAL).await;
        }
    }

    /// Terminate the child process, if this service launched one.
    ///
    /// Sends SIGTERM and waits a short grace period before killing.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.ready = false;

        let Some(mut child) = state.child.take() else {
            debug!("sqlmap API not running");
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(%status, "sqlmap API already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not query sqlmap API process"),
        }

        if let Some(pid) = child.id() {
            let term = Command::new("kill")
                .arg(pid.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = term {
                warn!(error = %e, "Failed to signal sqlmap API");
            }
        }

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(_) => info!("sqlmap API stopped"),
            Err(_) => {
                warn!("sqlmap API ignored SIGTERM, killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill sqlmap API");
                }
            }
        }
    }

    /// Run one scan task and return sqlmap's `data` entries.
    ///
    /// The task is deleted afterwards whether or not the scan succeeded.
    pub async fn scan(
        &self,
        target_url: &str,
        data: Option<&str>,
        options: Option<Map<String, Value>>,
    ) -> Result<Vec<Value>, CapabilityError> {
        self.ensure_started().await?;

        let task: NewTask = self.get_json(&format!("{}/task/new", self.base_url)).await?;
        let task_id = task
            .taskid
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CapabilityError::Service("sqlmap API returned no task id".into()))?;
        debug!(task = %task_id, "Created sqlmap task");

        let result = self.run_task(&task_id, target_url, data, options).await;

        let delete_url = format!("{}/task/{task_id}/delete", self.base_url);
        if let Err(e) = self.client.get(&delete_url).send().await {
            warn!(task = %task_id, error = %e, "Failed to delete sqlmap task");
        }

        result
    }

    async fn run_task(
        &self,
        task_id: &str,
        target_url: &str,
        data: Option<&str>,
        options: Option<Map<String, Value>>,
    ) -> Result<Vec<Value>, CapabilityError> {
        let mut body = options.unwrap_or_default();
        body.insert("url".into(), Value::String(target_url.to_string()));
        if let Some(data) = data {
            body.insert("data".into(), Value::String(data.to_string()));
        }

        let started: Started = self
            .client
            .post(format!("{}/scan/{task_id}/start", self.base_url))
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(service_error)?
            .json()
            .await
            .map_err(service_error)?;
        if !started.success {
            return Err(CapabilityError::Service(format!(
                "sqlmap refused to start task {task_id}"
            )));
        }
        info!(task = %task_id, url = %target_url, "sqlmap scan started");

        let status_url = format!("{}/scan/{task_id}/status", self.base_url);
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let status: Status = self.get_json(&status_url).await?;
            if status.status.as_deref() == Some("terminated") {
                break;
            }
            debug!(task = %task_id, status = ?status.status, "sqlmap scan running");
        }

        let results: ScanData = self
            .get_json(&format!("{}/scan/{task_id}/data", self.base_url))
            .await?;
        Ok(results.data)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CapabilityError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(service_error)?
            .json()
            .await
            .map_err(service_error)
    }
}

fn service_error(e: reqwest::Error) -> CapabilityError {
    CapabilityError::Service(format!("sqlmap API: {e}"))
}

#[derive(Deserialize)]
struct NewTask {
    taskid: Option<String>,
}

#[derive(Deserialize)]
struct Started {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
struct Status {
    status: Option<String>,
}

#[derive(Deserialize)]
struct ScanData {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Deserialize)]
struct SqlInjectionArgs {
    target_url: String,
    data: Option<String>,
    options: Option<Map<String, Value>>,
}

/// `scan_sql_injection`: probe a URL with sqlmap.
pub struct SqlInjectionCapability {
    service: Arc<SqlmapService>,
    output_root: PathBuf,
    // Parallel calls may target the same host file.
    append_lock: Mutex<()>,
}

impl SqlInjectionCapability {
    pub fn new(service: Arc<SqlmapService>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            service,
            output_root: output_root.into(),
            append_lock: Mutex::new(()),
        }
    }

    /// Append one batch of findings to the host's results file.
    async fn append_results(&self, dir: &Path, batch: &[Value]) -> Result<(), CapabilityError> {
        let _guard = self.append_lock.lock().await;
        let path = dir.join(RESULTS_FILE);

        let mut batches: Vec<Value> = match tokio::fs::read_to_string(&path).await {
            Ok(text) if !text.trim().is_empty() => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Existing sqlmap results unreadable, starting over");
                Vec::new()
            }),
            _ => Vec::new(),
        };
        batches.push(Value::Array(batch.to_vec()));

        let text = serde_json::to_string_pretty(&batches)
            .map_err(|e| CapabilityError::Output(e.to_string()))?;
        tokio::fs::write(&path, text).await?;
        Ok(())
    }
}

#[async_trait]
impl Capability for SqlInjectionCapability {
    fn name(&self) -> &str {
        "scan_sql_injection"
    }

    fn description(&self) -> &str {
        "Scan a URL for SQL injection vulnerabilities with sqlmap. \
         Supply POST data to test a POST request."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required(
                "target_url",
                ParamKind::String,
                "The URL to test, e.g. 'http://example.com/product.php?id=1'",
            )
            .optional(
                "data",
                ParamKind::String,
                "POST body, e.g. 'username=admin&password=123'. Enables a POST injection test",
            )
            .optional(
                "options",
                ParamKind::Object,
                "sqlmap options, e.g. {\"level\": 1, \"risk\": 1, \"batch\": true}",
            )
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        let args: SqlInjectionArgs = typed_args(arguments)?;
        let dir = output_dir_for(&self.output_root, &args.target_url).await?;

        let findings = self
            .service
            .scan(&args.target_url, args.data.as_deref(), args.options)
            .await?;

        if !findings.is_empty() {
            self.append_results(&dir, &findings).await?;
        }
        Ok(Value::Array(findings))
    }
}
