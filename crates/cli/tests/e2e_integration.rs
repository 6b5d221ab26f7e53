//! End-to-end integration tests for scanpilot analysis sessions.
//!
//! These tests drive whole sessions through the public crate APIs: a
//! scripted reasoning backend, the real capability registry, a sqlmap API
//! and target site served by wiremock, and shell scripts standing in for
//! the Python scanners.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scanpilot_agent::{AnalysisFlavor, AnalysisLoop};
use scanpilot_config::{AppConfig, FaultPolicy, RoundLimitBehavior, ScannerConfig};
use scanpilot_core::error::ProviderError;
use scanpilot_core::event::{DomainEvent, EventBus, EventBusProgress};
use scanpilot_core::message::{Message, Role, ToolCallRequest};
use scanpilot_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use scanpilot_core::{CapabilityRegistry, Error};
use scanpilot_tools::{SqlmapService, default_registry};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Scripted Provider ────────────────────────────────────────────────────

/// A provider that returns scripted responses in sequence and records
/// every request it was sent.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn text(answer: &str) -> Self {
        Self::new(vec![text_response(answer)])
    }

    fn tools_then_text(tool_calls: Vec<ToolCallRequest>, answer: &str) -> Self {
        Self::new(vec![tool_response(tool_calls, None), text_response(answer)])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        if index >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                index,
                responses.len()
            );
        }
        requests.push(request);
        Ok(responses[index].clone())
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<ToolCallRequest>, thought: Option<&str>) -> ProviderResponse {
    ProviderResponse {
        message: Message::decision(thought.map(str::to_string), tool_calls),
        usage: usage(),
        model: "mock".into(),
    }
}

fn call(id: &str, name: &str, args: Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, serde_json::to_string(&args).unwrap())
}

// ── Fixtures ─────────────────────────────────────────────────────────────

const SSTI_FOUND: &str = "\
printf '\\033[1m[*]\\033[0m Testing if GET parameter q is injectable\\n'
printf '[+] SSTImap identified the following injection point:\\n\\n  GET parameter: q\\n  Engine: Jinja2\\n'
printf '[+] Rerun SSTImap providing one of the following options:\\n    --os-shell\\n'
";

const SSTI_CRASH: &str = "echo 'Traceback: connection refused' >&2\nexit 2\n";

/// Scanner settings with `sh` as the interpreter and `script` as SSTImap.
fn scanners(work: &Path, sstimap_script: &str) -> ScannerConfig {
    let script = work.join("sstimap.sh");
    std::fs::write(&script, sstimap_script).unwrap();
    ScannerConfig {
        output_dir: work.join("scan-output"),
        python: "sh".into(),
        sstimap_path: script,
        ..ScannerConfig::default()
    }
}

async fn sqlmap_api(findings: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"taskid": "t1", "success": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scan/t1/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scan/t1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "terminated"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scan/t1/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": findings})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/t1/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn registry(config: &ScannerConfig, sqlmap_url: &str) -> Arc<CapabilityRegistry> {
    let sqlmap = SqlmapService::external(sqlmap_url, Duration::from_secs(2), Duration::from_millis(10)).unwrap();
    Arc::new(default_registry(config, Arc::new(sqlmap)).unwrap())
}

fn tool_results(request: &ProviderRequest) -> Vec<&Message> {
    request.messages.iter().filter(|m| m.role == Role::Tool).collect()
}

fn output_file(config: &ScannerConfig, slug: &str, name: &str) -> PathBuf {
    config.output_dir.join(slug).join(name)
}

// ── E2E: Injection Session ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_injection_session_runs_three_capabilities_in_one_round() {
    let work = tempfile::tempdir().unwrap();
    let config = scanners(work.path(), SSTI_FOUND);

    let sqlmap = sqlmap_api(serde_json::json!([{"type": 1, "value": [{"parameter": "id", "dbms": "MySQL"}]}])).await;
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form><input name=\"id\"></form>"))
        .mount(&site)
        .await;

    let page = format!("{}/item?id=1", site.uri());
    let provider = Arc::new(ScriptedProvider::tools_then_text(
        vec![
            call("call_fetch", "fetch_url_content", serde_json::json!({"url": page})),
            call(
                "call_sqli",
                "scan_sql_injection",
                serde_json::json!({"target_url": "http://shop.test/item?id=1", "options": {"batch": true}}),
            ),
            call(
                "call_ssti",
                "scan_template_injection",
                serde_json::json!({"target_url": "http://shop.test/search?q=x"}),
            ),
        ],
        "# Report\n\nParameter `id` is injectable.",
    ));

    let analysis = AnalysisLoop::new(
        provider.clone(),
        "mock-model",
        registry(&config, &sqlmap.uri()),
        Arc::new(EventBus::default()),
    );
    let report = analysis
        .run(AnalysisFlavor::Injection, "http://shop.test/item?id=1")
        .await
        .unwrap();

    assert_eq!(report, "# Report\n\nParameter `id` is injectable.");
    assert_eq!(provider.calls(), 2);

    // Seed, decision, then one result per request in request order
    let second = provider.request(1);
    assert_eq!(second.messages.len(), 5);
    let results = tool_results(&second);
    let ids: Vec<_> = results.iter().map(|m| m.correlation_id.as_deref().unwrap()).collect();
    assert_eq!(ids, vec!["call_fetch", "call_sqli", "call_ssti"]);

    let fetched: Value = serde_json::from_str(results[0].text()).unwrap();
    assert_eq!(fetched["status"], 200);
    assert!(fetched["body"].as_str().unwrap().contains("name=\"id\""));

    let findings: Value = serde_json::from_str(results[1].text()).unwrap();
    assert_eq!(findings[0]["value"][0]["dbms"], "MySQL");

    let ssti: Value = serde_json::from_str(results[2].text()).unwrap();
    assert!(ssti.as_str().unwrap().contains("Engine: Jinja2"));

    // Raw scanner output lands under the target host's directory
    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(output_file(&config, "shop_test", "sqlmap_output.json")).unwrap())
            .unwrap();
    assert_eq!(saved.as_array().unwrap().len(), 1);
    let ssti_saved = std::fs::read_to_string(output_file(&config, "shop_test", "sstimap_output.txt")).unwrap();
    assert!(ssti_saved.starts_with("[+] SSTImap identified the following injection point:"));
    assert!(!ssti_saved.contains("--os-shell"));
}

#[tokio::test]
async fn e2e_injection_flavor_exposes_only_its_capabilities() {
    let work = tempfile::tempdir().unwrap();
    let config = scanners(work.path(), SSTI_FOUND);
    let provider = Arc::new(ScriptedProvider::text("Nothing to test."));

    let analysis = AnalysisLoop::new(
        provider.clone(),
        "mock-model",
        registry(&config, "http://127.0.0.1:9"),
        Arc::new(EventBus::default()),
    );
    analysis
        .run(AnalysisFlavor::Injection, "http://shop.test/")
        .await
        .unwrap();

    let request = provider.request(0);
    let mut exposed: Vec<_> = request.tools.iter().map(|t| t.name.as_str()).collect();
    exposed.sort_unstable();
    assert_eq!(
        exposed,
        vec!["fetch_url_content", "scan_sql_injection", "scan_template_injection"]
    );
    assert_eq!(request.messages.len(), 1);
    assert!(request.messages[0].text().contains("http://shop.test/"));
}

// ── E2E: Domain Session ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_domain_session_rejects_capability_outside_flavor() {
    let work = tempfile::tempdir().unwrap();
    let config = scanners(work.path(), SSTI_FOUND);
    let provider = Arc::new(ScriptedProvider::new(vec![tool_response(
        vec![call(
            "call_1",
            "scan_sql_injection",
            serde_json::json!({"target_url": "http://example.com/?id=1"}),
        )],
        Some("Trying sqlmap on the apex"),
    )]));

    let analysis = AnalysisLoop::new(
        provider.clone(),
        "mock-model",
        registry(&config, "http://127.0.0.1:9"),
        Arc::new(EventBus::default()),
    );
    let err = analysis.run(AnalysisFlavor::Domain, "example.com").await.unwrap_err();

    assert!(matches!(err, Error::UnknownCapability { ref name, .. } if name == "scan_sql_injection"));
    assert_eq!(provider.calls(), 1);
    assert!(!config.output_dir.join("example_com").exists());
}

// ── E2E: Fault Policies ──────────────────────────────────────────────────

fn ssti_then_fetch(page: &str) -> Vec<ToolCallRequest> {
    vec![
        call(
            "call_ssti",
            "scan_template_injection",
            serde_json::json!({"target_url": "http://shop.test/?q=1"}),
        ),
        call("call_fetch", "fetch_url_content", serde_json::json!({"url": page})),
    ]
}

#[tokio::test]
async fn e2e_isolated_scanner_crash_is_reported_to_backend() {
    let work = tempfile::tempdir().unwrap();
    let config = scanners(work.path(), SSTI_CRASH);
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&site)
        .await;

    let provider = Arc::new(ScriptedProvider::tools_then_text(
        ssti_then_fetch(&site.uri()),
        "SSTImap failed; the page itself looks static.",
    ));

    let mut app = AppConfig::default();
    app.agent.fault_policy = FaultPolicy::Isolate;
    let analysis = AnalysisLoop::from_config(
        provider.clone(),
        registry(&config, "http://127.0.0.1:9"),
        Arc::new(EventBus::default()),
        &app,
    );
    let report = analysis.run(AnalysisFlavor::Injection, "http://shop.test/?q=1").await.unwrap();
    assert_eq!(report, "SSTImap failed; the page itself looks static.");

    let second = provider.request(1);
    let results = tool_results(&second);
    assert_eq!(results.len(), 2);

    let fault: Value = serde_json::from_str(results[0].text()).unwrap();
    assert_eq!(fault["error"]["capability"], "scan_template_injection");
    assert!(fault["error"]["message"].as_str().unwrap().contains("connection refused"));

    let fetched: Value = serde_json::from_str(results[1].text()).unwrap();
    assert_eq!(fetched["body"], "ok");
}

#[tokio::test]
async fn e2e_abort_policy_fails_the_session() {
    let work = tempfile::tempdir().unwrap();
    let config = scanners(work.path(), SSTI_CRASH);
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&site)
        .await;

    let provider = Arc::new(ScriptedProvider::new(vec![tool_response(ssti_then_fetch(&site.uri()), None)]));

    let mut app = AppConfig::default();
    app.agent.fault_policy = FaultPolicy::Abort;
    let analysis = AnalysisLoop::from_config(
        provider.clone(),
        registry(&config, "http://127.0.0.1:9"),
        Arc::new(EventBus::default()),
        &app,
    );
    let err = analysis.run(AnalysisFlavor::Injection, "http://shop.test/?q=1").await.unwrap_err();

    assert!(matches!(
        err,
        Error::CapabilityFault { ref call_id, ref capability, .. }
            if call_id == "call_ssti" && capability == "scan_template_injection"
    ));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn e2e_negative_fetch_cap_fails_before_any_scanner_starts() {
    let work = tempfile::tempdir().unwrap();
    let marker = work.path().join("sstimap-ran");
    let config = scanners(work.path(), &format!("touch '{}'\n", marker.display()));
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(0)
        .mount(&site)
        .await;

    let requests = vec![
        call(
            "c1",
            "scan_template_injection",
            serde_json::json!({"target_url": "http://shop.test/?q=1"}),
        ),
        call("c2", "fetch_url_content", serde_json::json!({"url": site.uri(), "max_bytes": -1})),
    ];
    let provider = Arc::new(ScriptedProvider::new(vec![tool_response(requests, None)]));

    let mut app = AppConfig::default();
    app.agent.fault_policy = FaultPolicy::Abort;
    let analysis = AnalysisLoop::from_config(
        provider.clone(),
        registry(&config, "http://127.0.0.1:9"),
        Arc::new(EventBus::default()),
        &app,
    );
    let err = analysis.run(AnalysisFlavor::Injection, "http://shop.test/?q=1").await.unwrap_err();

    assert!(matches!(
        err,
        Error::ArgumentDecode { ref call_id, ref capability, .. }
            if call_id == "c2" && capability == "fetch_url_content"
    ));
    assert!(!marker.exists());
    assert!(!config.output_dir.exists());
}

// ── E2E: Round Limit ─────────────────────────────────────────────────────

fn fetch_forever(page: &str, rounds: usize) -> Vec<ProviderResponse> {
    (0..rounds)
        .map(|i| {
            tool_response(
                vec![call(&format!("call_{i}"), "fetch_url_content", serde_json::json!({"url": page}))],
                Some(&format!("Still looking, pass {i}")),
            )
        })
        .collect()
}

#[tokio::test]
async fn e2e_round_limit_from_config() {
    let work = tempfile::tempdir().unwrap();
    let config = scanners(work.path(), SSTI_FOUND);
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&site)
        .await;

    let mut app = AppConfig::default();
    app.agent.max_rounds = 2;

    // error: exactly max_rounds decisions, then a round-limit failure
    let provider = Arc::new(ScriptedProvider::new(fetch_forever(&site.uri(), 2)));
    let err = AnalysisLoop::from_config(
        provider.clone(),
        registry(&config, "http://127.0.0.1:9"),
        Arc::new(EventBus::default()),
        &app,
    )
    .run(AnalysisFlavor::Injection, "http://shop.test/")
    .await
    .unwrap_err();
    assert!(matches!(err, Error::RoundLimitExceeded { max_rounds: 2 }));
    assert_eq!(provider.calls(), 2);

    // partial: the last assistant text comes back instead
    app.agent.on_round_limit = RoundLimitBehavior::Partial;
    let provider = Arc::new(ScriptedProvider::new(fetch_forever(&site.uri(), 2)));
    let report = AnalysisLoop::from_config(
        provider.clone(),
        registry(&config, "http://127.0.0.1:9"),
        Arc::new(EventBus::default()),
        &app,
    )
    .run(AnalysisFlavor::Injection, "http://shop.test/")
    .await
    .unwrap();
    assert_eq!(report, "Still looking, pass 1");
    assert_eq!(provider.calls(), 2);
}

// ── E2E: Events & Progress ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_progress_and_events_follow_the_session() {
    let work = tempfile::tempdir().unwrap();
    let config = scanners(work.path(), SSTI_FOUND);
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&site)
        .await;

    let bus = Arc::new(EventBus::new(128));
    let mut rx = bus.subscribe();
    let provider = Arc::new(ScriptedProvider::tools_then_text(
        vec![call("call_1", "fetch_url_content", serde_json::json!({"url": site.uri()}))],
        "done",
    ));

    AnalysisLoop::new(provider, "mock-model", registry(&config, "http://127.0.0.1:9"), bus.clone())
        .with_progress(Arc::new(EventBusProgress::new(bus.clone())))
        .run(AnalysisFlavor::Injection, "http://shop.test/")
        .await
        .unwrap();

    let mut executed = Vec::new();
    let mut descriptions = Vec::new();
    let mut finished = None;
    let mut progress_done = false;
    while let Ok(event) = rx.try_recv() {
        match event.as_ref() {
            DomainEvent::CapabilityExecuted { name, success, .. } => executed.push((name.clone(), *success)),
            DomainEvent::Progress { label, description, done, .. } => {
                assert_eq!(label, "injection");
                if let Some(text) = description {
                    descriptions.push(text.clone());
                }
                progress_done |= *done;
            }
            DomainEvent::AnalysisFinished { rounds, .. } => finished = Some(*rounds),
            _ => {}
        }
    }

    assert_eq!(executed, vec![("fetch_url_content".to_string(), true)]);
    assert!(descriptions.contains(&"running fetch_url_content".to_string()));
    assert!(descriptions.contains(&"fetch_url_content finished".to_string()));
    assert_eq!(finished, Some(2));
    assert!(progress_done);
}
