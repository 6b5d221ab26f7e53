//! Shared test helpers: scripted providers and mock capabilities.

use async_trait::async_trait;
use scanpilot_core::error::ProviderError;
use scanpilot_core::message::{Message, ToolCallRequest};
use scanpilot_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();

        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// A provider whose every call fails with the same error.
pub struct FailingProvider(pub ProviderError);

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(self.0.clone())
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a decision with no content and no tool calls.
pub fn make_empty_response() -> ProviderResponse {
    ProviderResponse {
        message: Message::decision(None, vec![]),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response requesting tools, with optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<ToolCallRequest>, thought: Option<&str>) -> ProviderResponse {
    ProviderResponse {
        message: Message::decision(thought.map(str::to_string), tool_calls),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, serde_json::to_string(&args).unwrap())
}

/// Records when mock capabilities finish and how many ran at once.
#[derive(Clone, Default)]
pub struct Journal {
    completions: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Journal {
    pub fn completions(&self) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A configurable capability: echoes its arguments after an optional
/// delay, or fails.
pub struct MockCapability {
    name: String,
    delay: Duration,
    fail: bool,
    required: Option<String>,
    rule: Option<fn(&Arguments) -> Result<(), String>>,
    invocations: Arc<AtomicUsize>,
    journal: Journal,
}

impl MockCapability {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            fail: false,
            required: None,
            rule: None,
            invocations: Arc::new(AtomicUsize::new(0)),
            journal: Journal::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Declare a required string parameter.
    pub fn with_required(mut self, param: &str) -> Self {
        self.required = Some(param.to_string());
        self
    }

    /// Add a rule checked before the round's handlers start.
    pub fn with_rule(mut self, rule: fn(&Arguments) -> Result<(), String>) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    pub fn invocations(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }
}

#[async_trait]
impl Capability for MockCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A mock capability for tests"
    }

    fn schema(&self) -> ParamSchema {
        let schema = ParamSchema::new()
            .optional("n", ParamKind::Count, "A count")
            .optional("note", ParamKind::String, "Free text");
        match &self.required {
            Some(param) => schema.required(param, ParamKind::String, "Required text"),
            None => schema,
        }
    }

    fn check(&self, arguments: &Arguments) -> Result<(), String> {
        self.rule.map_or(Ok(()), |rule| rule(arguments))
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let now = self.journal.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.journal.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(CapabilityError::ProcessFailed {
                program: self.name.clone(),
                code: 1,
                stderr: "scanner crashed".into(),
            });
        }

        self.journal.completions.lock().unwrap().push(self.name.clone());
        Ok(serde_json::json!({
            "capability": self.name,
            "arguments": arguments,
        }))
    }
}
