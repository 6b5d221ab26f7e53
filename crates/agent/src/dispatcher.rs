//! The tool dispatcher: runs one round's requested calls concurrently.
//!
//! A round goes through two phases. First every request is resolved,
//! decoded and validated; any failure there ends the round before a single
//! handler has started. Then all handlers run at once and their results
//! are re-joined in request order, whatever order they finished in.

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use scanpilot_config::FaultPolicy;
use scanpilot_core::event::{DomainEvent, EventBus};
use scanpilot_core::message::{Message, ToolCallRequest};
use scanpilot_core::{
    Arguments, Capability, CapabilityError, CapabilitySubset, Error, ProgressReporter, Result,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A request that passed resolution and validation.
struct PreparedCall<'r> {
    request: &'r ToolCallRequest,
    capability: Arc<dyn Capability>,
    arguments: Arguments,
}

pub struct ToolDispatcher {
    policy: FaultPolicy,
    event_bus: Arc<EventBus>,
}

impl ToolDispatcher {
    pub fn new(policy: FaultPolicy, event_bus: Arc<EventBus>) -> Self {
        Self { policy, event_bus }
    }

    pub fn policy(&self) -> FaultPolicy {
        self.policy
    }

    /// Execute one round and return one tool-result message per request,
    /// in request order.
    pub async fn dispatch(
        &self,
        requests: &[ToolCallRequest],
        subset: &CapabilitySubset,
        progress: &ProgressReporter<'_>,
    ) -> Result<Vec<Message>> {
        let prepared = prepare(requests, subset)?;
        debug!(calls = prepared.len(), policy = ?self.policy, "Dispatching round");

        match self.policy {
            FaultPolicy::Isolate => {
                let outcomes = join_all(prepared.into_iter().map(|call| self.execute(call, progress))).await;
                outcomes
                    .into_iter()
                    .map(|(request, outcome)| -> Result<Message> {
                        let content = match outcome {
                            Ok(value) => serde_json::to_string(&value)?,
                            Err(e) => fault_payload(request, &e),
                        };
                        Ok(Message::tool_result(&request.id, content))
                    })
                    .collect()
            }
            FaultPolicy::Abort => {
                let values = try_join_all(prepared.into_iter().map(|call| async move {
                    let (request, outcome) = self.execute(call, progress).await;
                    outcome
                        .map(|value| (request, value))
                        .map_err(|source| Error::CapabilityFault {
                            call_id: request.id.clone(),
                            capability: request.name.clone(),
                            source,
                        })
                }))
                .await?;
                values
                    .into_iter()
                    .map(|(request, value)| -> Result<Message> {
                        Ok(Message::tool_result(&request.id, serde_json::to_string(&value)?))
                    })
                    .collect()
            }
        }
    }

    async fn execute<'r>(
        &self,
        call: PreparedCall<'r>,
        progress: &ProgressReporter<'_>,
    ) -> (&'r ToolCallRequest, std::result::Result<Value, CapabilityError>) {
        let name = call.request.name.as_str();
        progress.update(&format!("running {name}"));
        debug!(call_id = %call.request.id, capability = name, "Invoking capability");

        let started = Instant::now();
        let outcome = call.capability.invoke(call.arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = &outcome {
            warn!(call_id = %call.request.id, capability = name, error = %e, "Capability failed");
        }
        self.event_bus.publish(DomainEvent::CapabilityExecuted {
            name: name.to_string(),
            success: outcome.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });
        progress.update(&format!("{name} finished"));

        (call.request, outcome)
    }
}

/// Resolve, decode and validate the whole round up front.
fn prepare<'r>(requests: &'r [ToolCallRequest], subset: &CapabilitySubset) -> Result<Vec<PreparedCall<'r>>> {
    requests
        .iter()
        .map(|request| -> Result<PreparedCall<'r>> {
            let capability = subset.get(&request.name).cloned().ok_or_else(|| Error::UnknownCapability {
                call_id: request.id.clone(),
                name: request.name.clone(),
            })?;

            let decode_error = |reason: String| Error::ArgumentDecode {
                call_id: request.id.clone(),
                capability: request.name.clone(),
                reason,
            };
            let arguments = decode_arguments(&request.arguments).map_err(decode_error)?;
            capability.schema().validate(&arguments).map_err(decode_error)?;
            capability.check(&arguments).map_err(decode_error)?;

            Ok(PreparedCall {
                request,
                capability,
                arguments,
            })
        })
        .collect()
}

/// Decode the backend's argument text into a JSON object.
///
/// Blank text counts as an empty object.
fn decode_arguments(raw: &str) -> std::result::Result<Arguments, String> {
    if raw.trim().is_empty() {
        return Ok(Arguments::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Tool content reported to the backend for an isolated fault.
fn fault_payload(request: &ToolCallRequest, error: &CapabilityError) -> String {
    serde_json::json!({
        "error": {
            "capability": request.name,
            "message": error.to_string(),
        }
    })
    .to_string()
}
