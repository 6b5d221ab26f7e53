//! The model decision client: one backend request per round.

use scanpilot_core::error::ProviderError;
use scanpilot_core::message::{Conversation, Message};
use scanpilot_core::provider::{Provider, ProviderRequest, ToolChoice};
use scanpilot_core::{CapabilitySubset, Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Asks the reasoning backend what to do next.
///
/// Tool selection is entirely the backend's call; this client only checks
/// that the answer is well formed. There is no retry at this layer.
pub struct DecisionClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: Option<f32>,
}

impl DecisionClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request exactly one decision for the conversation so far.
    pub async fn decide(&self, conversation: &Conversation, subset: &CapabilitySubset) -> Result<Message> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            temperature: self.temperature,
            tools: subset.definitions(),
            tool_choice: ToolChoice::Auto,
        };

        let response = self.provider.complete(request).await.map_err(|e| match e {
            ProviderError::MissingDecision(reason) => Error::MalformedResponse(reason),
            other => Error::Backend(other),
        })?;

        if let Some(usage) = &response.usage {
            debug!(
                provider = self.provider.name(),
                model = %response.model,
                tokens = usage.total_tokens,
                "Decision received"
            );
        }

        check_tool_calls(&response.message)?;
        Ok(response.message)
    }
}

/// Every requested call needs an id and a name, and ids must be unique.
fn check_tool_calls(message: &Message) -> Result<()> {
    let mut seen = HashSet::with_capacity(message.tool_calls.len());
    for (index, call) in message.tool_calls.iter().enumerate() {
        if call.id.is_empty() {
            return Err(Error::MalformedResponse(format!("tool call #{index} has no id")));
        }
        if call.name.is_empty() {
            return Err(Error::MalformedResponse(format!("tool call {} has no name", call.id)));
        }
        if !seen.insert(call.id.as_str()) {
            return Err(Error::MalformedResponse(format!(
                "tool call id {} appears more than once",
                call.id
            )));
        }
    }
    Ok(())
}
