//! The analysis loop implementation.

use chrono::Utc;
use scanpilot_config::{AppConfig, FaultPolicy, RoundLimitBehavior};
use scanpilot_core::event::{DomainEvent, EventBus};
use scanpilot_core::message::{Conversation, Message};
use scanpilot_core::provider::Provider;
use scanpilot_core::{
    CapabilityRegistry, CapabilitySubset, Error, NoopProgress, ProgressObserver, ProgressReporter,
    Result,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::decision::DecisionClient;
use crate::dispatcher::ToolDispatcher;
use crate::flavor::AnalysisFlavor;

/// Drives rounds of decide, dispatch, append until the backend answers
/// without requesting capabilities.
pub struct AnalysisLoop {
    /// Asks the backend for one decision per round
    decisions: DecisionClient,

    /// Every capability the session may expose
    registry: Arc<CapabilityRegistry>,

    /// Maximum decisions per analysis
    max_rounds: u32,

    fault_policy: FaultPolicy,

    on_round_limit: RoundLimitBehavior,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Side-channel progress rendering
    progress: Arc<dyn ProgressObserver>,
}

impl AnalysisLoop {
    /// Create a new analysis loop with default limits and policies.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        registry: Arc<CapabilityRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            decisions: DecisionClient::new(provider, model),
            registry,
            max_rounds: 25,
            fault_policy: FaultPolicy::default(),
            on_round_limit: RoundLimitBehavior::default(),
            event_bus,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Create a loop configured from `[agent]` and the backend settings.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        registry: Arc<CapabilityRegistry>,
        event_bus: Arc<EventBus>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, &config.model, registry, event_bus)
            .with_temperature(config.temperature)
            .with_max_rounds(config.agent.max_rounds)
            .with_fault_policy(config.agent.fault_policy)
            .with_round_limit_behavior(config.agent.on_round_limit)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.decisions = self.decisions.with_temperature(temperature);
        self
    }

    /// Set the maximum number of decisions per analysis.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// What to return when the backend is still requesting tools after
    /// the last allowed round.
    pub fn with_round_limit_behavior(mut self, behavior: RoundLimitBehavior) -> Self {
        self.on_round_limit = behavior;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Run one analysis of `target` with the flavor's standard seed prompt.
    pub async fn run(&self, flavor: AnalysisFlavor, target: &str) -> Result<String> {
        self.run_prompt(flavor, flavor.seed_prompt(target, Utc::now())).await
    }

    /// Run one analysis seeded with a custom prompt.
    pub async fn run_prompt(&self, flavor: AnalysisFlavor, prompt: String) -> Result<String> {
        let subset = self.registry.subset(flavor.as_str(), flavor.capability_names())?;
        let mut conversation = Conversation::seeded(Message::user(prompt));
        self.run_conversation(&mut conversation, &subset).await
    }

    /// Drive `conversation` to completion, exposing only `subset`.
    ///
    /// Returns the text of the first decision that requests no capabilities
    /// (empty if it has none). On error the conversation holds every
    /// message appended before the failing round.
    pub async fn run_conversation(
        &self,
        conversation: &mut Conversation,
        subset: &CapabilitySubset,
    ) -> Result<String> {
        info!(
            flavor = subset.label(),
            capabilities = ?subset.names(),
            max_rounds = self.max_rounds,
            "Starting analysis"
        );

        let progress = ProgressReporter::start(self.progress.as_ref(), subset.label());
        let outcome = self.drive(conversation, subset, &progress).await;
        progress.complete();
        outcome
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        subset: &CapabilitySubset,
        progress: &ProgressReporter<'_>,
    ) -> Result<String> {
        let dispatcher = ToolDispatcher::new(self.fault_policy, Arc::clone(&self.event_bus));

        for round in 1..=self.max_rounds {
            info!(round, "Round started");
            self.event_bus.publish(DomainEvent::RoundStarted {
                round,
                timestamp: Utc::now(),
            });
            progress.update(&format!("round {round}: waiting for decision"));

            let decision = self.decisions.decide(conversation, subset).await?;
            self.event_bus.publish(DomainEvent::DecisionReceived {
                round,
                tool_calls: decision.tool_calls.len(),
                timestamp: Utc::now(),
            });

            if decision.tool_calls.is_empty() {
                let answer = decision.text().to_string();
                conversation.push(decision);
                info!(rounds = round, "Analysis finished");
                self.event_bus.publish(DomainEvent::AnalysisFinished {
                    rounds: round,
                    timestamp: Utc::now(),
                });
                return Ok(answer);
            }

            debug!(round, calls = decision.tool_calls.len(), "Backend requested capabilities");
            let requests = decision.tool_calls.clone();
            conversation.push(decision);

            let results = dispatcher.dispatch(&requests, subset, progress).await?;
            conversation.extend(results);
        }

        warn!(max_rounds = self.max_rounds, "Round limit reached with capabilities still requested");
        match self.on_round_limit {
            RoundLimitBehavior::Error => Err(Error::RoundLimitExceeded {
                max_rounds: self.max_rounds,
            }),
            RoundLimitBehavior::Partial => {
                self.event_bus.publish(DomainEvent::AnalysisFinished {
                    rounds: self.max_rounds,
                    timestamp: Utc::now(),
                });
                Ok(conversation.last_assistant_text().unwrap_or_default().to_string())
            }
        }
    }
}
