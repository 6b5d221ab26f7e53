//! Domain event system: decoupled notification of what the loop is doing.
//!
//! Events are published when a round starts, a decision arrives, a
//! capability finishes, or an analysis ends. Subscribers (progress
//! renderers, tests) react without the loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::error::ObserverError;
use crate::progress::{ProgressHandle, ProgressObserver};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new round began
    RoundStarted {
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// The backend answered a decision request
    DecisionReceived {
        round: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// A capability handler returned
    CapabilityExecuted {
        name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The loop produced its final answer
    AnalysisFinished {
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// A progress-observer task changed
    Progress {
        task: u64,
        label: String,
        description: Option<String>,
        done: bool,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A progress observer that republishes progress as [`DomainEvent::Progress`].
pub struct EventBusProgress {
    bus: Arc<EventBus>,
    next: AtomicU64,
    labels: std::sync::Mutex<std::collections::HashMap<u64, String>>,
}

impl EventBusProgress {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            next: AtomicU64::new(1),
            labels: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn label_of(&self, handle: ProgressHandle) -> Result<String, ObserverError> {
        let labels = self
            .labels
            .lock()
            .map_err(|_| ObserverError("label table poisoned".into()))?;
        labels
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| ObserverError(format!("unknown progress task {}", handle.0)))
    }
}

impl ProgressObserver for EventBusProgress {
    fn start(&self, label: &str) -> Result<ProgressHandle, ObserverError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.labels
            .lock()
            .map_err(|_| ObserverError("label table poisoned".into()))?
            .insert(id, label.to_string());
        self.bus.publish(DomainEvent::Progress {
            task: id,
            label: label.to_string(),
            description: None,
            done: false,
        });
        Ok(ProgressHandle(id))
    }

    fn update(&self, handle: ProgressHandle, description: &str) -> Result<(), ObserverError> {
        let label = self.label_of(handle)?;
        self.bus.publish(DomainEvent::Progress {
            task: handle.0,
            label,
            description: Some(description.to_string()),
            done: false,
        });
        Ok(())
    }

    fn complete(&self, handle: ProgressHandle) -> Result<(), ObserverError> {
        let label = self
            .labels
            .lock()
            .map_err(|_| ObserverError("label table poisoned".into()))?
            .remove(&handle.0)
            .ok_or_else(|| ObserverError(format!("unknown progress task {}", handle.0)))?;
        self.bus.publish(DomainEvent::Progress {
            task: handle.0,
            label,
            description: None,
            done: true,
        });
        Ok(())
    }
}
