//! # scanpilot core
//!
//! Domain types, traits, and error definitions for the scanpilot analysis
//! runtime. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Layout
//!
//! - [`message`]: the append-only conversation store and its messages
//! - [`provider`]: the reasoning-backend abstraction
//! - [`capability`]: the capability trait, parameter schemas, and the registry
//! - [`progress`]: the side-channel progress observer
//! - [`event`]: broadcast domain events
//! - [`error`]: the error taxonomy shared by the whole workspace

pub mod capability;
pub mod error;
pub mod event;
pub mod message;
pub mod progress;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use capability::{
    Arguments, Capability, CapabilityRegistry, CapabilitySubset, ParamKind, ParamSchema, ParamSpec,
    typed_args,
};
pub use error::{CapabilityError, Error, ObserverError, ProviderError, Result};
pub use event::{DomainEvent, EventBus, EventBusProgress};
pub use message::{Conversation, Message, Role, ToolCallRequest};
pub use progress::{NoopProgress, ProgressHandle, ProgressObserver, ProgressReporter};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition, Usage};
