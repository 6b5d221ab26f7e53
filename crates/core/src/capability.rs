//! Capability trait: the abstraction over external analysis operations.
//!
//! A capability is one named operation the backend may invoke: a port scan,
//! a page fetch, a subdomain enumeration. Each one declares a typed
//! [`ParamSchema`] so arguments are checked before anything runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use crate::error::{CapabilityError, Error};
use crate::provider::ToolDefinition;

/// Decoded capability arguments: parameter name to JSON value.
pub type Arguments = Map<String, Value>;

/// The JSON type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    /// A non-negative integer that fits in 32 bits: counts, limits, sizes
    Count,
    Boolean,
    Object,
    StringArray,
}

impl ParamKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Count => value.as_u64().is_some_and(|n| n <= u64::from(u32::MAX)),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn json_schema(self) -> Value {
        match self {
            ParamKind::String => serde_json::json!({ "type": "string" }),
            ParamKind::Integer => serde_json::json!({ "type": "integer" }),
            ParamKind::Count => {
                serde_json::json!({ "type": "integer", "minimum": 0, "maximum": u32::MAX })
            }
            ParamKind::Boolean => serde_json::json!({ "type": "boolean" }),
            ParamKind::Object => serde_json::json!({ "type": "object" }),
            ParamKind::StringArray => {
                serde_json::json!({ "type": "array", "items": { "type": "string" } })
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            ParamKind::String => "a string",
            ParamKind::Integer => "an integer",
            ParamKind::Count => "a non-negative integer no larger than 4294967295",
            ParamKind::Boolean => "a boolean",
            ParamKind::Object => "an object",
            ParamKind::StringArray => "an array of strings",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

/// The declared parameters of a capability, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    params: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter.
    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        });
        self
    }

    /// Declare an optional parameter.
    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
            description: description.into(),
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Render as a JSON Schema object for the backend.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            let mut prop = p.kind.json_schema();
            prop["description"] = Value::String(p.description.clone());
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check decoded arguments against the declaration.
    ///
    /// Required parameters must be present and non-null; every present,
    /// non-null value must have its declared type; undeclared names are
    /// rejected.
    pub fn validate(&self, args: &Arguments) -> std::result::Result<(), String> {
        for p in &self.params {
            match args.get(&p.name) {
                None | Some(Value::Null) if p.required => {
                    return Err(format!("missing required parameter '{}'", p.name));
                }
                Some(value) if !value.is_null() && !p.kind.matches(value) => {
                    return Err(format!("parameter '{}' must be {}", p.name, p.kind.label()));
                }
                _ => {}
            }
        }
        if let Some(unknown) = args.keys().find(|k| !self.params.iter().any(|p| &p.name == *k)) {
            return Err(format!("unexpected parameter '{unknown}'"));
        }
        Ok(())
    }
}

/// The core Capability trait.
///
/// Handlers own whatever long-lived resources they need; from the
/// dispatcher's point of view they are stateless and may be invoked
/// concurrently.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability (e.g., "scan_sql_injection").
    fn name(&self) -> &str;

    /// A description of what this capability does (sent to the LLM).
    fn description(&self) -> &str;

    /// The declared parameters.
    fn schema(&self) -> ParamSchema;

    /// Rules the schema cannot express, checked against schema-valid
    /// arguments before any call of the round is invoked.
    fn check(&self, _arguments: &Arguments) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Run with validated arguments, returning any JSON value.
    async fn invoke(&self, arguments: Arguments) -> std::result::Result<Value, CapabilityError>;

    /// Convert this capability into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }
}

/// Deserialize validated arguments into a capability's typed parameter struct.
pub fn typed_args<T: serde::de::DeserializeOwned>(
    arguments: Arguments,
) -> std::result::Result<T, CapabilityError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| CapabilityError::InvalidArguments(e.to_string()))
}

/// A registry of available capabilities.
///
/// Built once at session start, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Replaces any existing one with the same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        if self.capabilities.insert(name.clone(), capability).is_some() {
            tracing::warn!(capability = %name, "Replacing already registered capability");
        }
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.get(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Select a fixed, named subset, in the order given.
    ///
    /// Every name must be registered.
    pub fn subset(&self, label: &str, names: &[&str]) -> std::result::Result<CapabilitySubset, Error> {
        let mut capabilities = Vec::with_capacity(names.len());
        for name in names {
            let capability = self.get(name).ok_or_else(|| Error::Config {
                message: format!("subset '{label}' names unregistered capability '{name}'"),
            })?;
            capabilities.push(Arc::clone(capability));
        }
        Ok(CapabilitySubset {
            label: label.to_string(),
            capabilities,
        })
    }
}

/// The slice of the registry exposed to the backend for one analysis.
#[derive(Clone)]
pub struct CapabilitySubset {
    label: String,
    capabilities: Vec<Arc<dyn Capability>>,
}

impl CapabilitySubset {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Look up an exposed capability; names outside the subset yield `None`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    /// Definitions to send to the backend, in subset order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.capabilities.iter().map(|c| c.to_definition()).collect()
    }
}

impl std::fmt::Debug for CapabilitySubset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySubset")
            .field("label", &self.label)
            .field("capabilities", &self.names())
            .finish()
    }
}
