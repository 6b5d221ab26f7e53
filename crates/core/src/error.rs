//! Error types for the scanpilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is the taxonomy
//! the analysis loop surfaces to the caller.

use thiserror::Error;

/// The top-level error type for all scanpilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Reasoning backend ---
    #[error("Backend error: {0}")]
    Backend(#[from] ProviderError),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    // --- Tool dispatch ---
    #[error("Cannot decode arguments for {capability} (call {call_id}): {reason}")]
    ArgumentDecode {
        call_id: String,
        capability: String,
        reason: String,
    },

    #[error("Unknown capability requested: {name} (call {call_id})")]
    UnknownCapability { call_id: String, name: String },

    #[error("Capability {capability} failed (call {call_id}): {source}")]
    CapabilityFault {
        call_id: String,
        capability: String,
        #[source]
        source: CapabilityError,
    },

    // --- Loop control ---
    #[error("Analysis did not finish within {max_rounds} rounds")]
    RoundLimitExceeded { max_rounds: u32 },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Response is missing the decision message: {0}")]
    MissingDecision(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// A fault raised by a capability handler.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{program} exited with code {code}: {stderr}")]
    ProcessFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Backing service error: {0}")]
    Service(String),

    #[error("Unexpected output: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure reported by a progress observer. Never fatal to the loop.
#[derive(Debug, Error)]
#[error("Progress observer failed: {0}")]
pub struct ObserverError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Backend(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn capability_fault_keeps_source() {
        let err = Error::CapabilityFault {
            call_id: "call_7".into(),
            capability: "scan_template_injection".into(),
            source: CapabilityError::ProcessFailed {
                program: "python3".into(),
                code: 2,
                stderr: "no such file".into(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("scan_template_injection"));
        assert!(text.contains("call_7"));
        assert!(text.contains("exited with code 2"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn round_limit_mentions_bound() {
        let err = Error::RoundLimitExceeded { max_rounds: 3 };
        assert!(err.to_string().contains("3 rounds"));
    }
}
