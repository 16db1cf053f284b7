//! # Error Handling
//!
//! Central error taxonomy for the meeting backend, following the failure
//! classes the orchestration layer distinguishes between:
//!
//! - **Validation**: malformed inbound payload, rejected before it reaches
//!   the state machine. Client-visible.
//! - **TransientNetwork**: a retryable low-level network fault (timeout,
//!   reset, abrupt termination). Invisible to the caller if a retry succeeds.
//! - **Provider**: a non-transient LLM/TTS failure. Surfaced per turn or per
//!   synthesis task; never terminates the session.
//! - **Persistence**: a storage fault. Fatal for the affected meeting.
//! - **InvalidState**: an operation not permitted in the meeting's current
//!   lifecycle state.
//! - **NotFound** / **Internal**: lookup misses and everything else.
//!
//! Each variant carries a human-readable message; `code()` yields the
//! machine-readable error code used in `conversation_error` events.

use std::fmt;

/// Application error type shared by every component.
#[derive(Debug)]
pub enum AppError {
    /// Inbound payload failed schema or semantic validation
    Validation(String),

    /// Retryable network-level fault (timeout, reset, connection refused)
    TransientNetwork(String),

    /// Non-transient failure from an LLM or speech-synthesis provider
    Provider(String),

    /// Storage failure; fatal for the meeting it occurred in
    Persistence(String),

    /// Operation not allowed in the current meeting state
    InvalidState(String),

    /// Requested resource does not exist
    NotFound(String),

    /// Anything that does not fit the categories above
    Internal(String),
}

impl AppError {
    /// Machine-readable code for client-visible error events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::TransientNetwork(_) => "network_error",
            AppError::Provider(_) => "provider_error",
            AppError::Persistence(_) => "persistence_error",
            AppError::InvalidState(_) => "invalid_state",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether the retry policy may re-attempt the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }

    /// Whether this failure ends the meeting (storage faults do; provider
    /// and generation faults do not).
    pub fn is_fatal_for_meeting(&self) -> bool {
        matches!(self, AppError::Persistence(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::TransientNetwork(msg) => write!(f, "Transient network error: {}", msg),
            AppError::Provider(msg) => write!(f, "Provider error: {}", msg),
            AppError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            AppError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Splits reqwest failures into the transient class (retried) and
/// everything else (propagated unchanged).
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AppError::TransientNetwork(err.to_string())
        } else {
            AppError::Provider(err.to_string())
        }
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

/// Shorthand for results using the application error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Validation("x".into()).code(), "validation_error");
        assert_eq!(AppError::Provider("x".into()).code(), "provider_error");
        assert_eq!(
            AppError::Persistence("x".into()).code(),
            "persistence_error"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::TransientNetwork("reset".into()).is_transient());
        assert!(!AppError::Provider("bad voice".into()).is_transient());
        assert!(!AppError::Persistence("down".into()).is_transient());
    }

    #[test]
    fn test_fatality() {
        assert!(AppError::Persistence("down".into()).is_fatal_for_meeting());
        assert!(!AppError::Provider("oops".into()).is_fatal_for_meeting());
    }
}
