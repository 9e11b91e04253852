//! Error types for replbox.

use thiserror::Error;

use crate::types::SessionState;

/// Result type alias using replbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for replbox.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Language mismatch: session runs {expected}, request targets {actual}")]
    LanguageMismatch { expected: String, actual: String },

    // =========================================================================
    // Session Errors
    // =========================================================================
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {id} is not ready (state: {state})")]
    SessionNotReady { id: String, state: SessionState },

    #[error("Invalid session transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: SessionState,
        to: SessionState,
    },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("Sandbox setup failed: {0}")]
    SetupFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Container runtime error: {0}")]
    Adapter(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a malformed request error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    /// Create an unsupported language error.
    pub fn unsupported_language(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(language.into())
    }

    /// Create a session not found error.
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound(id.into())
    }

    /// Create a provisioning error.
    pub fn provisioning_failed(msg: impl Into<String>) -> Self {
        Self::ProvisioningFailed(msg.into())
    }

    /// Create a setup error.
    pub fn setup_failed(msg: impl Into<String>) -> Self {
        Self::SetupFailed(msg.into())
    }

    /// Create an execution error.
    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a container runtime error.
    pub fn adapter(msg: impl Into<String>) -> Self {
        Self::Adapter(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "MALFORMED_REQUEST",
            Self::UnsupportedLanguage(_) => "UNSUPPORTED_LANGUAGE",
            Self::LanguageMismatch { .. } => "LANGUAGE_MISMATCH",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionNotReady { .. } => "SESSION_NOT_READY",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ProvisioningFailed(_) => "PROVISIONING_FAILED",
            Self::SetupFailed(_) => "SETUP_FAILED",
            Self::ExecutionFailed(_) => "EXECUTION_FAILED",
            Self::Adapter(_) => "ADAPTER_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_detail() {
        let err = Error::provisioning_failed("image python:3 not found");
        assert_eq!(
            err.to_string(),
            "Provisioning failed: image python:3 not found"
        );
        assert_eq!(err.code(), "PROVISIONING_FAILED");
    }

    #[test]
    fn test_session_not_ready_mentions_state() {
        let err = Error::SessionNotReady {
            id: "abc".into(),
            state: SessionState::Killed,
        };
        assert!(err.to_string().contains("Killed"));
        assert_eq!(err.code(), "SESSION_NOT_READY");
    }
}
