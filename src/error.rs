//! Error types for sandbox orchestration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics;
use crate::sandbox::SandboxState;

/// Top-level error type for sandbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The backend rejected the request (quota, credentials, outage).
    #[error("sandbox provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Sandbox creation did not finish within the bounded wait.
    #[error("sandbox provisioning timed out after {}s", .0.as_secs())]
    ProvisionTimeout(Duration),

    /// Scaffold upload or dev-server start failed.
    #[error("sandbox app setup failed: {0}")]
    SetupFailed(String),

    /// An id was registered twice.
    #[error("sandbox already registered: {0}")]
    DuplicateRegistration(String),

    /// No registered sandbox with this id.
    #[error("sandbox not found: {0}")]
    NotFound(String),

    /// The lifecycle state machine does not allow this move.
    #[error("invalid transition for sandbox {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: SandboxState,
        to: SandboxState,
    },

    /// Another sandbox already holds the single ready slot.
    #[error("sandbox {0} is already the active ready sandbox")]
    ActiveSandboxConflict(String),

    /// Build validation never succeeded within the retry budget.
    #[error("build validation failed after {attempts} attempt(s): {}", errors.join("; "))]
    ValidationFailed { attempts: u32, errors: Vec<String> },

    /// A sandbox could not be released on its backend.
    #[error("failed to terminate sandbox {id}: {reason}")]
    SandboxCleanup { id: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed payload from a backend or config source.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl Error {
    /// Short machine-usable classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ProviderUnavailable(_) => "provider_unavailable",
            Error::ProvisionTimeout(_) => "provision_timeout",
            Error::SetupFailed(_) => "setup_failed",
            Error::DuplicateRegistration(_) => "duplicate_registration",
            Error::NotFound(_) => "not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::ActiveSandboxConflict(_) => "active_sandbox_conflict",
            Error::ValidationFailed { .. } => "validation_failed",
            Error::SandboxCleanup { .. } => "cleanup_failed",
            Error::Config(_) => "config",
            Error::Http(_) => "http",
            Error::Io(_) => "io",
            Error::Serde(_) => "serialization",
        }
    }

    /// Builds the externally reported error record.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            details: diagnostics::enabled().then(|| format!("{self:?}")),
        }
    }
}

/// Error record returned to callers outside the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-usable classification, see [`Error::code`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Debug rendering, only present in diagnostic mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, Error>;
