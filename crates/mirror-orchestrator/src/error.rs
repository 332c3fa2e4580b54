//! Error types for the Mirror orchestration engine.
//!
//! This module defines the error hierarchy surfaced by every public
//! operation: configuration loading, image intake, the three protocol
//! phases (upload, task creation, polling), and result mapping.

use std::path::PathBuf;

use crate::classify::{ClassifiedError, FailureHint};
use crate::task::Phase;

/// A specialized `Result` type for Mirror orchestrator operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that can occur while orchestrating a remote vision task.
///
/// Variants are grouped by the kind of failure reported to the caller
/// (see [`ErrorKind`]). Configuration errors carry actionable suggestions.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your mirror.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// No usable provider credential was configured.
    #[error("Vision provider credential is not configured\n\nSuggestion: Set 'apiKey' in mirror.json or export {env_var}")]
    MissingCredential {
        /// Environment variable consulted for the credential.
        env_var: String,
    },

    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Image file was not found at the specified path.
    #[error("Image not found: '{path}'\n\nSuggestion: Check the image path")]
    ImageNotFound {
        /// Path where the image was expected.
        path: PathBuf,
    },

    /// Image exceeds the upload size limit.
    #[error("Image exceeds size limit (10MB): {size_kb}KB\n\nSuggestion: Capture a smaller frame or re-encode as JPEG")]
    ImageTooLarge {
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Image bytes could not be decoded or identified.
    #[error("Invalid image: {message}")]
    InvalidImage {
        /// Description of the problem.
        message: String,
    },

    /// Effect request is not acceptable.
    #[error("Invalid effect request: {message}")]
    InvalidEffect {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Asset upload failed after exhausting transient retries.
    #[error("Upload failed: {cause}")]
    Upload {
        /// The last classified failure.
        cause: ClassifiedError,
    },

    /// Task creation failed after exhausting transient retries.
    #[error("Task creation failed: {cause}")]
    TaskCreation {
        /// The last classified failure.
        cause: ClassifiedError,
    },

    /// The provider explicitly reported failure.
    #[error("Provider reported failure during {phase}: {message}")]
    TerminalServer {
        /// Phase in which the failure was reported.
        phase: Phase,
        /// Message carried by the provider.
        message: String,
    },

    /// The poll attempt budget (or deadline) ran out before a terminal status.
    #[error("Task {task_id} did not finish after {attempts} poll attempts{}", .last_error.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default())]
    PollTimeout {
        /// Provider task identifier.
        task_id: String,
        /// Poll attempts consumed.
        attempts: u32,
        /// Last transient failure observed, kept for diagnostics.
        last_error: Option<ClassifiedError>,
    },

    /// A successful response lacked a required field.
    #[error("Malformed provider response during {phase}: {message}")]
    MalformedResponse {
        /// Phase in which the response was received.
        phase: Phase,
        /// Description of what was missing.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled during {phase}")]
    Cancelled {
        /// Phase that was interrupted.
        phase: Phase,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid task state transition attempted.
    #[error("Invalid task state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },
}

/// The kind of failure reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid configuration or credential.
    Configuration,
    /// Asset upload failed.
    Upload,
    /// Task creation failed.
    TaskCreation,
    /// Provider explicitly reported task failure.
    TerminalServer,
    /// Attempt budget exhausted while the task was not terminal.
    PollTimeout,
    /// Required field absent in an otherwise successful response.
    MalformedResponse,
    /// Caller cancelled the operation.
    Cancelled,
    /// Caller supplied unusable input.
    InvalidInput,
    /// Local failure unrelated to the provider.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Upload => write!(f, "upload"),
            Self::TaskCreation => write!(f, "task_creation"),
            Self::TerminalServer => write!(f, "terminal_server"),
            Self::PollTimeout => write!(f, "poll_timeout"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::InvalidInput => write!(f, "invalid_input"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl MirrorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingCredential` error.
    #[must_use]
    pub fn missing_credential(env_var: impl Into<String>) -> Self {
        Self::MissingCredential {
            env_var: env_var.into(),
        }
    }

    /// Creates a new `ImageNotFound` error.
    #[must_use]
    pub fn image_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ImageNotFound { path: path.into() }
    }

    /// Creates a new `InvalidImage` error.
    #[must_use]
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidEffect` error.
    #[must_use]
    pub fn invalid_effect(message: impl Into<String>) -> Self {
        Self::InvalidEffect {
            message: message.into(),
        }
    }

    /// Creates a new `Upload` error from its last classified cause.
    #[must_use]
    pub const fn upload(cause: ClassifiedError) -> Self {
        Self::Upload { cause }
    }

    /// Creates a new `TaskCreation` error from its last classified cause.
    #[must_use]
    pub const fn task_creation(cause: ClassifiedError) -> Self {
        Self::TaskCreation { cause }
    }

    /// Creates a new `TerminalServer` error.
    #[must_use]
    pub fn terminal_server(phase: Phase, message: impl Into<String>) -> Self {
        Self::TerminalServer {
            phase,
            message: message.into(),
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed(phase: Phase, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            phase,
            message: message.into(),
        }
    }

    /// Creates a new `PollTimeout` error.
    #[must_use]
    pub fn poll_timeout(
        task_id: impl Into<String>,
        attempts: u32,
        last_error: Option<ClassifiedError>,
    ) -> Self {
        Self::PollTimeout {
            task_id: task_id.into(),
            attempts,
            last_error,
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns the kind of failure this error represents.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::MissingCredential { .. } => ErrorKind::Configuration,
            Self::ImageNotFound { .. }
            | Self::ImageTooLarge { .. }
            | Self::InvalidImage { .. }
            | Self::InvalidEffect { .. } => ErrorKind::InvalidInput,
            Self::Upload { .. } => ErrorKind::Upload,
            Self::TaskCreation { .. } => ErrorKind::TaskCreation,
            Self::TerminalServer { .. } => ErrorKind::TerminalServer,
            Self::PollTimeout { .. } => ErrorKind::PollTimeout,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Io(_) | Self::Json(_) | Self::InvalidStateTransition { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns `true` if repeating the whole operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Upload { .. } | Self::TaskCreation { .. } | Self::PollTimeout { .. }
        )
    }

    /// Returns `true` if the error cannot be fixed by retrying.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::InvalidInput
        )
    }

    /// Best-effort hint for presentation code, derived from provider text.
    ///
    /// Retry and abort decisions never consult this.
    #[must_use]
    pub fn hint(&self) -> FailureHint {
        match self {
            Self::TerminalServer { message, .. } => FailureHint::from_server_message(message),
            Self::PollTimeout { .. } => FailureHint::Timeout,
            _ => FailureHint::Unknown,
        }
    }
}
