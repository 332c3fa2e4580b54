//! Error classification.
//!
//! Every raw failure seen by the protocol client (transport error, non-2xx
//! status, or a 2xx body that reports failure) is reduced to a
//! [`ClassifiedError`] here. The [`FailureKind`] is the single input to the
//! retry/abort decision; message text is carried along for diagnostics and
//! for [`FailureHint`], which is presentation-only.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::{HttpResponse, TransportError};

/// Coarse class of a raw failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or timeout failure with no interpretable server verdict. Retryable.
    Transient,
    /// The server explicitly reported failure. Never retried.
    TerminalServer,
    /// A successful response lacked required fields. Never retried.
    Malformed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::TerminalServer => write!(f, "terminal_server"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// A classified failure with its diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// The failure class.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
    /// HTTP status, when a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ClassifiedError {
    /// Creates a classified error without an HTTP status.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Attaches the HTTP status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns `true` if the failed request may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, FailureKind::Transient)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status}, {})", self.message, self.kind),
            None => write!(f, "{} ({})", self.message, self.kind),
        }
    }
}

impl std::error::Error for ClassifiedError {}

/// Classifies a transport failure. Always transient.
#[must_use]
pub fn classify_transport(err: &TransportError) -> ClassifiedError {
    ClassifiedError::new(FailureKind::Transient, err.to_string())
}

/// Classifies an HTTP response that is expected to carry a JSON body.
///
/// - non-2xx with an explicit error body → `TerminalServer`
/// - non-2xx without one (or 408/429) → `Transient`
/// - 2xx whose body is not JSON → `Malformed`
/// - 2xx whose body carries an `error` field or a `failed`/`error`
///   status → `TerminalServer`
///
/// Returns the parsed body otherwise.
pub fn classify_json_response(resp: &HttpResponse) -> Result<Value, ClassifiedError> {
    if !resp.is_success() {
        return Err(classify_failed_status(resp));
    }

    let Some(body) = resp.json_body() else {
        return Err(ClassifiedError::new(
            FailureKind::Malformed,
            format!("expected JSON body, got: {}", resp.body_snippet()),
        )
        .with_status(resp.status));
    };

    if let Some(message) = embedded_error(&body) {
        return Err(ClassifiedError::new(FailureKind::TerminalServer, message)
            .with_status(resp.status));
    }

    if let Some(status) = reported_status(&body) {
        if is_failure_status(status) {
            return Err(ClassifiedError::new(
                FailureKind::TerminalServer,
                format!("task reported status '{status}'"),
            )
            .with_status(resp.status));
        }
    }

    Ok(body)
}

/// Classifies a response whose body is irrelevant (e.g. a raw asset `PUT`).
pub fn classify_empty_response(resp: &HttpResponse) -> Result<(), ClassifiedError> {
    if resp.is_success() {
        Ok(())
    } else {
        Err(classify_failed_status(resp))
    }
}

fn classify_failed_status(resp: &HttpResponse) -> ClassifiedError {
    let retryable_status = matches!(resp.status, 408 | 429);
    let explicit = resp.json_body().as_ref().and_then(embedded_error);

    match explicit {
        Some(message) if !retryable_status => {
            ClassifiedError::new(FailureKind::TerminalServer, message).with_status(resp.status)
        }
        _ => ClassifiedError::new(
            FailureKind::Transient,
            format!("unexpected HTTP status: {}", resp.body_snippet()),
        )
        .with_status(resp.status),
    }
}

/// Extracts an explicit error message from a provider payload.
///
/// Looks at top-level and `data` level `error` fields; accepts a string or
/// an object with a `message`/`code` field. `null`, `false`, zero, and
/// empty strings are not errors.
#[must_use]
pub fn embedded_error(body: &Value) -> Option<String> {
    [body.get("error"), body.pointer("/data/error")]
        .into_iter()
        .flatten()
        .find_map(error_text)
        .or_else(|| {
            body.get("error_message")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(ToString::to_string)
        })
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64().is_some_and(|f| f.abs() < f64::EPSILON) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("code"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

/// Status string reported by a task payload (`data.task_status`, then
/// `data.status`, then top-level string `status`).
#[must_use]
pub fn reported_status(body: &Value) -> Option<&str> {
    body.pointer("/data/task_status")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/data/status").and_then(Value::as_str))
        .or_else(|| body.get("status").and_then(Value::as_str))
}

fn is_failure_status(status: &str) -> bool {
    status.eq_ignore_ascii_case("failed") || status.eq_ignore_ascii_case("error")
}

/// Best-effort user hint derived from server message text.
///
/// Substring matching on provider prose is fragile, so nothing in the
/// engine decides anything based on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHint {
    /// The face occupies too little of the frame.
    FaceTooSmall,
    /// No face was found.
    FaceNotDetected,
    /// The image is blurry, dark, or otherwise unusable.
    ImageQuality,
    /// The provider took too long.
    Timeout,
    /// No specific hint.
    Unknown,
}

static FACE_TOO_SMALL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)face[\s_-]*too[\s_-]*small").ok());
static FACE_NOT_DETECTED: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)face[\s_-]*not|no[\s_-]*face|face\b.*\bnot\b|\bnot\b.*\bface").ok()
});
static IMAGE_QUALITY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)image|quality|blur|too[\s_-]*dark").ok());
static TIMEOUT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)time[\s_-]*out|timed[\s_-]*out").ok());

fn hint_matches(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

impl FailureHint {
    /// Derives a hint from provider message text.
    #[must_use]
    pub fn from_server_message(message: &str) -> Self {
        if hint_matches(&FACE_TOO_SMALL, message) {
            Self::FaceTooSmall
        } else if hint_matches(&FACE_NOT_DETECTED, message) {
            Self::FaceNotDetected
        } else if hint_matches(&IMAGE_QUALITY, message) {
            Self::ImageQuality
        } else if hint_matches(&TIMEOUT, message) {
            Self::Timeout
        } else {
            Self::Unknown
        }
    }

    /// User-facing guidance for this hint.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::FaceTooSmall => {
                "Face too small. Move closer so your face fills more of the frame."
            }
            Self::FaceNotDetected => {
                "Face not detected. Make sure your face is clearly visible and well lit."
            }
            Self::ImageQuality => "Image quality issue. Use a clear, well-lit photo.",
            Self::Timeout => "The provider is taking too long. Please try again.",
            Self::Unknown => "Something went wrong. Please try again.",
        }
    }
}
