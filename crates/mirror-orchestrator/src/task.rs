//! Task state types for the remote-task protocol.
//!
//! A [`Task`] tracks one provider-side unit of work from creation through to
//! a terminal state. It is owned by a single protocol run and never shared.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classify::ClassifiedError;
use crate::domain::Domain;
use crate::error::{MirrorError, Result};
use crate::image::ImageAsset;

// ============================================================================
// TaskStatus
// ============================================================================

/// Current status of a remote task.
///
/// The status transitions through these states:
/// - `Created` -> `Uploading` -> `TaskCreated` -> `Polling`
/// - `Created` -> `TaskCreated` when the source is an existing asset URL
/// - From `Polling`: `Succeeded` or `TimedOut`
/// - From any non-terminal state: `Failed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task record exists; nothing sent yet.
    #[default]
    Created,
    /// Asset upload in progress.
    Uploading,
    /// Provider accepted the task and issued an id.
    TaskCreated,
    /// Waiting for the provider to finish.
    Polling,
    /// Provider reported success.
    Succeeded,
    /// Provider reported failure, or a request failed for good.
    Failed,
    /// Poll budget or deadline exhausted.
    TimedOut,
}

impl TaskStatus {
    /// Returns `true` if this status represents a terminal state.
    ///
    /// # Examples
    ///
    /// ```
    /// use mirror_orchestrator::TaskStatus;
    ///
    /// assert!(TaskStatus::Succeeded.is_terminal());
    /// assert!(TaskStatus::TimedOut.is_terminal());
    /// assert!(!TaskStatus::Polling.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// Returns `true` if the state machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Created, Self::Uploading | Self::TaskCreated)
            | (Self::Uploading, Self::TaskCreated)
            | (Self::TaskCreated, Self::Polling)
            | (Self::Polling, Self::Succeeded | Self::TimedOut) => true,
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Uploading => "uploading",
            Self::TaskCreated => "task_created",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Protocol phase, used to locate a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Upload slot request and asset `PUT`.
    Upload,
    /// Task submission.
    TaskCreation,
    /// Status polling.
    Polling,
    /// Mapping the raw result into a domain result.
    ResultMapping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::TaskCreation => write!(f, "task creation"),
            Self::Polling => write!(f, "polling"),
            Self::ResultMapping => write!(f, "result mapping"),
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// One remote unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Provider-issued id, known once the task is created.
    pub id: Option<String>,
    /// Capability this task targets.
    pub domain: Domain,
    /// Current status.
    pub status: TaskStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Poll requests issued so far.
    pub attempts: u32,
    /// Raw result, once succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Last classified failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

impl Task {
    /// Creates a task record in the `Created` status.
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        Self {
            id: None,
            domain,
            status: TaskStatus::Created,
            created_at: Utc::now(),
            attempts: 0,
            result: None,
            error: None,
        }
    }

    /// Moves to `next`, rejecting transitions the state machine forbids.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidStateTransition` for a forbidden move.
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MirrorError::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// Records the provider task id and moves to `TaskCreated`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidStateTransition` for a forbidden move.
    pub fn mark_created(&mut self, id: impl Into<String>) -> Result<()> {
        self.transition_to(TaskStatus::TaskCreated)?;
        self.id = Some(id.into());
        Ok(())
    }

    /// Stores the raw result and moves to `Succeeded`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidStateTransition` for a forbidden move.
    pub fn succeed(&mut self, result: Value) -> Result<()> {
        self.transition_to(TaskStatus::Succeeded)?;
        self.result = Some(result);
        Ok(())
    }

    /// Records the failure and moves to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidStateTransition` if already terminal.
    pub fn fail(&mut self, error: Option<ClassifiedError>) -> Result<()> {
        self.transition_to(TaskStatus::Failed)?;
        if error.is_some() {
            self.error = error;
        }
        Ok(())
    }

    /// Moves to `TimedOut`, keeping the last transient failure if any.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidStateTransition` unless polling.
    pub fn time_out(&mut self) -> Result<()> {
        self.transition_to(TaskStatus::TimedOut)
    }

    /// Provider id, or an empty string before creation.
    #[must_use]
    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Returns the duration since the task was created.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Upload slot issued by the provider. Used once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    /// Provider asset id referenced by the task-creation request.
    pub asset_id: String,
    /// Where to `PUT` the bytes.
    pub upload_url: String,
    /// Headers to send with the `PUT`.
    pub upload_headers: BTreeMap<String, String>,
}

/// Input asset for a task.
#[derive(Debug, Clone)]
pub enum TaskSource {
    /// Local bytes to upload first.
    Asset(ImageAsset),
    /// Asset the provider already holds, e.g. a previous task's output.
    Url(String),
}

/// A single protocol run request. Immutable once built.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Target capability.
    pub domain: Domain,
    /// Input asset.
    pub source: TaskSource,
    /// Domain-specific task-creation fields (facets, effects, version...).
    pub parameters: Map<String, Value>,
}

impl TaskRequest {
    /// Creates a request for an asset that still has to be uploaded.
    #[must_use]
    pub fn with_asset(domain: Domain, asset: ImageAsset, parameters: Map<String, Value>) -> Self {
        Self {
            domain,
            source: TaskSource::Asset(asset),
            parameters,
        }
    }

    /// Creates a request referencing an asset URL the provider already holds.
    #[must_use]
    pub fn with_url(domain: Domain, url: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            domain,
            source: TaskSource::Url(url.into()),
            parameters,
        }
    }
}

/// Successful protocol run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Provider task id.
    pub task_id: String,
    /// Poll requests issued.
    pub attempts: u32,
    /// Raw result payload.
    pub result: Value,
}

// ============================================================================
// Tests
// ============================================================================
