//! Per-domain protocol mapping.
//!
//! Every provider capability speaks the same upload → create → poll
//! protocol. What differs is the URL segment, the upload file-name prefix,
//! and the names of a few request/response fields. Those differences live
//! in one static [`DomainSpec`] per [`Domain`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provider capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Skin analysis.
    Analysis,
    /// Makeup virtual try-on.
    EffectApply,
}

/// Field and endpoint mapping for one [`Domain`].
#[derive(Debug)]
pub struct DomainSpec {
    /// URL segment substituted into `/file/{path}` and `/task/{path}`.
    pub path: &'static str,
    /// Prefix for upload file names.
    pub file_prefix: &'static str,
    /// Candidate status field names under `data`, in priority order.
    pub status_fields: &'static [&'static str],
    /// Candidate result field names under `data`, in priority order.
    pub result_fields: &'static [&'static str],
    /// Task-creation field naming an uploaded asset.
    pub src_file_id_field: &'static str,
    /// Task-creation field naming a previously produced asset URL.
    pub src_file_url_field: &'static str,
}

static ANALYSIS: DomainSpec = DomainSpec {
    path: "skin-analysis",
    file_prefix: "skin_analysis",
    status_fields: &["task_status", "status"],
    result_fields: &["results", "result"],
    src_file_id_field: "src_file_id",
    src_file_url_field: "src_file_url",
};

static EFFECT_APPLY: DomainSpec = DomainSpec {
    path: "makeup-vto",
    file_prefix: "makeup",
    status_fields: &["task_status", "status"],
    result_fields: &["results", "result"],
    src_file_id_field: "src_file_id",
    src_file_url_field: "src_file_url",
};

impl Domain {
    /// Returns the mapping table entry for this domain.
    #[must_use]
    pub const fn spec(self) -> &'static DomainSpec {
        match self {
            Self::Analysis => &ANALYSIS,
            Self::EffectApply => &EFFECT_APPLY,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().path)
    }
}

/// Task status as reported by a poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// `success` or `completed`.
    Success,
    /// `running`, `pending`, `processing` or `queued`.
    Running,
    /// `failed` or `error`.
    Failed,
    /// Anything else, or no status at all.
    Unrecognized(String),
}

impl RemoteStatus {
    /// Parses a provider status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "success" | "completed" => Self::Success,
            "running" | "pending" | "processing" | "queued" => Self::Running,
            "failed" | "error" => Self::Failed,
            _ => Self::Unrecognized(status.to_string()),
        }
    }
}

impl DomainSpec {
    /// Upload-slot endpoint.
    #[must_use]
    pub fn file_url(&self, base: &str) -> String {
        format!("{}/file/{}", base.trim_end_matches('/'), self.path)
    }

    /// Task-creation endpoint.
    #[must_use]
    pub fn task_url(&self, base: &str) -> String {
        format!("{}/task/{}", base.trim_end_matches('/'), self.path)
    }

    /// Poll endpoint for one task.
    #[must_use]
    pub fn poll_url(&self, base: &str, task_id: &str) -> String {
        format!("{}/{task_id}", self.task_url(base))
    }

    /// Reads the task status from a poll body.
    #[must_use]
    pub fn status_of(&self, body: &Value) -> RemoteStatus {
        let data = body.get("data").unwrap_or(body);
        self.status_fields
            .iter()
            .find_map(|field| data.get(*field).and_then(Value::as_str))
            .map_or_else(|| RemoteStatus::Unrecognized(String::new()), RemoteStatus::parse)
    }

    /// Extracts the raw result from a successful poll body.
    ///
    /// Falls back to the whole `data` object when no result field is present.
    #[must_use]
    pub fn result_of(&self, body: &Value) -> Value {
        let data = body.get("data").unwrap_or(body);
        self.result_fields
            .iter()
            .find_map(|field| data.get(*field).filter(|v| !v.is_null()))
            .unwrap_or(data)
            .clone()
    }
}
