//! Configuration types for the Mirror orchestrator.
//!
//! This module provides all configuration structures used to control the
//! engine: the provider endpoint and credential, the polling policy, and the
//! per-domain request parameters for analysis and effect application.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "mirror.json";

/// Placeholder value shipped in sample configs; never a real credential.
const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

/// Default provider base URL.
fn default_api_base_url() -> String {
    "https://yce-api-01.perfectcorp.com/s2s/v2.0".to_string()
}

/// Default environment variable holding the credential.
fn default_api_key_env() -> String {
    "MIRROR_API_KEY".to_string()
}

/// Default per-request timeout in seconds.
const fn default_request_timeout() -> u64 {
    30
}

/// Default poll attempt budget.
const fn default_max_attempts() -> u32 {
    60
}

/// Default interval between poll attempts in milliseconds.
const fn default_interval_ms() -> u64 {
    1000
}

/// Largest accepted poll interval in milliseconds (10 minutes).
const MAX_INTERVAL_MS: u64 = 600_000;

/// Largest accepted poll deadline in seconds (24 hours).
const MAX_DEADLINE_SECS: u64 = 86_400;

/// Default transient retries for upload and task-creation requests.
const fn default_request_retries() -> u32 {
    2
}

/// Default analysis facets.
fn default_facets() -> Vec<String> {
    ["wrinkle", "pore", "texture", "acne"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Default analysis output format.
fn default_format() -> String {
    "json".to_string()
}

/// Default effect payload version.
fn default_effects_version() -> String {
    "1.0".to_string()
}

/// Main configuration for the Mirror engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the vision provider REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer credential. Never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is absent.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request transport timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Poll loop policy.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Skin analysis request parameters.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Effect application parameters.
    #[serde(default)]
    pub effects: EffectsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
            polling: PollingConfig::default(),
            analysis: AnalysisConfig::default(),
            effects: EffectsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `mirror.json` in the current directory. If not found,
    /// returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            MirrorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `mirror.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::ConfigParseError` if the file exists but contains
    /// invalid JSON, and `MirrorError::ConfigValidationError` if a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(MirrorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| MirrorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// The credential is not checked here; see [`Config::credential`].
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        let base = self.api_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(MirrorError::config_validation(
                format!("apiBaseUrl '{base}' is not an http(s) URL"),
                "Set apiBaseUrl to the provider endpoint, e.g. https://yce-api-01.perfectcorp.com/s2s/v2.0",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(MirrorError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 in your mirror.json",
            ));
        }

        if self.polling.max_attempts == 0 {
            return Err(MirrorError::config_validation(
                "polling.maxAttempts must be greater than 0",
                "Set polling.maxAttempts to at least 1 in your mirror.json",
            ));
        }

        if self.polling.deadline_secs == Some(0) {
            return Err(MirrorError::config_validation(
                "polling.deadlineSecs must be greater than 0 when set",
                "Remove polling.deadlineSecs or set it to at least 1 in your mirror.json",
            ));
        }

        if self.polling.interval_ms > MAX_INTERVAL_MS {
            return Err(MirrorError::config_validation(
                format!("polling.intervalMs must be at most {MAX_INTERVAL_MS}"),
                "Set polling.intervalMs to a few seconds or less in your mirror.json",
            ));
        }

        if self.polling.deadline_secs.is_some_and(|d| d > MAX_DEADLINE_SECS) {
            return Err(MirrorError::config_validation(
                format!("polling.deadlineSecs must be at most {MAX_DEADLINE_SECS}"),
                "Remove polling.deadlineSecs or set it to a few minutes in your mirror.json",
            ));
        }

        if self.analysis.facets.iter().all(|f| f.trim().is_empty()) {
            return Err(MirrorError::config_validation(
                "analysis.facets must name at least one facet",
                "Use facets such as [\"wrinkle\", \"pore\", \"texture\", \"acne\"]",
            ));
        }

        if self.effects.version.trim().is_empty() {
            return Err(MirrorError::config_validation(
                "effects.version must not be empty",
                "Set effects.version to \"1.0\" in your mirror.json",
            ));
        }

        Ok(())
    }

    /// Resolves the provider credential.
    ///
    /// Uses `apiKey` when present, otherwise the environment variable named
    /// by `apiKeyEnv`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::MissingCredential` when no credential is set,
    /// it is blank, or it is the sample placeholder.
    pub fn credential(&self) -> Result<String> {
        let from_env = || std::env::var(&self.api_key_env).ok();
        let key = self.api_key.clone().or_else(from_env);

        match key.map(|k| k.trim().to_string()) {
            Some(k) if !k.is_empty() && k != PLACEHOLDER_API_KEY => Ok(k),
            _ => Err(MirrorError::missing_credential(&self.api_key_env)),
        }
    }

    /// Per-request transport timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Poll loop policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    /// Maximum number of poll requests per task.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between poll attempts in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Optional wall-clock limit for the whole poll phase.
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Transient retries for upload and task-creation requests.
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            deadline_secs: None,
            request_retries: default_request_retries(),
        }
    }
}

impl PollingConfig {
    /// Delay between poll attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Optional wall-clock limit for the poll phase.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Skin analysis request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Facets requested from the provider.
    #[serde(default = "default_facets")]
    pub facets: Vec<String>,

    /// Output format requested from the provider.
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            facets: default_facets(),
            format: default_format(),
        }
    }
}

/// Effect application parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectsConfig {
    /// Payload version sent with effect tasks.
    #[serde(default = "default_effects_version")]
    pub version: String,

    /// How multi-effect looks are applied by default.
    #[serde(default)]
    pub default_mode: ApplyMode,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            version: default_effects_version(),
            default_mode: ApplyMode::default(),
        }
    }
}

/// How a list of effects is submitted to the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApplyMode {
    /// All effects in one provider task (default).
    #[default]
    Batch,
    /// One provider task per effect, chained on the previous result.
    Sequential,
}

impl ApplyMode {
    /// Parses a string into an `ApplyMode`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "batch" => Some(Self::Batch),
            "sequential" => Some(Self::Sequential),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ApplyMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid apply mode '{s}': expected one of 'batch', 'sequential'"
            ))
        })
    }
}

impl Serialize for ApplyMode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Batch => "batch",
            Self::Sequential => "sequential",
        };
        serializer.serialize_str(s)
    }
}
