//! High-level operations: analyze a face, apply makeup effects.
//!
//! The [`Orchestrator`] owns a [`TaskProtocolClient`] and the
//! [`ResultBroadcaster`]. It maps raw provider results into domain results
//! and publishes them only when the whole operation succeeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::analysis::AnalysisResult;
use crate::broadcast::{ResultBroadcaster, ResultEvent};
use crate::config::{ApplyMode, Config};
use crate::domain::Domain;
use crate::effects::{effects_parameters, normalize_intensity, EffectRequest};
use crate::error::{MirrorError, Result};
use crate::image::ImageAsset;
use crate::protocol::TaskProtocolClient;
use crate::task::{Phase, TaskRequest};
use crate::transport::{ReqwestTransport, Transport};

/// Fields that may carry the rendered image URL, in lookup order.
const RESULT_URL_FIELDS: [&str; 4] = ["url", "result_url", "dst_url", "output_url"];

/// One effect as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedEffect {
    /// Category name.
    pub category: String,
    /// Color as submitted.
    pub color: String,
    /// Intensity after clamping to `[0, 1]`.
    pub intensity: f64,
}

impl From<&EffectRequest> for AppliedEffect {
    fn from(request: &EffectRequest) -> Self {
        Self {
            category: request.category.name().to_string(),
            color: request.color.clone(),
            intensity: normalize_intensity(request.intensity),
        }
    }
}

/// Outcome of applying one or more effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectApplicationResult {
    /// Provider URL of the rendered image.
    pub result_asset_url: String,
    /// Effects in the rendered image, in submission order.
    pub applied_effects: Vec<AppliedEffect>,
}

struct Inner {
    client: TaskProtocolClient,
    config: Config,
    broadcaster: ResultBroadcaster,
}

/// Entry point for analysis and effect application.
///
/// Cheap to clone. Concurrent calls share only the transport and the
/// broadcaster.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("client", &self.inner.client)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over an explicit transport.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the config is invalid or no
    /// usable credential is available. No request is sent in that case.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let credential = config.credential()?;
        let client = TaskProtocolClient::new(
            transport,
            config.api_base_url.trim_end_matches('/'),
            credential,
            config.polling.clone(),
        );
        info!(base_url = %config.api_base_url, "Orchestrator ready");
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                broadcaster: ResultBroadcaster::new(),
            }),
        })
    }

    /// Creates an orchestrator backed by [`ReqwestTransport`].
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::new`], plus `Internal` when the HTTP client
    /// cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())
            .map_err(|e| MirrorError::Io(std::io::Error::other(e.to_string())))?;
        Self::new(config, Arc::new(transport))
    }

    /// The broadcaster results are published to.
    #[must_use]
    pub fn broadcaster(&self) -> &ResultBroadcaster {
        &self.inner.broadcaster
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Runs a skin analysis and publishes the result.
    ///
    /// # Errors
    ///
    /// Any protocol error, or `MalformedResponse` when the result carries
    /// no output array.
    pub async fn analyze(&self, image: ImageAsset) -> Result<AnalysisResult> {
        self.analyze_with_cancel(image, &CancellationToken::new()).await
    }

    /// [`Orchestrator::analyze`] with a cancellation token.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::analyze`], plus `Cancelled`.
    pub async fn analyze_with_cancel(
        &self,
        image: ImageAsset,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let analysis = &self.inner.config.analysis;
        let mut params = Map::new();
        params.insert("dst_actions".into(), json!(analysis.facets));
        params.insert("format".into(), json!(analysis.format));

        let request = TaskRequest::with_asset(Domain::Analysis, image, params);
        let outcome = self.inner.client.run(&request, cancel).await?;

        let result = AnalysisResult::from_raw(&outcome.result).ok_or_else(|| {
            MirrorError::malformed(Phase::ResultMapping, "analysis result has no output array")
        })?;

        info!(
            task_id = %outcome.task_id,
            overall = result.overall,
            skin_age = result.skin_age,
            "Analysis complete"
        );
        self.inner
            .broadcaster
            .publish(ResultEvent::Analysis(result.clone()));
        Ok(result)
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Applies a single effect.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::apply_effect_batch`].
    pub async fn apply_effect(
        &self,
        image: ImageAsset,
        effect: EffectRequest,
    ) -> Result<EffectApplicationResult> {
        self.apply_effect_batch(image, vec![effect]).await
    }

    /// [`Orchestrator::apply_effect`] with a cancellation token.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::apply_effect_batch`], plus `Cancelled`.
    pub async fn apply_effect_with_cancel(
        &self,
        image: ImageAsset,
        effect: EffectRequest,
        cancel: &CancellationToken,
    ) -> Result<EffectApplicationResult> {
        self.apply_effect_batch_with_cancel(image, vec![effect], cancel)
            .await
    }

    /// Applies every effect as one provider task.
    ///
    /// # Errors
    ///
    /// `InvalidEffect` for an empty list, an empty color or a non-finite
    /// intensity; otherwise any protocol error, or `MalformedResponse` when
    /// the result carries no image URL.
    pub async fn apply_effect_batch(
        &self,
        image: ImageAsset,
        effects: Vec<EffectRequest>,
    ) -> Result<EffectApplicationResult> {
        self.apply_effect_batch_with_cancel(image, effects, &CancellationToken::new())
            .await
    }

    /// [`Orchestrator::apply_effect_batch`] with a cancellation token.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::apply_effect_batch`], plus `Cancelled`.
    pub async fn apply_effect_batch_with_cancel(
        &self,
        image: ImageAsset,
        effects: Vec<EffectRequest>,
        cancel: &CancellationToken,
    ) -> Result<EffectApplicationResult> {
        validate_effects(&effects)?;
        let params = effects_parameters(&effects, &self.inner.config.effects.version);
        let request = TaskRequest::with_asset(Domain::EffectApply, image, params);

        let result = self.run_effect_task(&request, &effects, cancel).await?;
        info!(
            effects = effects.len(),
            url = %result.result_asset_url,
            "Effects applied"
        );
        self.inner
            .broadcaster
            .publish(ResultEvent::EffectApplied(result.clone()));
        Ok(result)
    }

    /// Applies effects one task at a time, each on the previous output.
    ///
    /// Only the first task uploads; later tasks reference the previous
    /// result URL. Every step publishes its intermediate result.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::apply_effect_batch`]. A failing step aborts the
    /// chain; earlier steps stay published.
    pub async fn apply_effects_sequential(
        &self,
        image: ImageAsset,
        effects: Vec<EffectRequest>,
    ) -> Result<EffectApplicationResult> {
        self.apply_effects_sequential_with_cancel(image, effects, &CancellationToken::new())
            .await
    }

    /// [`Orchestrator::apply_effects_sequential`] with a cancellation token.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::apply_effects_sequential`], plus `Cancelled`.
    pub async fn apply_effects_sequential_with_cancel(
        &self,
        image: ImageAsset,
        effects: Vec<EffectRequest>,
        cancel: &CancellationToken,
    ) -> Result<EffectApplicationResult> {
        validate_effects(&effects)?;
        let version = &self.inner.config.effects.version;

        let mut previous: Option<EffectApplicationResult> = None;
        for (index, effect) in effects.iter().enumerate() {
            let params = effects_parameters(std::slice::from_ref(effect), version);
            let request = match &previous {
                None => TaskRequest::with_asset(Domain::EffectApply, image.clone(), params),
                Some(prev) => {
                    TaskRequest::with_url(Domain::EffectApply, prev.result_asset_url.clone(), params)
                }
            };

            let applied = &effects[..=index];
            let step = self.run_effect_task(&request, applied, cancel).await?;
            debug!(
                step = index + 1,
                total = effects.len(),
                category = %effect.category,
                "Sequential effect applied"
            );
            self.inner
                .broadcaster
                .publish(ResultEvent::EffectApplied(step.clone()));
            previous = Some(step);
        }

        previous.ok_or_else(|| MirrorError::invalid_effect("at least one effect is required"))
    }

    /// Applies effects in the given mode.
    ///
    /// # Errors
    ///
    /// As the mode's underlying operation.
    pub async fn apply_effects(
        &self,
        image: ImageAsset,
        effects: Vec<EffectRequest>,
        mode: ApplyMode,
        cancel: &CancellationToken,
    ) -> Result<EffectApplicationResult> {
        match mode {
            ApplyMode::Batch => {
                self.apply_effect_batch_with_cancel(image, effects, cancel)
                    .await
            }
            ApplyMode::Sequential => {
                self.apply_effects_sequential_with_cancel(image, effects, cancel)
                    .await
            }
        }
    }

    async fn run_effect_task(
        &self,
        request: &TaskRequest,
        applied: &[EffectRequest],
        cancel: &CancellationToken,
    ) -> Result<EffectApplicationResult> {
        let outcome = self.inner.client.run(request, cancel).await?;
        let url = result_asset_url(&outcome.result).ok_or_else(|| {
            MirrorError::malformed(Phase::ResultMapping, "effect result has no image URL")
        })?;
        Ok(EffectApplicationResult {
            result_asset_url: url,
            applied_effects: applied.iter().map(AppliedEffect::from).collect(),
        })
    }
}

fn validate_effects(effects: &[EffectRequest]) -> Result<()> {
    if effects.is_empty() {
        return Err(MirrorError::invalid_effect("at least one effect is required"));
    }
    for effect in effects {
        if effect.color.trim().is_empty() {
            return Err(MirrorError::invalid_effect(format!(
                "{} effect has an empty color",
                effect.category
            )));
        }
        if !effect.intensity.is_finite() {
            return Err(MirrorError::invalid_effect(format!(
                "{} effect intensity must be a finite number",
                effect.category
            )));
        }
    }
    Ok(())
}

/// Rendered image URL from a raw effect result.
fn result_asset_url(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.first().and_then(result_asset_url),
        Value::Object(map) => RESULT_URL_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(result_asset_url)),
        _ => None,
    }
}
