//! HTTP API for the presentation layer.
//!
//! # Endpoints
//!
//! - `POST /api/analyze` - Run a skin analysis on a base64 image
//! - `POST /api/effects` - Apply makeup effects to a base64 image
//! - `GET /api/results/:channel` - Last published result on a channel
//! - `DELETE /api/results` - Clear every channel
//! - `GET /api/health` - Liveness probe
//! - `GET /ws` - Live result stream (see [`crate::websocket`])
//!
//! # Example
//!
//! ```no_run
//! use mirror_orchestrator::{create_router, AppState, Config, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::from_config(Config::load()?)?;
//! let router = create_router(AppState::new(orchestrator));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::analysis::AnalysisResult;
use crate::broadcast::{Channel, ResultEvent};
use crate::classify::FailureHint;
use crate::config::ApplyMode;
use crate::effects::EffectRequest;
use crate::error::{ErrorKind, MirrorError};
use crate::image::ImageAsset;
use crate::orchestrator::{EffectApplicationResult, Orchestrator};
use crate::websocket::ws_handler;

/// Request bodies carry base64 images of up to 10 MiB.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/analyze`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// Base64 image or data URL.
    pub image: String,
    /// MIME type hint when `image` is plain base64.
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Request body for `POST /api/effects`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEffectsRequest {
    /// Base64 image or data URL.
    pub image: String,
    /// MIME type hint when `image` is plain base64.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Effects to apply, in order.
    pub effects: Vec<EffectRequest>,
    /// Overrides the configured apply mode.
    #[serde(default)]
    pub mode: Option<ApplyMode>,
}

/// Response body for `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Crate version.
    pub version: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
    /// Machine-readable error kind.
    pub kind: String,
    /// User-facing guidance, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Engine handling every request.
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub const fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// Engine failure.
    Mirror(MirrorError),
    /// Path named no known channel.
    UnknownChannel(String),
    /// Channel has nothing published yet.
    NoResult(Channel),
}

impl From<MirrorError> for ApiError {
    fn from(err: MirrorError) -> Self {
        Self::Mirror(err)
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::TerminalServer => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Upload | ErrorKind::TaskCreation | ErrorKind::MalformedResponse => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::PollTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Mirror(err) => {
                let kind = err.kind();
                let hint = match err.hint() {
                    FailureHint::Unknown => None,
                    hint => Some(hint.message().to_string()),
                };
                warn!(kind = %kind, error = %err, "Request failed");
                (
                    status_for(kind),
                    ErrorResponse {
                        error: err.to_string(),
                        kind: kind.to_string(),
                        hint,
                    },
                )
            }
            Self::UnknownChannel(name) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: format!("Unknown channel '{name}'"),
                    kind: "not_found".to_string(),
                    hint: None,
                },
            ),
            Self::NoResult(channel) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: format!("No result published on '{channel}' yet"),
                    kind: "not_found".to_string(),
                    hint: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and `/ws`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/analyze", post(handle_analyze))
        .route("/effects", post(handle_effects))
        .route("/results", delete(handle_clear_results))
        .route("/results/:channel", get(handle_latest_result))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/analyze`.
///
/// A dropped connection cancels the in-flight task.
async fn handle_analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let image = ImageAsset::from_base64(&request.image, request.content_type.as_deref())?;
    info!(bytes = image.len(), format = %image.format(), "Received analysis request");

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let result = state.orchestrator.analyze_with_cancel(image, &cancel).await?;
    Ok(Json(result))
}

/// Handler for `POST /api/effects`.
///
/// A dropped connection cancels the in-flight task.
async fn handle_effects(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApplyEffectsRequest>,
) -> Result<Json<EffectApplicationResult>, ApiError> {
    let image = ImageAsset::from_base64(&request.image, request.content_type.as_deref())?;
    let mode = request
        .mode
        .unwrap_or(state.orchestrator.config().effects.default_mode);
    info!(
        bytes = image.len(),
        effects = request.effects.len(),
        mode = ?mode,
        "Received effects request"
    );

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let result = state
        .orchestrator
        .apply_effects(image, request.effects, mode, &cancel)
        .await?;
    Ok(Json(result))
}

/// Handler for `GET /api/results/:channel`.
async fn handle_latest_result(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ResultEvent>, ApiError> {
    let channel = Channel::parse(&name).ok_or_else(|| ApiError::UnknownChannel(name))?;
    state
        .orchestrator
        .broadcaster()
        .latest(channel)
        .map(Json)
        .ok_or(ApiError::NoResult(channel))
}

/// Handler for `DELETE /api/results`.
async fn handle_clear_results(State(state): State<Arc<AppState>>) -> StatusCode {
    state.orchestrator.broadcaster().clear();
    info!("Cleared published results");
    StatusCode::NO_CONTENT
}

/// Handler for `GET /api/health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
