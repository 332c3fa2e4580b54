//! Mirror orchestration engine.
//!
//! Runs skin analysis and makeup try-on tasks against a remote vision
//! provider through a single upload → create → poll protocol, and
//! publishes results over replay-one channels and an HTTP/WebSocket API.

pub mod analysis;
pub mod api;
pub mod broadcast;
pub mod classify;
pub mod config;
pub mod domain;
pub mod effects;
pub mod error;
pub mod image;
pub mod orchestrator;
pub mod protocol;
pub mod task;
pub mod transport;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{AnalysisResult, Recommendation};
pub use api::{create_router, AnalyzeRequest, AppState, ApplyEffectsRequest, ErrorResponse};
pub use broadcast::{Channel, ResultBroadcaster, ResultEvent, Subscription};
pub use classify::{ClassifiedError, FailureHint, FailureKind};
pub use config::{AnalysisConfig, ApplyMode, Config, EffectsConfig, PollingConfig};
pub use domain::{Domain, DomainSpec, RemoteStatus};
pub use effects::{build_effect_payload, EffectPayload, EffectRequest, Finish, MakeupCategory};
pub use error::{ErrorKind, MirrorError, Result};
pub use image::{ImageAsset, ImageFormat, MAX_IMAGE_SIZE};
pub use orchestrator::{AppliedEffect, EffectApplicationResult, Orchestrator};
pub use protocol::TaskProtocolClient;
pub use task::{Phase, Task, TaskOutcome, TaskRequest, TaskSource, TaskStatus};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use tokio_util::sync::CancellationToken;
