//! The three-phase remote-task protocol.
//!
//! [`TaskProtocolClient::run`] drives one [`TaskRequest`] through
//! upload → create → poll for any [`Domain`](crate::Domain), using the
//! domain's [`DomainSpec`] for endpoint and field names. Retry and abort
//! decisions are made solely on [`FailureKind`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::classify::{
    classify_empty_response, classify_json_response, classify_transport, ClassifiedError,
    FailureKind,
};
use crate::config::PollingConfig;
use crate::domain::{DomainSpec, RemoteStatus};
use crate::error::{MirrorError, Result};
use crate::image::ImageAsset;
use crate::task::{
    Phase, Task, TaskOutcome, TaskRequest, TaskSource, TaskStatus, UploadDescriptor,
};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};

/// Client for the provider's upload/create/poll protocol.
///
/// Cheap to clone; holds no per-task state.
#[derive(Clone)]
pub struct TaskProtocolClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    credential: String,
    polling: PollingConfig,
}

impl std::fmt::Debug for TaskProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProtocolClient")
            .field("base_url", &self.base_url)
            .field("credential", &"<redacted>")
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl TaskProtocolClient {
    /// Creates a client.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        credential: impl Into<String>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            credential: credential.into(),
            polling,
        }
    }

    /// The polling policy in effect.
    #[must_use]
    pub const fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    /// Runs one task to a terminal state.
    ///
    /// # Errors
    ///
    /// - `Upload` / `TaskCreation` when transient retries are exhausted
    /// - `TerminalServer` as soon as the provider reports failure
    /// - `MalformedResponse` when a successful response lacks required fields
    /// - `PollTimeout` when the attempt budget or deadline runs out
    /// - `Cancelled` when `cancel` fires
    pub async fn run(&self, request: &TaskRequest, cancel: &CancellationToken) -> Result<TaskOutcome> {
        let span = info_span!("remote_task", domain = %request.domain);
        async {
            let mut task = Task::new(request.domain);
            let result = self.drive(&mut task, request, cancel).await;

            match &result {
                Ok(outcome) => info!(
                    task_id = %outcome.task_id,
                    attempts = outcome.attempts,
                    elapsed_ms = task.elapsed().num_milliseconds(),
                    "Remote task succeeded"
                ),
                Err(err) => {
                    if !task.status.is_terminal() {
                        if let Err(e) = task.fail(None) {
                            debug!(error = %e, "Could not mark task failed");
                        }
                    }
                    warn!(
                        task_id = task.id_or_empty(),
                        status = %task.status,
                        attempts = task.attempts,
                        error = %err,
                        "Remote task failed"
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        task: &mut Task,
        request: &TaskRequest,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome> {
        let spec = request.domain.spec();

        ensure_active(cancel, Phase::Upload)?;
        let source = match &request.source {
            TaskSource::Asset(asset) => {
                task.transition_to(TaskStatus::Uploading)?;
                let descriptor = self.upload(spec, asset, cancel).await?;
                (spec.src_file_id_field, Value::String(descriptor.asset_id))
            }
            TaskSource::Url(url) => (spec.src_file_url_field, Value::String(url.clone())),
        };

        ensure_active(cancel, Phase::TaskCreation)?;
        let task_id = self.create_task(spec, request, source, cancel).await?;
        task.mark_created(task_id.clone())?;
        info!(task_id = %task_id, "Task created");

        task.transition_to(TaskStatus::Polling)?;
        let result = self.poll(spec, task, &task_id, cancel).await?;
        task.succeed(result.clone())?;

        Ok(TaskOutcome {
            task_id,
            attempts: task.attempts,
            result,
        })
    }

    // ------------------------------------------------------------------------
    // Phase 1: upload
    // ------------------------------------------------------------------------

    async fn upload(
        &self,
        spec: &DomainSpec,
        asset: &ImageAsset,
        cancel: &CancellationToken,
    ) -> Result<UploadDescriptor> {
        let file_name = asset.upload_file_name(spec.file_prefix);
        let slot_url = spec.file_url(&self.base_url);
        let slot_body = json!({
            "files": [{
                "content_type": asset.content_type(),
                "file_name": file_name,
                "file_size": asset.len(),
            }]
        });
        debug!(file_name = %file_name, size = asset.len(), "Requesting upload slot");

        let descriptor = self
            .send_with_retries(
                Phase::Upload,
                cancel,
                || self.authorized(HttpMethod::Post, &slot_url).json(slot_body.clone()),
                parse_upload_slot,
            )
            .await?;

        let content_type = asset.content_type();
        self.send_with_retries(
            Phase::Upload,
            cancel,
            || {
                let mut put = HttpRequest::new(HttpMethod::Put, &descriptor.upload_url)
                    .headers(descriptor.upload_headers.clone())
                    .bytes(asset.bytes().clone());
                if !put.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                    put = put.header("Content-Type", content_type);
                }
                put
            },
            classify_empty_response,
        )
        .await?;

        debug!(asset_id = %descriptor.asset_id, "Asset uploaded");
        Ok(descriptor)
    }

    // ------------------------------------------------------------------------
    // Phase 2: create
    // ------------------------------------------------------------------------

    async fn create_task(
        &self,
        spec: &DomainSpec,
        request: &TaskRequest,
        (source_field, source_value): (&str, Value),
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut body = request.parameters.clone();
        body.insert(source_field.to_string(), source_value);
        let body = Value::Object(body);
        let url = spec.task_url(&self.base_url);

        self.send_with_retries(
            Phase::TaskCreation,
            cancel,
            || self.authorized(HttpMethod::Post, &url).json(body.clone()),
            parse_task_id,
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Phase 3: poll
    // ------------------------------------------------------------------------

    async fn poll(
        &self,
        spec: &DomainSpec,
        task: &mut Task,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let max_attempts = self.polling.max_attempts;
        // A deadline too far out to represent is no deadline.
        let deadline = self
            .polling
            .deadline()
            .and_then(|d| Instant::now().checked_add(d));
        let url = spec.poll_url(&self.base_url, task_id);

        for attempt in 1..=max_attempts {
            ensure_active(cancel, Phase::Polling)?;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(task_id, attempt, "Poll deadline reached");
                break;
            }

            task.attempts = attempt;
            let request = self.authorized(HttpMethod::Get, &url);
            let response = match self.send(request, cancel, Phase::Polling).await? {
                Ok(resp) => classify_json_response(&resp),
                Err(e) => Err(classify_transport(&e)),
            };

            match response {
                Ok(body) => match spec.status_of(&body) {
                    RemoteStatus::Success => {
                        debug!(task_id, attempt, max_attempts, "Task finished");
                        return Ok(spec.result_of(&body));
                    }
                    RemoteStatus::Failed => {
                        return Err(MirrorError::terminal_server(
                            Phase::Polling,
                            "task reported failure",
                        ));
                    }
                    RemoteStatus::Running => {
                        debug!(task_id, attempt, max_attempts, status = "running", "Task still running");
                    }
                    RemoteStatus::Unrecognized(status) => {
                        debug!(
                            task_id,
                            attempt,
                            max_attempts,
                            status = %status,
                            "Unrecognized task status, treating as running"
                        );
                    }
                },
                Err(err) if err.is_transient() => {
                    warn!(task_id, attempt, max_attempts, error = %err, "Poll request failed, will retry");
                    task.error = Some(err);
                }
                Err(err) => {
                    task.error = Some(err.clone());
                    return Err(phase_error(Phase::Polling, err));
                }
            }

            if attempt < max_attempts {
                self.pause(cancel, Phase::Polling, deadline).await?;
            }
        }

        task.time_out()?;
        Err(MirrorError::poll_timeout(task_id, task.attempts, task.error.clone()))
    }

    // ------------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------------

    fn authorized(&self, method: HttpMethod, url: &str) -> HttpRequest {
        HttpRequest::new(method, url).bearer(&self.credential)
    }

    /// Sends one request, giving up early if `cancel` fires.
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
        phase: Phase,
    ) -> Result<std::result::Result<HttpResponse, TransportError>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(MirrorError::Cancelled { phase }),
            response = self.transport.send(request) => Ok(response),
        }
    }

    /// Sends a request, retrying transient failures `request_retries` times.
    async fn send_with_retries<T>(
        &self,
        phase: Phase,
        cancel: &CancellationToken,
        build: impl Fn() -> HttpRequest,
        parse: impl Fn(&HttpResponse) -> std::result::Result<T, ClassifiedError>,
    ) -> Result<T> {
        let max_tries = self.polling.request_retries.saturating_add(1);
        let mut tries = 0;

        loop {
            tries += 1;
            let outcome = match self.send(build(), cancel, phase).await? {
                Ok(resp) => parse(&resp),
                Err(e) => Err(classify_transport(&e)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && tries < max_tries => {
                    warn!(%phase, attempt = tries, max_attempts = max_tries, error = %err, "Request failed, will retry");
                    self.pause(cancel, phase, None).await?;
                }
                Err(err) => return Err(phase_error(phase, err)),
            }
        }
    }

    /// Sleeps one poll interval (clamped to `deadline`), or until cancelled.
    async fn pause(
        &self,
        cancel: &CancellationToken,
        phase: Phase,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let interval = self.polling.interval();
        let sleep = match deadline {
            Some(deadline) => tokio::time::sleep_until(
                Instant::now()
                    .checked_add(interval)
                    .map_or(deadline, |wake| wake.min(deadline)),
            ),
            None => tokio::time::sleep(interval),
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(MirrorError::Cancelled { phase }),
            () = sleep => Ok(()),
        }
    }
}

fn ensure_active(cancel: &CancellationToken, phase: Phase) -> Result<()> {
    if cancel.is_cancelled() {
        Err(MirrorError::Cancelled { phase })
    } else {
        Ok(())
    }
}

/// Converts a final classified failure into the caller-facing error.
fn phase_error(phase: Phase, err: ClassifiedError) -> MirrorError {
    match err.kind {
        FailureKind::TerminalServer => MirrorError::terminal_server(phase, err.message),
        FailureKind::Malformed => MirrorError::malformed(phase, err.message),
        FailureKind::Transient => match phase {
            Phase::Upload => MirrorError::upload(err),
            Phase::TaskCreation => MirrorError::task_creation(err),
            Phase::Polling | Phase::ResultMapping => MirrorError::poll_timeout("", 0, Some(err)),
        },
    }
}

fn malformed(message: impl Into<String>) -> ClassifiedError {
    ClassifiedError::new(FailureKind::Malformed, message)
}

fn parse_upload_slot(resp: &HttpResponse) -> std::result::Result<UploadDescriptor, ClassifiedError> {
    let body = classify_json_response(resp)?;
    let file = body
        .pointer("/data/files/0")
        .ok_or_else(|| malformed("upload response has no data.files[0]"))?;
    let asset_id = string_field(file.get("file_id"))
        .ok_or_else(|| malformed("upload response has no file_id"))?;
    let slot = file
        .pointer("/requests/0")
        .ok_or_else(|| malformed("upload response has no requests[0]"))?;
    let upload_url = slot
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| malformed("upload response has no upload url"))?
        .to_string();
    let upload_headers = slot
        .get("headers")
        .and_then(Value::as_object)
        .map(|headers| {
            headers
                .iter()
                .map(|(k, v)| {
                    let value = v.as_str().map_or_else(|| v.to_string(), ToString::to_string);
                    (k.clone(), value)
                })
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    Ok(UploadDescriptor {
        asset_id,
        upload_url,
        upload_headers,
    })
}

fn parse_task_id(resp: &HttpResponse) -> std::result::Result<String, ClassifiedError> {
    let body = classify_json_response(resp)?;
    string_field(body.pointer("/data/task_id").or_else(|| body.get("task_id")))
        .ok_or_else(|| malformed("task creation response has no task_id"))
}

/// Accepts a non-empty string or a number as an identifier.
fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
