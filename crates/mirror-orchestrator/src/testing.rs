//! Scripted in-process vision provider for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::PollingConfig;
use crate::image::ImageAsset;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport, TransportError};

/// Smallest byte sequence recognized as a JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(b"fake jpeg body");
    data
}

pub fn jpeg_asset() -> ImageAsset {
    ImageAsset::from_bytes(jpeg_bytes(), None).unwrap()
}

/// A JPEG-sniffing asset of exactly `len` bytes.
pub fn jpeg_asset_of_len(len: usize) -> ImageAsset {
    let mut data = jpeg_bytes();
    data.resize(len, 0);
    ImageAsset::from_bytes(data, None).unwrap()
}

/// Polling policy with a 10ms interval.
pub fn fast_polling(max_attempts: u32) -> PollingConfig {
    PollingConfig {
        max_attempts,
        interval_ms: 10,
        deadline_secs: None,
        request_retries: 2,
    }
}

pub type Scripted = Result<HttpResponse, TransportError>;

pub fn poll_status(status: &str) -> Scripted {
    Ok(HttpResponse::json(200, &json!({"status": 200, "data": {"task_status": status}})))
}

pub fn poll_success(result: Value) -> Scripted {
    Ok(HttpResponse::json(
        200,
        &json!({"status": 200, "data": {"task_status": "success", "results": result}}),
    ))
}

pub fn poll_error(message: &str) -> Scripted {
    Ok(HttpResponse::json(
        200,
        &json!({"status": 200, "data": {"task_status": "running", "error": message}}),
    ))
}

/// Which provider endpoint a request hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    UploadSlot,
    AssetPut,
    Create,
    Poll,
}

type PollFn = Box<dyn Fn(&str, u32) -> Scripted + Send + Sync>;

#[derive(Default)]
struct State {
    scripts: HashMap<Endpoint, VecDeque<Scripted>>,
    requests: Vec<(Endpoint, HttpRequest)>,
    polls_per_task: HashMap<String, u32>,
}

/// Mock provider implementing [`Transport`].
///
/// Each endpoint answers from its script queue first, then from a default:
/// upload slots yield `file-{file_size}`, creates yield `task-{src}`, and
/// polls use the poll default (success with an empty result unless set).
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<State>,
    poll_default: Option<Scripted>,
    poll_fn: Option<PollFn>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, endpoint: Endpoint, responses: impl IntoIterator<Item = Scripted>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(endpoint)
            .or_default()
            .extend(responses);
        self
    }

    pub fn with_upload_slots(self, responses: impl IntoIterator<Item = Scripted>) -> Self {
        self.script(Endpoint::UploadSlot, responses)
    }

    pub fn with_creates(self, responses: impl IntoIterator<Item = Scripted>) -> Self {
        self.script(Endpoint::Create, responses)
    }

    pub fn with_polls(self, responses: impl IntoIterator<Item = Scripted>) -> Self {
        self.script(Endpoint::Poll, responses)
    }

    pub fn with_poll_default(mut self, response: Scripted) -> Self {
        self.poll_default = Some(response);
        self
    }

    /// Answers polls from `f(task_id, previous_polls_of_that_task)`.
    pub fn with_poll_fn(mut self, f: impl Fn(&str, u32) -> Scripted + Send + Sync + 'static) -> Self {
        self.poll_fn = Some(Box::new(f));
        self
    }

    pub fn status(status: u16) -> Scripted {
        Ok(HttpResponse::empty(status))
    }

    pub fn json(status: u16, body: Value) -> Scripted {
        Ok(HttpResponse::json(status, &body))
    }

    pub fn text(status: u16, body: &str) -> Scripted {
        Ok(HttpResponse {
            status,
            headers: BTreeMap::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    pub fn transport_error(message: &str) -> Scripted {
        Err(TransportError::Connect(message.to_string()))
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn requests(&self, endpoint: Endpoint) -> Vec<HttpRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// JSON bodies sent to `endpoint`, in order.
    pub fn json_bodies(&self, endpoint: Endpoint) -> Vec<Value> {
        self.requests(endpoint)
            .into_iter()
            .filter_map(|r| match r.body {
                RequestBody::Json(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    fn endpoint_of(request: &HttpRequest) -> Endpoint {
        match request.method {
            HttpMethod::Put => Endpoint::AssetPut,
            HttpMethod::Get => Endpoint::Poll,
            HttpMethod::Post if request.url.contains("/file/") => Endpoint::UploadSlot,
            HttpMethod::Post => Endpoint::Create,
        }
    }

    fn default_response(&self, endpoint: Endpoint, request: &HttpRequest, poll_count: u32) -> Scripted {
        let body = match &request.body {
            RequestBody::Json(v) => v.clone(),
            _ => Value::Null,
        };
        match endpoint {
            Endpoint::UploadSlot => {
                let size = &body["files"][0]["file_size"];
                Ok(HttpResponse::json(
                    200,
                    &json!({"status": 200, "data": {"files": [{
                        "file_id": format!("file-{size}"),
                        "requests": [{
                            "url": "http://uploads.invalid/put",
                            "headers": {"Content-Type": body["files"][0]["content_type"]}
                        }]
                    }]}}),
                ))
            }
            Endpoint::AssetPut => Ok(HttpResponse::empty(200)),
            Endpoint::Create => {
                let src = body["src_file_id"]
                    .as_str()
                    .or_else(|| body["src_file_url"].as_str())
                    .unwrap_or("none");
                Ok(HttpResponse::json(
                    200,
                    &json!({"status": 200, "data": {"task_id": format!("task-{src}")}}),
                ))
            }
            Endpoint::Poll => {
                let task_id = request.url.rsplit('/').next().unwrap_or_default();
                if let Some(f) = &self.poll_fn {
                    f(task_id, poll_count)
                } else {
                    self.poll_default
                        .clone()
                        .unwrap_or_else(|| poll_success(json!({})))
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MockProvider {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let endpoint = Self::endpoint_of(&request);
        let (scripted, poll_count) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push((endpoint, request.clone()));
            let poll_count = if endpoint == Endpoint::Poll {
                let task_id = request.url.rsplit('/').next().unwrap_or_default().to_string();
                let counter = state.polls_per_task.entry(task_id).or_insert(0);
                *counter += 1;
                *counter - 1
            } else {
                0
            };
            let scripted = state.scripts.get_mut(&endpoint).and_then(VecDeque::pop_front);
            (scripted, poll_count)
        };

        scripted.unwrap_or_else(|| self.default_response(endpoint, &request, poll_count))
    }
}
