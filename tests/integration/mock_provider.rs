//! In-process vision provider speaking the upload/create/poll protocol.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

/// Credential the mock accepts.
pub const TEST_KEY: &str = "test-key";

/// How the mock answers polls.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// `running` answers before the terminal one.
    pub running_polls: u32,
    /// When set, the terminal answer reports this error.
    pub fail_message: Option<String>,
    /// Never finish.
    pub never_finish: bool,
    /// Analysis output entries.
    pub analysis_output: Value,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            running_polls: 1,
            fail_message: None,
            never_finish: false,
            analysis_output: json!([
                {"type": "texture", "ui_score": 68},
                {"type": "pore", "ui_score": 74},
                {"type": "wrinkle", "raw_score": 83},
                {"type": "acne", "ui_score": 91},
                {"type": "skin_age", "score": 29},
                {"type": "all", "score": 80}
            ]),
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    next_id: u32,
    uploads: HashMap<String, Vec<u8>>,
    creates: Vec<(String, Value)>,
    polls: HashMap<String, u32>,
    auth_headers: Vec<String>,
}

struct Shared {
    base_url: String,
    behavior: Behavior,
    recorded: Mutex<Recorded>,
}

/// A running mock provider.
pub struct MockProvider {
    /// Base URL to configure the engine with.
    pub base_url: String,
    shared: Arc<Shared>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockProvider {
    /// Starts a provider on an ephemeral port.
    pub async fn start(behavior: Behavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock provider");
        let addr: SocketAddr = listener.local_addr().expect("mock addr");
        let base_url = format!("http://{addr}");

        let shared = Arc::new(Shared {
            base_url: base_url.clone(),
            behavior,
            recorded: Mutex::new(Recorded::default()),
        });

        let router = Router::new()
            .route("/file/:domain", post(upload_slot))
            .route("/upload/:file_id", put(store_upload))
            .route("/task/:domain", post(create_task))
            .route("/task/:domain/:task_id", get(poll_task))
            .with_state(shared.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock provider");
        });

        Self {
            base_url,
            shared,
            _handle: handle,
        }
    }

    /// Task-creation bodies in arrival order, with their domain.
    pub fn creates(&self) -> Vec<(String, Value)> {
        self.shared.recorded.lock().unwrap().creates.clone()
    }

    /// Poll requests received for one task.
    pub fn polls(&self, task_id: &str) -> u32 {
        self.shared
            .recorded
            .lock()
            .unwrap()
            .polls
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total poll requests across tasks.
    pub fn total_polls(&self) -> u32 {
        self.shared.recorded.lock().unwrap().polls.values().sum()
    }

    /// Bytes received by the upload endpoint, keyed by file id.
    pub fn uploads(&self) -> HashMap<String, Vec<u8>> {
        self.shared.recorded.lock().unwrap().uploads.clone()
    }

    /// Authorization headers seen on API calls.
    pub fn auth_headers(&self) -> Vec<String> {
        self.shared.recorded.lock().unwrap().auth_headers.clone()
    }
}

fn authorized(shared: &Shared, headers: &HeaderMap) -> Result<(), Response> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    shared.recorded.lock().unwrap().auth_headers.push(auth.clone());

    if auth == format!("Bearer {TEST_KEY}") {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": 401, "error": "invalid api key"})),
        )
            .into_response())
    }
}

async fn upload_slot(
    State(shared): State<Arc<Shared>>,
    Path(_domain): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorized(&shared, &headers) {
        return resp;
    }
    let file_id = {
        let mut recorded = shared.recorded.lock().unwrap();
        recorded.next_id += 1;
        format!("file-{}", recorded.next_id)
    };
    let content_type = body["files"][0]["content_type"].clone();
    Json(json!({"status": 200, "data": {"files": [{
        "file_id": file_id,
        "requests": [{
            "method": "PUT",
            "url": format!("{}/upload/{file_id}", shared.base_url),
            "headers": {"Content-Type": content_type}
        }]
    }]}}))
    .into_response()
}

async fn store_upload(
    State(shared): State<Arc<Shared>>,
    Path(file_id): Path<String>,
    body: Bytes,
) -> StatusCode {
    shared
        .recorded
        .lock()
        .unwrap()
        .uploads
        .insert(file_id, body.to_vec());
    StatusCode::OK
}

async fn create_task(
    State(shared): State<Arc<Shared>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorized(&shared, &headers) {
        return resp;
    }
    let source = body["src_file_id"]
        .as_str()
        .map(ToString::to_string)
        .or_else(|| body["src_file_url"].as_str().map(|_| "url".to_string()))
        .unwrap_or_default();
    let task_id = {
        let mut recorded = shared.recorded.lock().unwrap();
        recorded.next_id += 1;
        recorded.creates.push((domain, body));
        format!("task-{}-{source}", recorded.next_id)
    };
    Json(json!({"status": 200, "data": {"task_id": task_id}})).into_response()
}

async fn poll_task(
    State(shared): State<Arc<Shared>>,
    Path((domain, task_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorized(&shared, &headers) {
        return resp;
    }
    let seen = {
        let mut recorded = shared.recorded.lock().unwrap();
        let counter = recorded.polls.entry(task_id.clone()).or_insert(0);
        *counter += 1;
        *counter
    };

    let behavior = &shared.behavior;
    if behavior.never_finish || seen <= behavior.running_polls {
        return Json(json!({"status": 200, "data": {"task_status": "running"}})).into_response();
    }
    if let Some(message) = &behavior.fail_message {
        return Json(json!({"status": 200, "data": {"task_status": "error", "error": message}}))
            .into_response();
    }

    let results = if domain == "skin-analysis" {
        json!({"output": behavior.analysis_output})
    } else {
        json!({"url": format!("{}/results/{task_id}.jpg", shared.base_url)})
    };
    Json(json!({"status": 200, "data": {"task_status": "success", "results": results}}))
        .into_response()
}

/// Bytes that sniff as JPEG.
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.resize(len.max(4), 0x42);
    data
}
