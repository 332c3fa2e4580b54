//! Integration tests for the HTTP API and WebSocket result stream.

mod mock_provider;

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{SinkExt, StreamExt};
use mirror_orchestrator::{create_router, AppState, Config, Orchestrator, PollingConfig};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

use mock_provider::{jpeg_bytes, Behavior, MockProvider, TEST_KEY};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Starts the Mirror API against `provider`, returning its base URL.
async fn spawn_api(provider: &MockProvider) -> String {
    let config = Config {
        api_base_url: provider.base_url.clone(),
        api_key: Some(TEST_KEY.to_string()),
        request_timeout_secs: 5,
        polling: PollingConfig {
            max_attempts: 10,
            interval_ms: 10,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = Orchestrator::from_config(config).expect("orchestrator");
    let router = create_router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("http://{addr}")
}

async fn connect_client(api: &str) -> WsClient {
    let url = format!("{}/ws", api.replacen("http", "ws", 1));
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Next text frame as JSON, answering pings on the way.
async fn receive_event(client: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            _ => {}
        }
    }
}

fn image_payload() -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg_bytes(512)))
}

#[tokio::test]
async fn test_health_endpoint() {
    let provider = MockProvider::start(Behavior::default()).await;
    let api = spawn_api(&provider).await;

    let body: Value = reqwest::get(format!("{api}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_late_websocket_client_gets_replayed_analysis() {
    let provider = MockProvider::start(Behavior::default()).await;
    let api = spawn_api(&provider).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{api}/api/analyze"))
        .json(&json!({"image": image_payload()}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["overall"], 80);

    let mut client = connect_client(&api).await;
    let connected = receive_event(&mut client).await;
    assert_eq!(connected["event"], "connected");

    let replayed = receive_event(&mut client).await;
    assert_eq!(replayed["event"], "analysis");
    assert_eq!(replayed["payload"], result);
}

#[tokio::test]
async fn test_connected_clients_receive_live_effects() {
    let provider = MockProvider::start(Behavior::default()).await;
    let api = spawn_api(&provider).await;

    let mut first = connect_client(&api).await;
    let mut second = connect_client(&api).await;
    assert_eq!(receive_event(&mut first).await["event"], "connected");
    assert_eq!(receive_event(&mut second).await["event"], "connected");

    let response = reqwest::Client::new()
        .post(format!("{api}/api/effects"))
        .json(&json!({
            "image": image_payload(),
            "effects": [
                {"category": "lipstick", "color": "#b03a48", "intensity": 0.75, "finish": "bold"},
                {"category": "highlighter", "color": "#fff2cc", "intensity": 0.4}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let result: Value = response.json().await.unwrap();

    for client in [&mut first, &mut second] {
        let event = receive_event(client).await;
        assert_eq!(event["event"], "effectApplied");
        assert_eq!(event["payload"], result);
        assert_eq!(event["payload"]["appliedEffects"].as_array().unwrap().len(), 2);
    }
    assert_eq!(provider.creates().len(), 1);
}

#[tokio::test]
async fn test_provider_failure_maps_to_status_and_hint() {
    let provider = MockProvider::start(Behavior {
        running_polls: 0,
        fail_message: Some("error_face_too_small".to_string()),
        ..Default::default()
    })
    .await;
    let api = spawn_api(&provider).await;

    let response = reqwest::Client::new()
        .post(format!("{api}/api/analyze"))
        .json(&json!({"image": image_payload()}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "terminal_server");
    assert!(body["hint"].as_str().unwrap().contains("Face too small"));

    let latest = reqwest::get(format!("{api}/api/results/analysis"))
        .await
        .unwrap();
    assert_eq!(latest.status(), 404);
}

#[tokio::test]
async fn test_clear_results_stops_replay() {
    let provider = MockProvider::start(Behavior::default()).await;
    let api = spawn_api(&provider).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{api}/api/analyze"))
        .json(&json!({"image": image_payload()}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let cleared = http
        .delete(format!("{api}/api/results"))
        .send()
        .await
        .unwrap();
    assert_eq!(cleared.status(), 204);

    let mut client = connect_client(&api).await;
    assert_eq!(receive_event(&mut client).await["event"], "connected");
    let nothing = timeout(Duration::from_millis(200), client.next()).await;
    assert!(nothing.is_err(), "cleared channels must not replay");
}
