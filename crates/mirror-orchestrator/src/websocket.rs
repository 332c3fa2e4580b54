//! WebSocket streaming of published results.
//!
//! Each connection receives a `connected` frame, then every
//! [`ResultEvent`] as `{"event", "payload"}` text frames. Channels replay
//! their last value on connect, so a client that connects after an
//! analysis finished still gets it.
//!
//! # Frames
//!
//! - `connected` - Sent first, lists the subscribed channels
//! - `analysis` - An [`AnalysisResult`](crate::AnalysisResult)
//! - `effectApplied` - An [`EffectApplicationResult`](crate::EffectApplicationResult)

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::broadcast::{Channel, ResultBroadcaster, ResultEvent};

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Control frames sent by the server that are not results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ControlEvent {
    /// First frame on every connection.
    Connected {
        /// Channels this connection follows.
        channels: Vec<Channel>,
    },
}

impl ControlEvent {
    /// Creates a `connected` frame for every channel.
    #[must_use]
    pub fn connected() -> Self {
        Self::Connected {
            channels: Channel::ALL.to_vec(),
        }
    }
}

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    let broadcaster = state.orchestrator.broadcaster().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Serializes a frame, logging instead of failing.
fn to_frame<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            warn!("Failed to serialize frame: {}", e);
            None
        }
    }
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` immediately
/// - Forwards replayed and live results from every channel
/// - Sends heartbeat pings every 30 seconds
/// - Closes after 3 missed pongs
async fn handle_socket(socket: WebSocket, broadcaster: ResultBroadcaster) {
    let (mut sender, mut receiver) = socket.split();

    let Some(connected) = to_frame(&ControlEvent::connected()) else {
        return;
    };
    if sender.send(connected).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    let events = futures::stream::select_all(
        Channel::ALL
            .into_iter()
            .map(|channel| broadcaster.subscribe(channel).into_stream().boxed()),
    );
    drop(broadcaster);
    tokio::pin!(events);

    info!("WebSocket client connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = events.next() => {
                let Some(event) = event else {
                    info!("Result broadcaster closed");
                    break;
                };
                let Some(frame) = to_frame::<ResultEvent>(&event) else {
                    continue;
                };
                if sender.send(frame).await.is_err() {
                    debug!("Failed to send result, client disconnected");
                    break;
                }
                debug!(channel = %event.channel(), "Forwarded result");
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_event_serialization() {
        let json = serde_json::to_string(&ControlEvent::connected()).unwrap();
        assert!(json.contains(r#""event":"connected""#));
        assert!(json.contains(r#""channels":["analysis","effectApplied"]"#));
    }

    #[test]
    fn test_connected_event_deserialization() {
        let json = r#"{"event":"connected","payload":{"channels":["analysis"]}}"#;
        let event: ControlEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ControlEvent::Connected {
                channels: vec![Channel::Analysis]
            }
        );
    }

    #[test]
    fn test_to_frame_is_text() {
        let frame = to_frame(&ControlEvent::connected()).expect("frame");
        assert!(matches!(frame, Message::Text(ref t) if t.starts_with('{')));
    }
}
