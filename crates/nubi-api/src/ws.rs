//! WebSocket subscriber endpoint
//!
//! Each connection registers a fanout sink; events arrive through a
//! bounded channel (per-sink FIFO) and are written out as JSON text
//! frames. Inbound messages carry `{"action": "reload" | "test" |
//! "get_status"}` and route back into the orchestrator.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
struct SubscriberMessage {
    action: String,
}

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_subscriber(socket, state))
}

async fn serve_subscriber(socket: WebSocket, state: Arc<AppState>) {
    let fanout = state.orchestrator.telemetry().fanout().clone();
    let (sink_id, mut events) = fanout.subscribe();

    // A freshly connected operator gets the full snapshot immediately.
    let snapshot = state.orchestrator.telemetry().snapshot_events().await;
    fanout.send_to(sink_id, snapshot);

    let (mut outbound, mut inbound) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to serialize event");
                    continue;
                }
            };
            if outbound.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = inbound.next().await {
        let message = match message {
            Ok(m) => m,
            Err(_) => break,
        };
        match message {
            Message::Text(text) => {
                let Ok(msg) = serde_json::from_str::<SubscriberMessage>(&text) else {
                    debug!("ignoring malformed subscriber message");
                    continue;
                };
                state
                    .orchestrator
                    .handle_subscriber_command(sink_id, &msg.action)
                    .await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    fanout.unsubscribe(sink_id);
    writer.abort();
}
