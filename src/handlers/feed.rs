use crate::{models::FeedEvent, services::FeedCoordinator};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub async fn feed_websocket(ws: WebSocketUpgrade, State(coordinator): State<Arc<FeedCoordinator>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: Arc<FeedCoordinator>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = coordinator.subscribe();

    // current connectivity first, so clients need not wait for a transition
    let greeting = FeedEvent::Connection {
        connected: coordinator.is_connected(),
    };
    if let Ok(msg) = serde_json::to_string(&greeting) {
        if sender.send(Message::Text(msg)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagging, events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if let Ok(msg) = serde_json::to_string(&event) {
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}
