//! Push distribution over WebSocket
//!
//! Each connection gets a greeting, the current snapshot, then every hub
//! message in order. A connection that falls behind the hub buffer is sent a
//! fresh snapshot instead of the messages it missed, so one slow client never
//! holds up the others.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::server::AppState;
use crate::error::ControlError;
use crate::hub::{HubMessage, PlaybackHub};
use crate::protocol::{events, ClientMessage, ServerMessage};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<PlaybackHub>) {
    let (mut sender, mut receiver) = socket.split();
    let client_id = Uuid::new_v4();
    let _guard = hub.client_connected();
    info!("WebSocket client {} connected", client_id);

    // Subscribe before the snapshot so nothing falls in between
    let mut updates = hub.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let _ = direct_tx.send(ServerMessage::Hello {
        client_id,
        ts: hub.now(),
    });
    let _ = direct_tx.send(ServerMessage::State(hub.snapshot()));

    let send_hub = hub.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;

                direct = direct_rx.recv() => match direct {
                    Some(message) => message,
                    None => break,
                },
                update = updates.recv() => match update {
                    Ok(HubMessage::Event(event)) => ServerMessage::Event(event),
                    Ok(HubMessage::Beacon(beacon)) => ServerMessage::Beacon(beacon),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "WebSocket client {} lagged by {} messages, resending state",
                            client_id, skipped
                        );
                        ServerMessage::State(send_hub.snapshot())
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let text = match message.to_text() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {}: {}", message.event_name(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_text_message(&text, &hub, &direct_tx, client_id),
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket client {} error: {}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    info!("WebSocket client {} disconnected", client_id);
}

/// Handle a text frame from a client
///
/// Rejections go back to the sender only.
fn handle_text_message(
    text: &str,
    hub: &PlaybackHub,
    reply: &mpsc::UnboundedSender<ServerMessage>,
    client_id: Uuid,
) {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Unparsable message from {}: {}", client_id, e);
            let event = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_default();
            let _ = reply.send(ServerMessage::error(event, &e));
            return;
        }
    };

    match message {
        ClientMessage::Command { command, based_on } => {
            let kind = command.kind();
            if let Err(e) = hub.submit(command, based_on) {
                debug!("Rejected {} from {}: {}", kind.event_name(), client_id, e);
                let _ = reply.send(ServerMessage::error(kind.event_name(), &ControlError::from(e)));
            }
        }
        ClientMessage::BeaconRequest => {
            debug!("{} requested by {}", events::BEACON, client_id);
            hub.emit_beacon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasync_core::{BeaconConfig, ManualClock, MediaType};

    fn hub() -> Arc<PlaybackHub> {
        Arc::new(PlaybackHub::new(
            Arc::new(ManualClock::new(0.0)),
            &BeaconConfig::default(),
        ))
    }

    #[test]
    fn test_rejection_goes_to_sender() {
        let hub = hub();
        let mut broadcast = hub.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_text_message(r#"{"event":"media:play"}"#, &hub, &tx, Uuid::nil());

        match rx.try_recv().unwrap() {
            ServerMessage::Error { event, code, .. } => {
                assert_eq!(event, "media:play");
                assert_eq!(code, "no-media-loaded");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(broadcast.try_recv().is_err());
    }

    #[test]
    fn test_garbage_is_invalid_message() {
        let hub = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_text_message("{{{", &hub, &tx, Uuid::nil());

        match rx.try_recv().unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, "invalid-message"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_accepted_command_is_broadcast() {
        let hub = hub();
        let mut broadcast = hub.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_text_message(
            r#"{"event":"media:load","data":{"url":"http://x/a.mp3","mediaType":"audio"}}"#,
            &hub,
            &tx,
            Uuid::nil(),
        );

        assert!(rx.try_recv().is_err());
        match broadcast.try_recv().unwrap() {
            HubMessage::Event(event) => {
                assert_eq!(event.revision, 1);
                assert_eq!(
                    event.state.media.map(|m| m.media_type),
                    Some(MediaType::Audio)
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_client_beacon_is_rebroadcast() {
        let hub = hub();
        let mut broadcast = hub.subscribe();
        let (tx, _rx) = mpsc::unbounded_channel();

        handle_text_message(r#"{"event":"sync:beacon","data":{}}"#, &hub, &tx, Uuid::nil());

        assert!(matches!(broadcast.try_recv(), Ok(HubMessage::Beacon(_))));
    }
}
