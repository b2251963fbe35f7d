//! Push-channel follower

use futures::{SinkExt, StreamExt};
use mediasync_core::{Clock, OffsetEstimator, PlaybackSurface, ReconcileAction, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::FollowerConfig;
use crate::error::ControlError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::Result;

/// Follower fed by the WebSocket push channel
///
/// Optionally forwards local commands to the server over the same
/// connection.
pub struct PushFollower {
    url: String,
    display_url: String,
    reconnect_delay: Duration,
    clock: Arc<dyn Clock>,
    reconciler: Reconciler,
    offset: OffsetEstimator,
    surface: Box<dyn PlaybackSurface>,
    client_id: Option<Uuid>,
}

impl PushFollower {
    /// Follow the server `config` points at, driving `surface`
    pub fn new(config: &FollowerConfig, clock: Arc<dyn Clock>, surface: Box<dyn PlaybackSurface>) -> Self {
        Self {
            url: config.ws_url(),
            display_url: format!("{}/ws", config.base_url()),
            reconnect_delay: config.reconnect_delay(),
            clock,
            reconciler: Reconciler::new(config.reconciler_config()),
            offset: OffsetEstimator::default(),
            surface,
            client_id: None,
        }
    }

    /// Connect once and follow until shutdown or disconnect
    ///
    /// Returns `Ok` on shutdown and [`ControlError::TransportUnavailable`]
    /// when the connection fails or drops, so the caller can restart it.
    pub async fn run(
        &mut self,
        outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ControlError::TransportUnavailable(format!("{}: {}", self.display_url, e)))?;
        info!("Connected to {}", self.display_url);
        // The server may have restarted with a fresh revision counter
        self.reconciler.reset_revision();

        let (mut write, mut read) = stream.split();
        let mut outbound_open = true;

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match ServerMessage::parse(&text) {
                        Ok(message) => {
                            for action in self.handle_message(message) {
                                debug!("Push follower: {}", action);
                            }
                        }
                        Err(e) => warn!("Ignoring server frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(ControlError::TransportUnavailable(
                            "server closed the connection".to_string(),
                        ));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ControlError::TransportUnavailable(e.to_string())),
                },
                command = outbound.recv(), if outbound_open => match command {
                    Some(message) => {
                        let text = message.to_text()?;
                        write
                            .send(Message::Text(text))
                            .await
                            .map_err(|e| ControlError::TransportUnavailable(e.to_string()))?;
                    }
                    None => outbound_open = false,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Follow until shutdown, reconnecting after every drop
    pub async fn run_reconnecting(
        &mut self,
        mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            match self.run(&mut outbound, &mut shutdown).await {
                Ok(()) => break,
                Err(e) => warn!(
                    "Push channel lost ({}), reconnecting in {:?}",
                    e, self.reconnect_delay
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Push follower stopped");
    }

    /// Apply one server message to the local surface
    pub fn handle_message(&mut self, message: ServerMessage) -> Vec<ReconcileAction> {
        let local_now = self.clock.now();
        match message {
            ServerMessage::Hello { client_id, .. } => {
                info!("Server assigned client id {}", client_id);
                self.client_id = Some(client_id);
                self.reconciler.reset_revision();
                Vec::new()
            }
            ServerMessage::State(snapshot) => {
                self.offset.observe(&snapshot.as_beacon(), local_now);
                let server_now = self.offset.to_server_time(local_now);
                self.reconciler
                    .apply(&snapshot.target_view(server_now), self.surface.as_mut())
            }
            ServerMessage::Event(event) => {
                let server_now = self.offset.to_server_time(local_now);
                self.reconciler
                    .apply_event(&event, server_now, self.surface.as_mut())
            }
            ServerMessage::Beacon(beacon) => {
                self.offset.observe(&beacon, local_now);
                let server_now = self.offset.to_server_time(local_now);
                self.reconciler
                    .apply_beacon(&beacon, server_now, self.surface.as_mut())
            }
            ServerMessage::Error {
                event,
                code,
                message,
            } => {
                warn!("Server rejected {}: {} ({})", event, message, code);
                Vec::new()
            }
        }
    }

    /// Id the server assigned on the current connection
    pub fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    /// Local status line
    pub fn local_status(&self) -> &str {
        self.reconciler.local_status()
    }

    /// Reconciler state
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Surface being driven
    pub fn surface(&self) -> &dyn PlaybackSurface {
        self.surface.as_ref()
    }

    /// Estimated server clock offset
    pub fn offset(&self) -> Option<f64> {
        self.offset.offset()
    }
}
