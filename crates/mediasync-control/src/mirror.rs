//! Server-side surface mirror
//!
//! Drives a local [`PlaybackSurface`] (a projector, a speaker output) from
//! the hub, exactly like a remote follower would but without a network hop.

use mediasync_core::{PlaybackSurface, Reconciler, ReconcilerConfig};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::{HubMessage, PlaybackHub};

/// Follows the hub onto a local surface
pub struct SurfaceMirror {
    hub: Arc<PlaybackHub>,
    rx: broadcast::Receiver<HubMessage>,
    reconciler: Reconciler,
    surface: Box<dyn PlaybackSurface>,
}

impl SurfaceMirror {
    /// Mirror `hub` onto `surface`
    pub fn new(hub: Arc<PlaybackHub>, surface: Box<dyn PlaybackSurface>, config: ReconcilerConfig) -> Self {
        // Subscribe before the first snapshot so no event falls in between
        let rx = hub.subscribe();
        Self {
            hub,
            rx,
            reconciler: Reconciler::new(config),
            surface,
        }
    }

    /// Run until the hub goes away
    pub async fn run(mut self) {
        self.resync();
        info!("Surface mirror running");

        loop {
            match self.rx.recv().await {
                Ok(message) => self.handle(&message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Surface mirror lagged by {} messages, resyncing", skipped);
                    self.resync();
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Surface mirror stopped");
    }

    /// Run on the tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Current local status line
    pub fn local_status(&self) -> &str {
        self.reconciler.local_status()
    }

    fn handle(&mut self, message: &HubMessage) {
        let now = self.hub.now();
        let actions = match message {
            HubMessage::Event(event) => {
                self.reconciler
                    .apply_event(event, now, self.surface.as_mut())
            }
            HubMessage::Beacon(beacon) => {
                self.reconciler
                    .apply_beacon(beacon, now, self.surface.as_mut())
            }
        };
        for action in actions {
            debug!("Mirror: {}", action);
        }
    }

    fn resync(&mut self) {
        let snapshot = self.hub.snapshot();
        let target = snapshot.target_view(self.hub.now());
        self.reconciler.apply(&target, self.surface.as_mut());
    }
}
