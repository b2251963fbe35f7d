//! Playback hub
//!
//! Owns the authoritative [`CommandProcessor`] and fans out every accepted
//! event and every beacon to subscribers (push connections, the local surface
//! mirror). Subscribers receive messages in revision order.

use mediasync_core::{
    Beacon, BeaconConfig, Clock, ClockBeacon, Command, CommandProcessor, EventSink,
    MediaInspector, NoInspector, PlaybackEvent, PlaybackState, SyncError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::protocol::StatusSnapshot;

/// Default number of buffered messages per subscriber
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Message fanned out to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Accepted command
    Event(PlaybackEvent),
    /// Clock beacon
    Beacon(Beacon),
}

/// Publishes processor events onto the hub channel
struct BroadcastSink {
    tx: broadcast::Sender<HubMessage>,
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: &PlaybackEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(HubMessage::Event(event.clone()));
    }
}

/// Authoritative playback hub
pub struct PlaybackHub {
    processor: CommandProcessor,
    beacon: ClockBeacon,
    inspector: Arc<dyn MediaInspector>,
    tx: broadcast::Sender<HubMessage>,
    clients: Arc<AtomicUsize>,
}

impl PlaybackHub {
    /// Create a hub in the unloaded state
    pub fn new(clock: Arc<dyn Clock>, beacon: &BeaconConfig) -> Self {
        Self::with_capacity(clock, beacon, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a hub with a custom per-subscriber buffer
    pub fn with_capacity(clock: Arc<dyn Clock>, beacon: &BeaconConfig, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let sink = Arc::new(BroadcastSink { tx: tx.clone() });
        Self {
            processor: CommandProcessor::new(clock, sink),
            beacon: ClockBeacon::from(beacon),
            inspector: Arc::new(NoInspector),
            tx,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use `inspector` to report media durations
    pub fn with_inspector(mut self, inspector: Arc<dyn MediaInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Apply a command and broadcast its event
    pub fn submit(&self, command: Command, based_on: Option<u64>) -> Result<PlaybackEvent, SyncError> {
        self.processor.submit_based_on(command, based_on)
    }

    /// Current authoritative state
    pub fn state(&self) -> PlaybackState {
        self.processor.snapshot()
    }

    /// Status snapshot with position and duration resolved at the server clock
    pub fn snapshot(&self) -> StatusSnapshot {
        let (state, now) = self.processor.snapshot_now();
        let duration = state.media.as_ref().and_then(|m| self.inspector.duration(m));
        StatusSnapshot::from_state(&state, now, duration)
    }

    /// Sample a beacon and broadcast it
    pub fn emit_beacon(&self) -> Beacon {
        let (state, now) = self.processor.snapshot_now();
        let beacon = self.beacon.sample(&state, now);
        trace!(
            "Beacon rev {} pos {:.3} ({})",
            beacon.revision,
            beacon.media_pos,
            beacon.status
        );
        let _ = self.tx.send(HubMessage::Beacon(beacon));
        beacon
    }

    /// Beacon period
    pub fn beacon_interval(&self) -> Duration {
        self.beacon.interval()
    }

    /// Receive every message broadcast from now on
    pub fn subscribe(&self) -> broadcast::Receiver<HubMessage> {
        self.tx.subscribe()
    }

    /// Server wall clock
    pub fn now(&self) -> f64 {
        self.processor.now()
    }

    /// Register a push connection; dropping the guard unregisters it
    pub fn client_connected(&self) -> ClientGuard {
        let count = self.clients.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Push client connected ({} total)", count);
        ClientGuard {
            clients: self.clients.clone(),
        }
    }

    /// Number of open push connections
    pub fn connected_clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }
}

/// Keeps a push connection counted while alive
pub struct ClientGuard {
    clients: Arc<AtomicUsize>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let remaining = self.clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!("Push client disconnected ({} remaining)", remaining);
    }
}
