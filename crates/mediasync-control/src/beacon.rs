//! Periodic beacon broadcaster

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::hub::PlaybackHub;

/// Background task emitting a beacon every interval
///
/// The task is aborted when the handle is dropped.
pub struct BeaconTask {
    handle: JoinHandle<()>,
}

impl BeaconTask {
    /// Start broadcasting beacons for `hub`
    pub fn spawn(hub: Arc<PlaybackHub>) -> Self {
        let interval = hub.beacon_interval();
        info!("Beacon broadcaster started ({:?} interval)", interval);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                hub.emit_beacon();
            }
        });

        Self { handle }
    }

    /// Whether the task is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop broadcasting
    pub fn stop(self) {
        info!("Beacon broadcaster stopped");
    }
}

impl Drop for BeaconTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
