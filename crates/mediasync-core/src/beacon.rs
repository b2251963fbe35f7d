//! Clock beacon and drift estimation
//!
//! The server periodically samples `(server_ts, media_pos)` from the
//! authoritative state. Clients use the samples to reconstruct the expected
//! position without depending on when command events were delivered, and to
//! estimate the offset between their clock and the server's.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::state::{PlaybackState, TransportStatus};

/// One beacon tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    /// Server wall clock at sampling time (epoch seconds)
    pub server_ts: f64,
    /// Authoritative media position at `server_ts`
    pub media_pos: f64,
    /// Revision the sample was taken from
    pub revision: u64,
    /// Transport status at `server_ts`
    pub status: TransportStatus,
}

impl Beacon {
    /// Expected media position at server time `server_now`
    pub fn projected_position(&self, server_now: f64) -> f64 {
        if self.status == TransportStatus::Playing {
            self.media_pos + (server_now - self.server_ts).max(0.0)
        } else {
            self.media_pos
        }
    }
}

/// Beacon timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BeaconConfig {
    /// Emit beacons at all
    pub enabled: bool,
    /// Interval between ticks in milliseconds
    pub interval_ms: u64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
        }
    }
}

impl BeaconConfig {
    /// Tick interval, never shorter than 10 ms
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(10))
    }
}

/// Samples beacons from the authoritative state
///
/// Read-only: sampling never mutates the state.
#[derive(Debug, Clone)]
pub struct ClockBeacon {
    interval: Duration,
}

impl ClockBeacon {
    /// Create a beacon with the given tick interval
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sample `state` at wall-clock `now`
    pub fn sample(&self, state: &PlaybackState, now: f64) -> Beacon {
        Beacon {
            server_ts: now,
            media_pos: state.current_position(now),
            revision: state.revision,
            status: state.status,
        }
    }
}

impl From<&BeaconConfig> for ClockBeacon {
    fn from(config: &BeaconConfig) -> Self {
        Self::new(config.interval())
    }
}

/// Estimates `server_clock - local_clock` from received beacons
///
/// Keeps a sliding window of offsets and averages it. A sample that jumps
/// further than `max_jump` from the current estimate (clock step, suspended
/// laptop) resets the window instead of being averaged in.
#[derive(Debug, Clone)]
pub struct OffsetEstimator {
    samples: VecDeque<f64>,
    window: usize,
    max_jump: f64,
}

impl OffsetEstimator {
    /// Default number of samples averaged
    pub const DEFAULT_WINDOW: usize = 8;
    /// Default reset threshold in seconds
    pub const DEFAULT_MAX_JUMP: f64 = 5.0;

    /// Create an estimator
    pub fn new(window: usize, max_jump: f64) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            max_jump,
        }
    }

    /// Record a beacon received at local time `local_now`
    pub fn observe(&mut self, beacon: &Beacon, local_now: f64) {
        let offset = beacon.server_ts - local_now;

        if let Some(current) = self.offset() {
            if (offset - current).abs() > self.max_jump {
                self.samples.clear();
            }
        }

        self.samples.push_back(offset);
        if self.samples.len() > self.window {
            self.samples.pop_front();
        }
    }

    /// Current offset estimate, `None` before the first beacon
    pub fn offset(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Convert a local timestamp into server time
    pub fn to_server_time(&self, local_now: f64) -> f64 {
        local_now + self.offset().unwrap_or(0.0)
    }

    /// Number of samples in the window
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Default for OffsetEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW, Self::DEFAULT_MAX_JUMP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MediaRef, MediaType, PositionAnchor};

    fn beacon(server_ts: f64) -> Beacon {
        Beacon {
            server_ts,
            media_pos: 0.0,
            revision: 1,
            status: TransportStatus::Playing,
        }
    }

    #[test]
    fn test_sample_reads_current_position() {
        let state = PlaybackState {
            media: Some(MediaRef::new("http://x/a.mp4", MediaType::Video)),
            status: TransportStatus::Playing,
            anchor: PositionAnchor::new(100.0, 30.0),
            revision: 4,
        };
        let sample = ClockBeacon::new(Duration::from_secs(1)).sample(&state, 102.5);
        assert_eq!(sample.server_ts, 102.5);
        assert_eq!(sample.media_pos, 32.5);
        assert_eq!(sample.revision, 4);
        assert_eq!(sample.status, TransportStatus::Playing);
    }

    #[test]
    fn test_projection() {
        let mut sample = beacon(10.0);
        sample.media_pos = 4.0;
        assert_eq!(sample.projected_position(12.0), 6.0);

        sample.status = TransportStatus::Paused;
        assert_eq!(sample.projected_position(12.0), 4.0);
    }

    #[test]
    fn test_offset_average() {
        let mut estimator = OffsetEstimator::new(4, 5.0);
        assert_eq!(estimator.offset(), None);

        estimator.observe(&beacon(101.0), 100.0);
        estimator.observe(&beacon(103.0), 101.0);
        assert_eq!(estimator.offset(), Some(1.5));
        assert_eq!(estimator.to_server_time(200.0), 201.5);
    }

    #[test]
    fn test_offset_window_slides() {
        let mut estimator = OffsetEstimator::new(2, 5.0);
        estimator.observe(&beacon(1.0), 0.0);
        estimator.observe(&beacon(3.0), 0.0);
        estimator.observe(&beacon(3.0), 0.0);
        assert_eq!(estimator.sample_count(), 2);
        assert_eq!(estimator.offset(), Some(3.0));
    }

    #[test]
    fn test_offset_jump_resets() {
        let mut estimator = OffsetEstimator::new(8, 5.0);
        estimator.observe(&beacon(1.0), 0.0);
        estimator.observe(&beacon(1.0), 0.0);
        estimator.observe(&beacon(60.0), 0.0);
        assert_eq!(estimator.sample_count(), 1);
        assert_eq!(estimator.offset(), Some(60.0));
    }

    #[test]
    fn test_interval_floor() {
        let config = BeaconConfig {
            enabled: true,
            interval_ms: 0,
        };
        assert_eq!(config.interval(), Duration::from_millis(10));
    }
}
