//! MediaSync Core - Playback State Synchronization
//!
//! This crate contains the transport-independent part of MediaSync:
//! - Authoritative playback state and its position anchor
//! - Command processing (load / play / pause / seek state machine)
//! - Clock beacon sampling and client clock-offset estimation
//! - Client-side reconciliation onto a playback surface
//! - Logging configuration

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod beacon;
pub mod clock;
pub mod command;
pub mod inspect;
pub mod logging;
pub mod reconcile;
pub mod state;
pub mod surface;

// --- Re-exports grouped by category ---

// State & Commands
pub use command::{apply, Command, CommandKind, CommandProcessor, EventSink, NullSink, PlaybackEvent};
pub use state::{MediaRef, MediaType, PlaybackState, PositionAnchor, TransportStatus};

// Timing
pub use beacon::{Beacon, BeaconConfig, ClockBeacon, OffsetEstimator};
pub use clock::{Clock, ManualClock, SystemClock};

// Client side
pub use reconcile::{ReconcileAction, Reconciler, ReconcilerConfig, TargetView};
pub use surface::{PlaybackSurface, SurfaceError, VirtualSurface};

// Collaborators
pub use inspect::{DurationTable, MediaInspector, NoInspector};
pub use logging::LogConfig;

/// Protocol errors
///
/// All of them are local to the request that caused them: the state is left
/// untouched and nothing is broadcast.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncError {
    /// Malformed url, media type or time
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Control command issued before any load
    #[error("No media loaded")]
    NoMediaLoaded,

    /// A transport or collaborator is unreachable
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Command was based on a revision that has since been superseded
    #[error("Stale revision {based_on} (current is {current})")]
    StaleRevision {
        /// Revision the sender last saw
        based_on: u64,
        /// Revision at arrival
        current: u64,
    },
}

impl SyncError {
    /// Stable machine-readable error code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::InvalidArgument(_) => "invalid-argument",
            SyncError::NoMediaLoaded => "no-media-loaded",
            SyncError::TransportUnavailable(_) => "transport-unavailable",
            SyncError::StaleRevision { .. } => "stale-revision",
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, SyncError>;
