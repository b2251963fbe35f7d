//! Client-side reconciliation
//!
//! A [`Reconciler`] drives a local [`PlaybackSurface`] toward the
//! authoritative state. It reloads on media changes, mirrors play/pause
//! transitions, and only seeks when the local position has drifted further
//! than the configured tolerance, so small network jitter never causes
//! audible or visible stutter.
//!
//! The same reconciler serves push clients (events and beacons), poll
//! clients (status snapshots), and the server-side surface mirror.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::beacon::Beacon;
use crate::command::{CommandKind, PlaybackEvent};
use crate::state::{MediaRef, PlaybackState, TransportStatus};
use crate::surface::PlaybackSurface;

/// Reconciler tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Drift in seconds tolerated before a corrective seek
    pub tolerance_secs: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: 1.5,
        }
    }
}

/// Authoritative state as seen by one client at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct TargetView {
    /// Authoritative transport status
    pub status: TransportStatus,
    /// Authoritative media
    pub media: Option<MediaRef>,
    /// Authoritative position in seconds
    pub position: f64,
    /// Revision the view was derived from
    pub revision: u64,
}

impl TargetView {
    /// View of `state` at server time `server_now`
    pub fn from_state(state: &PlaybackState, server_now: f64) -> Self {
        Self {
            status: state.status,
            media: state.media.clone(),
            position: state.current_position(server_now),
            revision: state.revision,
        }
    }
}

/// Operation the reconciler attempted on the surface
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    /// Loaded new media
    Load(MediaRef),
    /// Started playback
    Play,
    /// Paused playback
    Pause,
    /// Corrective or explicit seek
    Seek(f64),
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileAction::Load(media) => write!(f, "load {} ({})", media.url, media.media_type),
            ReconcileAction::Play => f.write_str("play"),
            ReconcileAction::Pause => f.write_str("pause"),
            ReconcileAction::Seek(t) => write!(f, "seek to {:.3}s", t),
        }
    }
}

/// Maps authoritative state onto a local playback surface
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcilerConfig,
    media: Option<MediaRef>,
    playing: Option<bool>,
    revision: Option<u64>,
    local_status: String,
}

impl Reconciler {
    /// Create a reconciler that has applied nothing yet
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            media: None,
            playing: None,
            revision: None,
            local_status: "idle".to_string(),
        }
    }

    /// Human-readable outcome of the last surface operation
    pub fn local_status(&self) -> &str {
        &self.local_status
    }

    /// Last revision applied
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// Media the surface was last told to load
    pub fn media(&self) -> Option<&MediaRef> {
        self.media.as_ref()
    }

    /// Forget the applied revision
    ///
    /// Call when talking to a server that may not share the old revision
    /// history, e.g. after reconnecting. Media and transport memory stay.
    pub fn reset_revision(&mut self) {
        self.revision = None;
    }

    /// Reconcile against a snapshot (poll response or `sync:state`)
    ///
    /// Snapshots are complete, so one whose revision went backwards comes
    /// from a restarted server and replaces the watermark.
    pub fn apply(
        &mut self,
        target: &TargetView,
        surface: &mut dyn PlaybackSurface,
    ) -> Vec<ReconcileAction> {
        if let Some(applied) = self.revision {
            if target.revision < applied {
                info!(
                    "Snapshot revision {} is behind applied {}, assuming a restarted server",
                    target.revision, applied
                );
                self.reset_revision();
            }
        }
        self.reconcile(target, surface, Forced::default())
    }

    /// Reconcile against a pushed command event
    ///
    /// Explicit seeks and loads are honored even inside the tolerance, and
    /// play/pause events always reach the surface.
    pub fn apply_event(
        &mut self,
        event: &PlaybackEvent,
        server_now: f64,
        surface: &mut dyn PlaybackSurface,
    ) -> Vec<ReconcileAction> {
        let target = TargetView::from_state(&event.state, server_now);
        let forced = Forced {
            seek: matches!(event.kind, CommandKind::Seek | CommandKind::Load),
            transport: matches!(event.kind, CommandKind::Play | CommandKind::Pause),
        };
        self.reconcile(&target, surface, forced)
    }

    /// Reconcile position and status against a beacon
    ///
    /// Beacons carry no media reference, so only beacons from the revision
    /// already applied are used; a newer beacon waits for its event.
    pub fn apply_beacon(
        &mut self,
        beacon: &Beacon,
        server_now: f64,
        surface: &mut dyn PlaybackSurface,
    ) -> Vec<ReconcileAction> {
        if self.revision != Some(beacon.revision) {
            debug!(
                "Ignoring beacon for revision {} (applied {:?})",
                beacon.revision, self.revision
            );
            return Vec::new();
        }
        let target = TargetView {
            status: beacon.status,
            media: self.media.clone(),
            position: beacon.projected_position(server_now),
            revision: beacon.revision,
        };
        self.reconcile(&target, surface, Forced::default())
    }

    fn reconcile(
        &mut self,
        target: &TargetView,
        surface: &mut dyn PlaybackSurface,
        forced: Forced,
    ) -> Vec<ReconcileAction> {
        if let Some(applied) = self.revision {
            if target.revision < applied {
                debug!(
                    "Skipping stale target revision {} (applied {})",
                    target.revision, applied
                );
                return Vec::new();
            }
        }
        self.revision = Some(target.revision);

        let mut actions = Vec::new();
        let mut local_position = surface.current_time();

        if target.media != self.media {
            match &target.media {
                Some(media) => {
                    self.attempt(ReconcileAction::Load(media.clone()), surface, &mut actions);
                    local_position = Some(0.0);
                    self.playing = None;
                }
                None => {
                    self.playing = None;
                }
            }
            self.media = target.media.clone();
        }

        if self.media.is_none() {
            return actions;
        }

        let needs_seek = match local_position {
            Some(local) => forced.seek || (local - target.position).abs() > self.config.tolerance_secs,
            None => forced.seek,
        };
        if needs_seek {
            self.attempt(ReconcileAction::Seek(target.position), surface, &mut actions);
        }

        let want_playing = target.status == TransportStatus::Playing;
        if forced.transport || self.playing != Some(want_playing) {
            let action = if want_playing {
                ReconcileAction::Play
            } else {
                ReconcileAction::Pause
            };
            // A failed call leaves the transport unknown so the next target retries it
            self.playing = self
                .attempt(action, surface, &mut actions)
                .then_some(want_playing);
        }

        actions
    }

    fn attempt(
        &mut self,
        action: ReconcileAction,
        surface: &mut dyn PlaybackSurface,
        actions: &mut Vec<ReconcileAction>,
    ) -> bool {
        let result = match &action {
            ReconcileAction::Load(media) => surface.load(media),
            ReconcileAction::Play => surface.play(),
            ReconcileAction::Pause => surface.pause(),
            ReconcileAction::Seek(t) => surface.seek_to(*t),
        };

        let ok = result.is_ok();
        match result {
            Ok(()) => {
                debug!("Surface: {}", action);
                self.local_status = match &action {
                    ReconcileAction::Load(media) => format!("loaded {}", media.url),
                    ReconcileAction::Play => "playing".to_string(),
                    ReconcileAction::Pause => "paused".to_string(),
                    ReconcileAction::Seek(t) => format!("seeked to {:.1}s", t),
                };
            }
            Err(e) => {
                warn!("Surface {} failed: {}", action, e);
                self.local_status = format!("{} failed: {}", action, e);
            }
        }
        actions.push(action);
        ok
    }
}

/// Surface calls made regardless of the remembered local state
#[derive(Debug, Clone, Copy, Default)]
struct Forced {
    seek: bool,
    transport: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}
