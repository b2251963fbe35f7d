//! Command processing
//!
//! [`apply`] is the pure transition function of the playback state machine:
//!
//! ```text
//! unloaded ──load──▶ loaded-paused | playing
//! loaded-paused | paused ──play──▶ playing ──pause──▶ paused
//! seek: self-transition in any loaded state
//! load: accepted from every state
//! ```
//!
//! [`CommandProcessor`] owns the single authoritative [`PlaybackState`] and
//! serializes every read-modify-write behind one lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::state::{MediaRef, MediaType, PlaybackState, PositionAnchor, TransportStatus};
use crate::{Result, SyncError};

/// A control command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the current media
    Load {
        /// Media URL
        url: String,
        /// Audio or video
        media_type: MediaType,
        /// Start playing immediately
        autoplay: bool,
    },
    /// Start or resume playback
    Play,
    /// Pause playback
    Pause,
    /// Move the position to `time` seconds
    Seek {
        /// Target position in seconds
        time: f64,
    },
}

impl Command {
    /// Build a load command from loosely typed transport input
    ///
    /// A missing media type means video and a missing autoplay flag means
    /// `true`, matching what browser clients have always sent.
    pub fn load(url: impl Into<String>, media_type: Option<&str>, autoplay: Option<bool>) -> Result<Self> {
        let media_type = match media_type {
            Some(raw) => raw.parse()?,
            None => MediaType::default(),
        };
        Ok(Command::Load {
            url: url.into(),
            media_type,
            autoplay: autoplay.unwrap_or(true),
        })
    }

    /// Which kind of command this is
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Load { .. } => CommandKind::Load,
            Command::Play => CommandKind::Play,
            Command::Pause => CommandKind::Pause,
            Command::Seek { .. } => CommandKind::Seek,
        }
    }
}

/// Command discriminant, named after its push-channel event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// `media:load`
    #[serde(rename = "media:load")]
    Load,
    /// `media:play`
    #[serde(rename = "media:play")]
    Play,
    /// `media:pause`
    #[serde(rename = "media:pause")]
    Pause,
    /// `media:seek`
    #[serde(rename = "media:seek")]
    Seek,
}

impl CommandKind {
    /// Push-channel event name
    pub fn event_name(&self) -> &'static str {
        match self {
            CommandKind::Load => "media:load",
            CommandKind::Play => "media:play",
            CommandKind::Pause => "media:pause",
            CommandKind::Seek => "media:seek",
        }
    }
}

/// Changelog entry produced by every accepted command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEvent {
    /// Command that produced the event
    pub kind: CommandKind,
    /// State after the command
    pub state: PlaybackState,
    /// Revision after the command (same as `state.revision`)
    pub revision: u64,
    /// Wall-clock time the command was applied
    pub server_ts: f64,
    /// Autoplay flag of a load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
    /// Clamped target of a seek
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

impl PlaybackEvent {
    /// Authoritative position at wall-clock `now`
    pub fn position_at(&self, now: f64) -> f64 {
        self.state.current_position(now)
    }
}

/// Apply `command` to `state` at wall-clock `now`
///
/// Returns the next state and its event, or a rejection. The input state is
/// never modified.
pub fn apply(
    state: &PlaybackState,
    command: &Command,
    now: f64,
) -> Result<(PlaybackState, PlaybackEvent)> {
    let mut next = state.clone();
    let mut autoplay = None;
    let mut time = None;

    match command {
        Command::Load {
            url,
            media_type,
            autoplay: start,
        } => {
            let url = url.trim();
            if url.is_empty() {
                return Err(SyncError::InvalidArgument("url must not be empty".to_string()));
            }
            next.media = Some(MediaRef::new(url, *media_type));
            next.anchor = PositionAnchor::new(now, 0.0);
            next.status = if *start {
                TransportStatus::Playing
            } else {
                TransportStatus::LoadedPaused
            };
            autoplay = Some(*start);
        }
        Command::Play => {
            require_media(state)?;
            match state.status {
                TransportStatus::LoadedPaused | TransportStatus::Paused => {
                    next.anchor = PositionAnchor::new(now, state.current_position(now));
                    next.status = TransportStatus::Playing;
                }
                // Already playing: keep the anchor
                _ => {}
            }
        }
        Command::Pause => {
            require_media(state)?;
            if state.status == TransportStatus::Playing {
                next.anchor = PositionAnchor::new(now, state.current_position(now));
                next.status = TransportStatus::Paused;
            }
        }
        Command::Seek { time: target } => {
            require_media(state)?;
            if !target.is_finite() {
                return Err(SyncError::InvalidArgument(format!(
                    "seek time must be a finite number of seconds, got {}",
                    target
                )));
            }
            next.anchor = PositionAnchor::new(now, *target);
            time = Some(next.anchor.media_position);
        }
    }

    next.revision = state.revision + 1;
    let event = PlaybackEvent {
        kind: command.kind(),
        state: next.clone(),
        revision: next.revision,
        server_ts: now,
        autoplay,
        time,
    };
    Ok((next, event))
}

fn require_media(state: &PlaybackState) -> Result<()> {
    if state.is_loaded() {
        Ok(())
    } else {
        Err(SyncError::NoMediaLoaded)
    }
}

/// Receiver of accepted command events
///
/// `publish` runs while the processor lock is held, so events arrive in
/// revision order. Implementations must not block.
pub trait EventSink: Send + Sync {
    /// Deliver one accepted event
    fn publish(&self, event: &PlaybackEvent);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &PlaybackEvent) {}
}

/// Owner of the authoritative [`PlaybackState`]
pub struct CommandProcessor {
    state: Mutex<PlaybackState>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl CommandProcessor {
    /// Create a processor in the unloaded state
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: Mutex::new(PlaybackState::new()),
            clock,
            sink,
        }
    }

    /// Apply a command in server arrival order
    pub fn submit(&self, command: Command) -> Result<PlaybackEvent> {
        self.submit_based_on(command, None)
    }

    /// Apply a command, optionally guarded by the revision the sender last saw
    ///
    /// With `based_on` set the command is only accepted if no other command
    /// was accepted since that revision.
    pub fn submit_based_on(&self, command: Command, based_on: Option<u64>) -> Result<PlaybackEvent> {
        let mut state = self.state.lock();

        if let Some(seen) = based_on {
            if seen < state.revision {
                debug!(
                    "Rejecting {} based on stale revision {} (current {})",
                    command.kind().event_name(),
                    seen,
                    state.revision
                );
                return Err(SyncError::StaleRevision {
                    based_on: seen,
                    current: state.revision,
                });
            }
            if seen > state.revision {
                return Err(SyncError::InvalidArgument(format!(
                    "revision {} has not been issued yet (current {})",
                    seen, state.revision
                )));
            }
        }

        let now = self.clock.now();
        match apply(&state, &command, now) {
            Ok((next, event)) => {
                *state = next;
                match &command {
                    Command::Load { .. } => info!(
                        "Loaded {:?} as {} (rev {})",
                        state.media.as_ref().map(|m| m.url.as_str()),
                        state.status,
                        state.revision
                    ),
                    _ => debug!(
                        "{} accepted: {} at {:.3}s (rev {})",
                        event.kind.event_name(),
                        state.status,
                        state.anchor.media_position,
                        state.revision
                    ),
                }
                self.sink.publish(&event);
                Ok(event)
            }
            Err(e) => {
                debug!("{} rejected: {}", command.kind().event_name(), e);
                Err(e)
            }
        }
    }

    /// Load media
    pub fn load(&self, url: impl Into<String>, media_type: MediaType, autoplay: bool) -> Result<PlaybackEvent> {
        self.submit(Command::Load {
            url: url.into(),
            media_type,
            autoplay,
        })
    }

    /// Start or resume playback
    pub fn play(&self) -> Result<PlaybackEvent> {
        self.submit(Command::Play)
    }

    /// Pause playback
    pub fn pause(&self) -> Result<PlaybackEvent> {
        self.submit(Command::Pause)
    }

    /// Seek to `time` seconds
    pub fn seek(&self, time: f64) -> Result<PlaybackEvent> {
        self.submit(Command::Seek { time })
    }

    /// Consistent copy of the whole state
    pub fn snapshot(&self) -> PlaybackState {
        self.state.lock().clone()
    }

    /// Consistent copy of the state together with the time it was read
    pub fn snapshot_now(&self) -> (PlaybackState, f64) {
        let state = self.state.lock();
        (state.clone(), self.clock.now())
    }

    /// Current wall-clock time of the processor's clock
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// The processor's clock
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn loaded(status: TransportStatus, anchor: PositionAnchor) -> PlaybackState {
        PlaybackState {
            media: Some(MediaRef::new("http://x/a.mp4", MediaType::Video)),
            status,
            anchor,
            revision: 7,
        }
    }

    #[test]
    fn test_load_autoplay() {
        let (next, event) = apply(
            &PlaybackState::new(),
            &Command::load("http://x/a.mp4", Some("video"), Some(true)).unwrap(),
            50.0,
        )
        .unwrap();
        assert_eq!(next.status, TransportStatus::Playing);
        assert_eq!(next.anchor, PositionAnchor::new(50.0, 0.0));
        assert_eq!(next.revision, 1);
        assert_eq!(event.kind, CommandKind::Load);
        assert_eq!(event.autoplay, Some(true));
    }

    #[test]
    fn test_load_without_autoplay_is_loaded_paused() {
        let (next, _) = apply(
            &PlaybackState::new(),
            &Command::load("http://x/a.mp3", Some("audio"), Some(false)).unwrap(),
            1.0,
        )
        .unwrap();
        assert_eq!(next.status, TransportStatus::LoadedPaused);
        assert_eq!(next.media.unwrap().media_type, MediaType::Audio);
    }

    #[test]
    fn test_load_defaults() {
        let command = Command::load("http://x/a.mp4", None, None).unwrap();
        assert_eq!(
            command,
            Command::Load {
                url: "http://x/a.mp4".to_string(),
                media_type: MediaType::Video,
                autoplay: true,
            }
        );
    }

    #[test]
    fn test_load_rejects_blank_url() {
        let state = PlaybackState::new();
        let result = apply(&state, &Command::load("   ", None, None).unwrap(), 1.0);
        assert!(matches!(result, Err(SyncError::InvalidArgument(_))));
    }

    #[test]
    fn test_load_rejects_unknown_type() {
        assert!(matches!(
            Command::load("http://x/a", Some("gif"), None),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reload_resets_anchor() {
        let state = loaded(TransportStatus::Playing, PositionAnchor::new(0.0, 40.0));
        let (next, _) = apply(
            &state,
            &Command::load("http://x/b.mp4", None, Some(false)).unwrap(),
            100.0,
        )
        .unwrap();
        assert_eq!(next.anchor, PositionAnchor::new(100.0, 0.0));
        assert_eq!(next.status, TransportStatus::LoadedPaused);
        assert_eq!(next.media.unwrap().url, "http://x/b.mp4");
    }

    #[test]
    fn test_controls_require_media() {
        let state = PlaybackState::new();
        for command in [Command::Play, Command::Pause, Command::Seek { time: 3.0 }] {
            assert_eq!(apply(&state, &command, 1.0), Err(SyncError::NoMediaLoaded));
        }
    }

    #[test]
    fn test_play_while_playing_keeps_anchor() {
        let state = loaded(TransportStatus::Playing, PositionAnchor::new(10.0, 5.0));
        let (next, event) = apply(&state, &Command::Play, 20.0).unwrap();
        assert_eq!(next.anchor, state.anchor);
        assert_eq!(next.status, TransportStatus::Playing);
        assert_eq!(event.revision, 8);
    }

    #[test]
    fn test_pause_when_not_playing_is_noop() {
        let state = loaded(TransportStatus::LoadedPaused, PositionAnchor::new(10.0, 0.0));
        let (next, _) = apply(&state, &Command::Pause, 20.0).unwrap();
        assert_eq!(next.status, TransportStatus::LoadedPaused);
        assert_eq!(next.anchor, state.anchor);
        assert_eq!(next.revision, 8);
    }

    #[test]
    fn test_seek_keeps_status() {
        let state = loaded(TransportStatus::Playing, PositionAnchor::new(10.0, 5.0));
        let (next, event) = apply(&state, &Command::Seek { time: 42.5 }, 12.0).unwrap();
        assert_eq!(next.status, TransportStatus::Playing);
        assert_eq!(next.anchor, PositionAnchor::new(12.0, 42.5));
        assert_eq!(event.time, Some(42.5));
    }

    #[test]
    fn test_seek_clamps_negative() {
        let state = loaded(TransportStatus::Paused, PositionAnchor::new(10.0, 5.0));
        let (next, event) = apply(&state, &Command::Seek { time: -4.0 }, 12.0).unwrap();
        assert_eq!(next.anchor.media_position, 0.0);
        assert_eq!(event.time, Some(0.0));
    }

    #[test]
    fn test_seek_rejects_nan() {
        let state = loaded(TransportStatus::Paused, PositionAnchor::new(10.0, 5.0));
        assert!(matches!(
            apply(&state, &Command::Seek { time: f64::NAN }, 12.0),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_processor_revision_guard() {
        let clock = Arc::new(ManualClock::new(0.0));
        let processor = CommandProcessor::new(clock, Arc::new(NullSink));
        processor.load("http://x/a.mp4", MediaType::Video, false).unwrap();

        assert!(processor.submit_based_on(Command::Play, Some(1)).is_ok());
        assert_eq!(
            processor.submit_based_on(Command::Pause, Some(1)),
            Err(SyncError::StaleRevision {
                based_on: 1,
                current: 2
            })
        );
        assert!(matches!(
            processor.submit_based_on(Command::Pause, Some(9)),
            Err(SyncError::InvalidArgument(_))
        ));
        assert_eq!(processor.snapshot().revision, 2);
    }
}
