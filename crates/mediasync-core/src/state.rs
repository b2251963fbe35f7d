//! Authoritative playback state
//!
//! [`PlaybackState`] is the single record every client converges toward.
//! It is plain data; only [`crate::command::apply`] produces new values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::SyncError;

/// Kind of media element a client should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Audio-only stream
    Audio,
    /// Video stream
    #[default]
    Video,
}

impl MediaType {
    /// Wire name of the media type
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            other => Err(SyncError::InvalidArgument(format!(
                "unsupported media type '{}', expected 'audio' or 'video'",
                other
            ))),
        }
    }
}

/// Reference to the media every client should play
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    /// Media URL as handed to the playback surface
    pub url: String,
    /// Audio or video
    pub media_type: MediaType,
}

impl MediaRef {
    /// Create a media reference
    pub fn new(url: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            url: url.into(),
            media_type,
        }
    }
}

/// Transport status of the authoritative player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportStatus {
    /// Nothing loaded yet
    #[default]
    Unloaded,
    /// Media loaded without autoplay, never started
    LoadedPaused,
    /// Position advances with the wall clock
    Playing,
    /// Paused after having played
    Paused,
}

impl TransportStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Unloaded => "unloaded",
            TransportStatus::LoadedPaused => "loaded-paused",
            TransportStatus::Playing => "playing",
            TransportStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point from which the media position is extrapolated
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionAnchor {
    /// Wall-clock time (epoch seconds) the anchor was taken
    pub wall_clock: f64,
    /// Media position (seconds) at `wall_clock`; never negative
    pub media_position: f64,
}

impl PositionAnchor {
    /// Anchor `media_position` at `wall_clock`, clamping negative positions to zero
    pub fn new(wall_clock: f64, media_position: f64) -> Self {
        Self {
            wall_clock,
            media_position: media_position.max(0.0),
        }
    }
}

/// The authoritative playback record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Loaded media, absent until the first load
    pub media: Option<MediaRef>,
    /// Transport status
    pub status: TransportStatus,
    /// Timing anchor
    pub anchor: PositionAnchor,
    /// Number of accepted commands so far
    pub revision: u64,
}

impl PlaybackState {
    /// Fresh state: unloaded, revision 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Media position in seconds at wall-clock time `now`
    ///
    /// While playing the anchor is extrapolated; otherwise it is frozen.
    /// A wall clock that stepped backwards never moves the position below
    /// the anchor.
    pub fn current_position(&self, now: f64) -> f64 {
        match self.status {
            TransportStatus::Playing => {
                let elapsed = (now - self.anchor.wall_clock).max(0.0);
                self.anchor.media_position + elapsed
            }
            _ => self.anchor.media_position,
        }
    }

    /// Whether any media has been loaded
    pub fn is_loaded(&self) -> bool {
        self.media.is_some()
    }

    /// Whether the transport is running
    pub fn is_playing(&self) -> bool {
        self.status == TransportStatus::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = PlaybackState::new();
        assert_eq!(state.status, TransportStatus::Unloaded);
        assert!(state.media.is_none());
        assert_eq!(state.revision, 0);
        assert_eq!(state.current_position(1_000.0), 0.0);
    }

    #[test]
    fn test_position_extrapolates_only_while_playing() {
        let mut state = PlaybackState {
            media: Some(MediaRef::new("http://x/a.mp4", MediaType::Video)),
            status: TransportStatus::Playing,
            anchor: PositionAnchor::new(100.0, 30.0),
            revision: 2,
        };
        assert_eq!(state.current_position(105.0), 35.0);

        state.status = TransportStatus::Paused;
        assert_eq!(state.current_position(105.0), 30.0);
    }

    #[test]
    fn test_backwards_clock_does_not_rewind() {
        let state = PlaybackState {
            media: Some(MediaRef::new("http://x/a.mp3", MediaType::Audio)),
            status: TransportStatus::Playing,
            anchor: PositionAnchor::new(100.0, 10.0),
            revision: 1,
        };
        assert_eq!(state.current_position(90.0), 10.0);
    }

    #[test]
    fn test_anchor_clamps_negative() {
        let anchor = PositionAnchor::new(5.0, -3.0);
        assert_eq!(anchor.media_position, 0.0);
    }

    #[test]
    fn test_media_type_parse() {
        assert_eq!("audio".parse::<MediaType>().unwrap(), MediaType::Audio);
        assert_eq!(" Video ".parse::<MediaType>().unwrap(), MediaType::Video);
        assert!(matches!(
            "image".parse::<MediaType>(),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&TransportStatus::LoadedPaused).unwrap();
        assert_eq!(json, "\"loaded-paused\"");

        let media = MediaRef::new("http://x/a.mp4", MediaType::Video);
        let json = serde_json::to_string(&media).unwrap();
        assert!(json.contains("\"mediaType\":\"video\""));
    }
}
