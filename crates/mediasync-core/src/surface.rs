//! Playback surface capability
//!
//! A surface is whatever actually renders the media: a browser element, a
//! system player, or the simulated [`VirtualSurface`]. Every call may fail;
//! callers treat failures as local and never escalate them.

use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::state::MediaRef;

/// Failure reported by a playback surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// The surface refused the operation (e.g. autoplay policy)
    #[error("rejected: {0}")]
    Rejected(String),

    /// The surface is not ready or has gone away
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Local media playback capability
pub trait PlaybackSurface: Send {
    /// Replace the current media; position restarts at zero
    fn load(&mut self, media: &MediaRef) -> Result<(), SurfaceError>;
    /// Start playback
    fn play(&mut self) -> Result<(), SurfaceError>;
    /// Pause playback
    fn pause(&mut self) -> Result<(), SurfaceError>;
    /// Jump to `seconds`
    fn seek_to(&mut self, seconds: f64) -> Result<(), SurfaceError>;
    /// Local position in seconds, `None` when unknown
    fn current_time(&self) -> Option<f64>;
}

/// Simulated player driven by a clock
///
/// Used by the command-line follower and the server-side mirror when no real
/// player is attached, and by tests.
pub struct VirtualSurface {
    clock: Arc<dyn Clock>,
    media: Option<MediaRef>,
    playing: bool,
    position: f64,
    since: f64,
    autoplay_blocked: bool,
}

impl VirtualSurface {
    /// Create an empty surface
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let since = clock.now();
        Self {
            clock,
            media: None,
            playing: false,
            position: 0.0,
            since,
            autoplay_blocked: false,
        }
    }

    /// Reject every `play` call, like a browser without user activation
    pub fn with_autoplay_blocked(mut self) -> Self {
        self.autoplay_blocked = true;
        self
    }

    /// Lift the autoplay block
    pub fn allow_autoplay(&mut self) {
        self.autoplay_blocked = false;
    }

    /// Loaded media
    pub fn media(&self) -> Option<&MediaRef> {
        self.media.as_ref()
    }

    /// Whether the surface is playing
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn position_now(&self) -> f64 {
        if self.playing {
            self.position + (self.clock.now() - self.since).max(0.0)
        } else {
            self.position
        }
    }

    fn rebase(&mut self, position: f64) {
        self.position = position.max(0.0);
        self.since = self.clock.now();
    }
}

impl PlaybackSurface for VirtualSurface {
    fn load(&mut self, media: &MediaRef) -> Result<(), SurfaceError> {
        self.media = Some(media.clone());
        self.playing = false;
        self.rebase(0.0);
        Ok(())
    }

    fn play(&mut self) -> Result<(), SurfaceError> {
        if self.media.is_none() {
            return Err(SurfaceError::Unavailable("no media loaded".to_string()));
        }
        if self.autoplay_blocked {
            return Err(SurfaceError::Rejected(
                "playback requires user interaction".to_string(),
            ));
        }
        if !self.playing {
            let position = self.position_now();
            self.rebase(position);
            self.playing = true;
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SurfaceError> {
        let position = self.position_now();
        self.rebase(position);
        self.playing = false;
        Ok(())
    }

    fn seek_to(&mut self, seconds: f64) -> Result<(), SurfaceError> {
        if self.media.is_none() {
            return Err(SurfaceError::Unavailable("no media loaded".to_string()));
        }
        self.rebase(seconds);
        Ok(())
    }

    fn current_time(&self) -> Option<f64> {
        self.media.as_ref().map(|_| self.position_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state::MediaType;

    #[test]
    fn test_virtual_surface_advances_while_playing() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut surface = VirtualSurface::new(clock.clone());
        assert_eq!(surface.current_time(), None);

        surface
            .load(&MediaRef::new("http://x/a.mp4", MediaType::Video))
            .unwrap();
        surface.play().unwrap();
        clock.advance(3.0);
        assert_eq!(surface.current_time(), Some(3.0));

        surface.pause().unwrap();
        clock.advance(3.0);
        assert_eq!(surface.current_time(), Some(3.0));

        surface.seek_to(10.0).unwrap();
        assert_eq!(surface.current_time(), Some(10.0));
    }

    #[test]
    fn test_autoplay_block() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut surface = VirtualSurface::new(clock).with_autoplay_blocked();
        surface
            .load(&MediaRef::new("http://x/a.mp3", MediaType::Audio))
            .unwrap();
        assert!(matches!(surface.play(), Err(SurfaceError::Rejected(_))));
        assert!(!surface.is_playing());

        surface.allow_autoplay();
        assert!(surface.play().is_ok());
    }
}
