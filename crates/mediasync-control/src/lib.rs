//! MediaSync Control - Network Surfaces
//!
//! This crate puts the playback state from `mediasync-core` on the network:
//! - **Hub**: the authoritative processor plus ordered fan-out to subscribers
//! - **Beacons**: periodic clock samples for follower drift correction
//! - **Web API**: REST gateway and WebSocket push channel
//! - **Followers**: poll and push clients that mirror the state onto a local surface
//! - **Mirror**: a server-side follower driving a local surface
//!
//! ## Feature Flags
//!
//! - `http-api`: Enable the REST gateway and push channel (requires `axum`)
//! - `client`: Enable the followers (requires `reqwest`, `tokio-tungstenite`)
//! - `full`: Enable all features
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediasync_control::{PlaybackHub, WebServer, WebServerConfig};
//! use mediasync_core::{BeaconConfig, SystemClock};
//! use std::sync::Arc;
//!
//! # async fn run() -> mediasync_control::Result<()> {
//! let hub = Arc::new(PlaybackHub::new(Arc::new(SystemClock), &BeaconConfig::default()));
//! WebServer::new(WebServerConfig::new(5000), hub).run().await
//! # }
//! ```

#![warn(missing_docs)]

/// Periodic beacon broadcaster
pub mod beacon;
/// Error types
pub mod error;
/// Authoritative hub and fan-out
pub mod hub;
/// Server-side surface mirror
pub mod mirror;
/// Push-channel wire protocol
pub mod protocol;

#[cfg(feature = "http-api")]
/// Web API server
pub mod web;

#[cfg(feature = "client")]
/// Poll and push followers
pub mod client;

// Re-exports
pub use beacon::BeaconTask;
pub use error::{ControlError, Result};
pub use hub::{HubMessage, PlaybackHub};
pub use mirror::SurfaceMirror;
pub use protocol::{
    ClientMessage, CommandAck, ErrorBody, LoadRequest, SeekRequest, ServerMessage, StatusSnapshot,
};

#[cfg(feature = "http-api")]
pub use web::{AuthConfig, WebServer, WebServerConfig};

#[cfg(feature = "client")]
pub use client::{FollowerConfig, FollowerMode, PollClient, PollFollower, PushFollower};
