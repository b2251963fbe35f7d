//! Push-channel wire protocol
//!
//! Every WebSocket text frame is a JSON envelope `{"event": ..., "data": ...}`.
//! Event names are the contract shared with browser clients:
//!
//! | Direction | Event | Data |
//! |---|---|---|
//! | client → server | `media:load` | `{url, mediaType?, autoplay?, basedOn?}` |
//! | client → server | `media:play`, `media:pause` | `{basedOn?}` |
//! | client → server | `media:seek` | `{time, basedOn?}` |
//! | client → server | `sync:beacon` | ignored |
//! | server → client | `server:hello` | `{clientId, ts}` |
//! | server → client | `sync:state` | [`StatusSnapshot`] |
//! | server → client | `media:*` | `{revision, serverTs, state, url?, mediaType?, autoplay?, time?}` |
//! | server → client | `sync:beacon` | [`Beacon`] |
//! | server → client | `command:error` | `{event, code, message}` |
//!
//! The REST gateway bodies live here too so followers can use them without
//! the server feature.

use mediasync_core::{
    Beacon, Command, CommandKind, MediaRef, MediaType, PlaybackEvent, PlaybackState, SyncError,
    TargetView, TransportStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{error::ControlError, Result};

/// Event names
pub mod events {
    /// Greeting sent on connect
    pub const HELLO: &str = "server:hello";
    /// Full snapshot
    pub const STATE: &str = "sync:state";
    /// Clock beacon
    pub const BEACON: &str = "sync:beacon";
    /// Rejection of one client's command
    pub const ERROR: &str = "command:error";
    /// Load command
    pub const LOAD: &str = "media:load";
    /// Play command
    pub const PLAY: &str = "media:play";
    /// Pause command
    pub const PAUSE: &str = "media:pause";
    /// Seek command
    pub const SEEK: &str = "media:seek";
}

/// Raw frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name
    pub event: String,
    /// Event payload
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ControlError::InvalidMessage(format!("Invalid JSON: {}", e)))
    }

    fn payload<T: for<'de> Deserialize<'de>>(self) -> Result<T> {
        // Clients may omit data or send null for commands without arguments
        let data = match self.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        serde_json::from_value(data)
            .map_err(|e| ControlError::InvalidMessage(format!("Invalid {} payload: {}", self.event, e)))
    }
}

/// Point-in-time view of the authoritative state
///
/// Served by `GET /api/status` and pushed as `sync:state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Transport status
    pub state: TransportStatus,
    /// Position in seconds at `server_ts`
    pub position: f64,
    /// Media duration if an inspector knows it
    pub duration: Option<f64>,
    /// Revision of the state
    pub revision: u64,
    /// Loaded media
    pub media: Option<MediaRef>,
    /// Server wall clock when the snapshot was taken
    pub server_ts: f64,
}

impl StatusSnapshot {
    /// Snapshot `state` at `now`
    pub fn from_state(state: &PlaybackState, now: f64, duration: Option<f64>) -> Self {
        Self {
            state: state.status,
            position: state.current_position(now),
            duration,
            revision: state.revision,
            media: state.media.clone(),
            server_ts: now,
        }
    }

    /// Position expected at server time `server_now`
    pub fn projected_position(&self, server_now: f64) -> f64 {
        self.as_beacon().projected_position(server_now)
    }

    /// Reconciler target at server time `server_now`
    pub fn target_view(&self, server_now: f64) -> TargetView {
        TargetView {
            status: self.state,
            media: self.media.clone(),
            position: self.projected_position(server_now),
            revision: self.revision,
        }
    }

    /// Timing part of the snapshot as a beacon sample
    pub fn as_beacon(&self) -> Beacon {
        Beacon {
            server_ts: self.server_ts,
            media_pos: self.position,
            revision: self.revision,
            status: self.state,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadPayload {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    autoplay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    based_on: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeekPayload {
    time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    based_on: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    based_on: Option<u64>,
}

// REST bodies

/// `POST /api/load` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    /// Media URL
    #[serde(default)]
    pub url: Option<String>,
    /// `audio` or `video`, defaults to video
    #[serde(default, rename = "type", alias = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Defaults to true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
    /// Revision guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<u64>,
}

impl LoadRequest {
    /// Validate and convert into a command
    pub fn into_command(self) -> std::result::Result<Command, SyncError> {
        let url = self
            .url
            .ok_or_else(|| SyncError::InvalidArgument("url is required".to_string()))?;
        Command::load(url, self.media_type.as_deref(), self.autoplay)
    }
}

/// `POST /api/seek` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekRequest {
    /// Target position in seconds
    #[serde(default)]
    pub time: Option<f64>,
    /// Revision guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<u64>,
}

impl SeekRequest {
    /// Validate and convert into a command
    pub fn into_command(self) -> std::result::Result<Command, SyncError> {
        match self.time {
            Some(time) => Ok(Command::Seek { time }),
            None => Err(SyncError::InvalidArgument("time is required".to_string())),
        }
    }
}

/// `POST /api/play` and `POST /api/pause` body, which may be empty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    /// Revision guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<u64>,
}

/// Accepted command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Always `ok`
    pub status: String,
    /// Revision after the command
    pub revision: u64,
}

impl CommandAck {
    /// Acknowledge `revision`
    pub fn ok(revision: u64) -> Self {
        Self {
            status: "ok".to_string(),
            revision,
        }
    }
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code
    pub error: String,
    /// Human-readable reason
    pub message: String,
}

impl From<&ControlError> for ErrorBody {
    fn from(error: &ControlError) -> Self {
        Self {
            error: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Message from a push client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// A playback command
    Command {
        /// The command
        command: Command,
        /// Revision the client last saw, if it wants the guard
        based_on: Option<u64>,
    },
    /// Ask the server for an immediate beacon
    BeaconRequest,
}

impl ClientMessage {
    /// Unguarded command
    pub fn command(command: Command) -> Self {
        ClientMessage::Command {
            command,
            based_on: None,
        }
    }

    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self> {
        let envelope = Envelope::parse(text)?;
        let event = envelope.event.clone();
        match event.as_str() {
            events::LOAD => {
                let payload: LoadPayload = envelope.payload()?;
                let command = Command::load(payload.url, payload.media_type.as_deref(), payload.autoplay)?;
                Ok(ClientMessage::Command {
                    command,
                    based_on: payload.based_on,
                })
            }
            events::PLAY | events::PAUSE => {
                let command = if event == events::PLAY {
                    Command::Play
                } else {
                    Command::Pause
                };
                let payload: ControlPayload = envelope.payload()?;
                Ok(ClientMessage::Command {
                    command,
                    based_on: payload.based_on,
                })
            }
            events::SEEK => {
                let payload: SeekPayload = envelope.payload()?;
                Ok(ClientMessage::Command {
                    command: Command::Seek { time: payload.time },
                    based_on: payload.based_on,
                })
            }
            events::BEACON => Ok(ClientMessage::BeaconRequest),
            other => Err(ControlError::InvalidMessage(format!("Unknown event '{}'", other))),
        }
    }

    /// Event name of the message
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Command { command, .. } => command.kind().event_name(),
            ClientMessage::BeaconRequest => events::BEACON,
        }
    }

    /// Encode as a text frame
    pub fn to_text(&self) -> Result<String> {
        let data = match self {
            ClientMessage::Command { command, based_on } => match command {
                Command::Load {
                    url,
                    media_type,
                    autoplay,
                } => serde_json::to_value(LoadPayload {
                    url: url.clone(),
                    media_type: Some(media_type.as_str().to_string()),
                    autoplay: Some(*autoplay),
                    based_on: *based_on,
                })?,
                Command::Play | Command::Pause => serde_json::to_value(ControlPayload {
                    based_on: *based_on,
                })?,
                Command::Seek { time } => serde_json::to_value(SeekPayload {
                    time: *time,
                    based_on: *based_on,
                })?,
            },
            ClientMessage::BeaconRequest => Value::Object(Default::default()),
        };
        Ok(serde_json::to_string(&Envelope {
            event: self.event_name().to_string(),
            data,
        })?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelloPayload {
    client_id: Uuid,
    ts: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    event: String,
    code: String,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    revision: u64,
    server_ts: f64,
    state: PlaybackState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_type: Option<MediaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    autoplay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<f64>,
}

/// Message from the server to push clients
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Greeting with the id assigned to the connection
    Hello {
        /// Connection id
        client_id: Uuid,
        /// Server wall clock
        ts: f64,
    },
    /// Full snapshot
    State(StatusSnapshot),
    /// Accepted command
    Event(PlaybackEvent),
    /// Clock beacon
    Beacon(Beacon),
    /// Rejection of this client's command
    Error {
        /// Event that was rejected
        event: String,
        /// Wire error code
        code: String,
        /// Human-readable reason
        message: String,
    },
}

impl ServerMessage {
    /// Rejection for `event`
    pub fn error(event: impl Into<String>, error: &ControlError) -> Self {
        ServerMessage::Error {
            event: event.into(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    /// Event name of the message
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Hello { .. } => events::HELLO,
            ServerMessage::State(_) => events::STATE,
            ServerMessage::Event(event) => event.kind.event_name(),
            ServerMessage::Beacon(_) => events::BEACON,
            ServerMessage::Error { .. } => events::ERROR,
        }
    }

    /// Encode as a text frame
    pub fn to_text(&self) -> Result<String> {
        let data = match self {
            ServerMessage::Hello { client_id, ts } => serde_json::to_value(HelloPayload {
                client_id: *client_id,
                ts: *ts,
            })?,
            ServerMessage::State(snapshot) => serde_json::to_value(snapshot)?,
            ServerMessage::Event(event) => {
                let media = event.state.media.as_ref().filter(|_| event.kind == CommandKind::Load);
                serde_json::to_value(EventPayload {
                    revision: event.revision,
                    server_ts: event.server_ts,
                    state: event.state.clone(),
                    url: media.map(|m| m.url.clone()),
                    media_type: media.map(|m| m.media_type),
                    autoplay: event.autoplay,
                    time: event.time,
                })?
            }
            ServerMessage::Beacon(beacon) => serde_json::to_value(beacon)?,
            ServerMessage::Error {
                event,
                code,
                message,
            } => serde_json::to_value(ErrorPayload {
                event: event.clone(),
                code: code.clone(),
                message: message.clone(),
            })?,
        };
        Ok(serde_json::to_string(&Envelope {
            event: self.event_name().to_string(),
            data,
        })?)
    }

    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self> {
        let envelope = Envelope::parse(text)?;
        let event = envelope.event.clone();
        let kind = match event.as_str() {
            events::HELLO => {
                let payload: HelloPayload = envelope.payload()?;
                return Ok(ServerMessage::Hello {
                    client_id: payload.client_id,
                    ts: payload.ts,
                });
            }
            events::STATE => return Ok(ServerMessage::State(envelope.payload()?)),
            events::BEACON => return Ok(ServerMessage::Beacon(envelope.payload()?)),
            events::ERROR => {
                let payload: ErrorPayload = envelope.payload()?;
                return Ok(ServerMessage::Error {
                    event: payload.event,
                    code: payload.code,
                    message: payload.message,
                });
            }
            events::LOAD => CommandKind::Load,
            events::PLAY => CommandKind::Play,
            events::PAUSE => CommandKind::Pause,
            events::SEEK => CommandKind::Seek,
            other => {
                return Err(ControlError::InvalidMessage(format!(
                    "Unknown event '{}'",
                    other
                )))
            }
        };

        let payload: EventPayload = envelope.payload()?;
        Ok(ServerMessage::Event(PlaybackEvent {
            kind,
            state: payload.state,
            revision: payload.revision,
            server_ts: payload.server_ts,
            autoplay: payload.autoplay,
            time: payload.time,
        }))
    }
}
