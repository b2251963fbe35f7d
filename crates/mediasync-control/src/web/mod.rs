//! REST gateway and WebSocket push channel

pub mod auth;
pub mod response;
pub mod routes;
pub mod server;
pub mod websocket;

pub use auth::AuthConfig;
pub use server::{AppState, WebServer, WebServerConfig, WS_PATH};
