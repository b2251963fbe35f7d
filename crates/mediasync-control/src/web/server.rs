//! Axum HTTP server

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use super::auth::{extract_api_key, AuthConfig};
use super::routes::build_router;
use super::websocket::ws_handler;
use crate::hub::PlaybackHub;
use crate::{error::ControlError, Result};

/// Path of the push channel
pub const WS_PATH: &str = "/ws";

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Authoritative playback hub
    pub hub: Arc<PlaybackHub>,
    /// API key configuration
    pub auth: Arc<RwLock<AuthConfig>>,
}

/// Web server configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WebServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Add CORS headers
    pub enable_cors: bool,
    /// Allowed origins, `*` for any
    pub allowed_origins: Vec<String>,
    /// API key authentication
    pub auth: AuthConfig,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            // Bind to localhost unless told otherwise
            host: "127.0.0.1".to_string(),
            port: 5000,
            enable_cors: true,
            allowed_origins: default_allowed_origins(),
            auth: AuthConfig::new(),
        }
    }
}

impl WebServerConfig {
    /// Create a new web server config
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the host address
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set CORS enabled/disabled
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set allowed origins for CORS
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Set authentication config
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ControlError::HttpError(format!("Invalid address: {}", e)))
    }
}

/// Web server for the REST gateway and the push channel
pub struct WebServer {
    config: WebServerConfig,
    hub: Arc<PlaybackHub>,
}

impl WebServer {
    /// Create a new web server serving `hub`
    pub fn new(config: WebServerConfig, hub: Arc<PlaybackHub>) -> Self {
        Self { config, hub }
    }

    /// Build the complete application
    pub fn router(&self) -> Result<Router> {
        let state = AppState {
            hub: self.hub.clone(),
            auth: Arc::new(RwLock::new(self.config.auth.clone())),
        };

        let app = build_router()
            .route(WS_PATH, axum::routing::get(ws_handler))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            ))
            .layer(middleware::from_fn(security_headers))
            .with_state(state);

        if !self.config.enable_cors {
            return Ok(app);
        }

        let cors_layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::HeaderName::from_static("x-api-key"),
            ]);

        if self.config.allowed_origins.iter().any(|o| o == "*")
            || self.config.allowed_origins.is_empty()
        {
            Ok(app.layer(cors_layer.allow_origin(Any)))
        } else {
            let origins = self
                .config
                .allowed_origins
                .iter()
                .map(|o| {
                    o.parse::<HeaderValue>().map_err(|e| {
                        ControlError::HttpError(format!("Invalid origin header: {}", e))
                    })
                })
                .collect::<Result<Vec<HeaderValue>>>()?;
            Ok(app.layer(cors_layer.allow_origin(origins)))
        }
    }

    /// Run until the process is terminated
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` completes, then drain open requests
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let app = self.router()?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::HttpError(format!("Failed to bind {}: {}", addr, e)))?;
        tracing::info!("Web server listening on {}", addr);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ControlError::HttpError(format!("Server error: {}", e)))?;

        tracing::info!("Web server stopped");
        Ok(())
    }

    /// Spawn the server in a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Authentication middleware
///
/// WebSocket upgrades may pass the key as a query parameter since browsers
/// cannot set headers on them.
async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> core::result::Result<Response, StatusCode> {
    let auth_config = state.auth.read().await;

    if auth_config.is_enabled() {
        let allow_query = req.uri().path() == WS_PATH;
        let api_key = extract_api_key(req.headers(), req.uri().query(), allow_query);
        let is_valid = match api_key {
            Some(key) => auth_config.validate(&key),
            None => false,
        };

        if !is_valid {
            tracing::debug!("Rejected unauthenticated request to {}", req.uri().path());
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    drop(auth_config);

    Ok(next.run(req).await)
}

/// Security headers middleware
async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    response
}
