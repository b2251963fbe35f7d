//! REST client and polling follower

use mediasync_core::{
    Clock, MediaType, OffsetEstimator, PlaybackSurface, ReconcileAction, Reconciler,
};
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::FollowerConfig;
use crate::error::ControlError;
use crate::protocol::{CommandAck, ControlRequest, ErrorBody, LoadRequest, SeekRequest, StatusSnapshot};
use crate::Result;

/// Typed client for the REST gateway
#[derive(Clone)]
pub struct PollClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PollClient {
    /// Client for the server at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Client for the server a follower config points at
    pub fn from_config(config: &FollowerConfig) -> Result<Self> {
        Ok(Self::new(config.base_url(), config.request_timeout())?.with_api_key(config.api_key.clone()))
    }

    /// Send `key` with every request
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Server base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/load`
    pub async fn load(
        &self,
        url: &str,
        media_type: Option<MediaType>,
        autoplay: Option<bool>,
        based_on: Option<u64>,
    ) -> Result<CommandAck> {
        let body = LoadRequest {
            url: Some(url.to_string()),
            media_type: media_type.map(|t| t.as_str().to_string()),
            autoplay,
            based_on,
        };
        self.post("/api/load", &body).await
    }

    /// `POST /api/play`
    pub async fn play(&self, based_on: Option<u64>) -> Result<CommandAck> {
        self.post("/api/play", &ControlRequest { based_on }).await
    }

    /// `POST /api/pause`
    pub async fn pause(&self, based_on: Option<u64>) -> Result<CommandAck> {
        self.post("/api/pause", &ControlRequest { based_on }).await
    }

    /// `POST /api/seek`
    pub async fn seek(&self, time: f64, based_on: Option<u64>) -> Result<CommandAck> {
        let body = SeekRequest {
            time: Some(time),
            based_on,
        };
        self.post("/api/seek", &body).await
    }

    /// `GET /api/status`
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let request = self.authorize(self.http.get(self.url("/api/status")));
        let response = Self::send(request).await?;
        Ok(response.json().await?)
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<CommandAck> {
        let request = self.authorize(self.http.post(self.url(path)).json(body));
        let response = Self::send(request).await?;
        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send and turn error statuses into [`ControlError::Rejected`]
    async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ControlError::TransportUnavailable(e.to_string())
            } else {
                ControlError::ClientError(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.message),
            Err(_) if status == StatusCode::UNAUTHORIZED => {
                ("unauthorized".to_string(), "API key rejected".to_string())
            }
            Err(_) => ("internal".to_string(), text),
        };
        Err(ControlError::Rejected {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// Follower that polls the status endpoint
pub struct PollFollower {
    client: PollClient,
    clock: Arc<dyn Clock>,
    interval: Duration,
    reconciler: Reconciler,
    offset: OffsetEstimator,
    surface: Box<dyn PlaybackSurface>,
}

impl PollFollower {
    /// Poll with `client`, driving `surface`
    pub fn new(
        client: PollClient,
        config: &FollowerConfig,
        clock: Arc<dyn Clock>,
        surface: Box<dyn PlaybackSurface>,
    ) -> Self {
        Self {
            client,
            clock,
            interval: config.poll_interval(),
            reconciler: Reconciler::new(config.reconciler_config()),
            offset: OffsetEstimator::default(),
            surface,
        }
    }

    /// Fetch the status once and reconcile
    pub async fn poll_once(&mut self) -> Result<Vec<ReconcileAction>> {
        let snapshot = self.client.status().await?;
        let local_now = self.clock.now();
        self.offset.observe(&snapshot.as_beacon(), local_now);
        let server_now = self.offset.to_server_time(local_now);
        Ok(self
            .reconciler
            .apply(&snapshot.target_view(server_now), self.surface.as_mut()))
    }

    /// Poll until `shutdown` flips to true
    ///
    /// Failed polls are logged and retried on the next tick.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Polling {} every {:?}",
            self.client.base_url(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.poll_once().await {
                    Ok(actions) => {
                        for action in actions {
                            debug!("Poll follower: {}", action);
                        }
                    }
                    Err(e) => warn!("Status poll failed: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Poll follower stopped");
    }

    /// Local status line
    pub fn local_status(&self) -> &str {
        self.reconciler.local_status()
    }

    /// Reconciler state
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Surface being driven
    pub fn surface(&self) -> &dyn PlaybackSurface {
        self.surface.as_ref()
    }

    /// Estimated server clock offset
    pub fn offset(&self) -> Option<f64> {
        self.offset.offset()
    }
}
