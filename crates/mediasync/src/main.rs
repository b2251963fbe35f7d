//! MediaSync - synchronized media playback
//!
//! `serve` runs the authoritative server, `follow` mirrors it onto a local
//! simulated player and `send` issues one command.

mod cli;
mod config;
mod logging_setup;

use anyhow::{Context, Result};
use clap::Parser;
use mediasync_control::{
    BeaconTask, FollowerMode, PlaybackHub, PollClient, PollFollower, PushFollower, SurfaceMirror,
    WebServer,
};
use mediasync_core::{Clock, MediaType, SystemClock, VirtualSurface};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use cli::{Cli, Commands, SendAction};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env_overrides()?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    let _log_guard = logging_setup::init(&config.logging)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            api_key,
            no_beacon,
            mirror,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            for key in &api_key {
                config.server.auth.add_key(key);
            }
            if no_beacon {
                config.beacon.enabled = false;
            }
            if mirror {
                config.mirror.enabled = true;
            }
            serve(config).await
        }
        Commands::Follow {
            server,
            mode,
            api_key,
            interval_ms,
        } => {
            if let Some(server) = server {
                config.sync.server_url = server;
            }
            if let Some(mode) = mode {
                config.sync.mode = mode;
            }
            if api_key.is_some() {
                config.sync.api_key = api_key;
            }
            if let Some(interval_ms) = interval_ms {
                config.sync.poll_interval_ms = interval_ms;
            }
            follow(config).await
        }
        Commands::Send {
            server,
            api_key,
            based_on,
            action,
        } => {
            if let Some(server) = server {
                config.sync.server_url = server;
            }
            if api_key.is_some() {
                config.sync.api_key = api_key;
            }
            send(config, based_on, action).await
        }
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hub = Arc::new(PlaybackHub::new(clock.clone(), &config.beacon));

    let beacon = if config.beacon.enabled {
        Some(BeaconTask::spawn(hub.clone()))
    } else {
        info!("Clock beacon disabled");
        None
    };

    let mirror = if config.mirror.enabled {
        info!("Mirroring playback onto a local virtual player");
        let surface = Box::new(VirtualSurface::new(clock.clone()));
        Some(SurfaceMirror::new(hub.clone(), surface, config.mirror.reconciler_config()).spawn())
    } else {
        None
    };

    if config.server.auth.is_enabled() {
        info!(
            "API key authentication enabled ({} key(s))",
            config.server.auth.key_count()
        );
    }

    let result = WebServer::new(config.server, hub)
        .run_until(shutdown_signal())
        .await
        .context("Web server failed");

    if let Some(beacon) = beacon {
        beacon.stop();
    }
    if let Some(mirror) = mirror {
        mirror.abort();
    }
    result
}

async fn follow(config: AppConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let surface = Box::new(VirtualSurface::new(clock.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!(
        "Following {} in {} mode",
        config.sync.base_url(),
        config.sync.mode
    );

    match config.sync.mode {
        FollowerMode::Poll => {
            let client = PollClient::from_config(&config.sync)?;
            let mut follower = PollFollower::new(client, &config.sync, clock, surface);
            follower.run(shutdown_rx).await;
            info!("Last local status: {}", follower.local_status());
        }
        FollowerMode::Push => {
            let (commands_tx, commands_rx) = mpsc::unbounded_channel();
            let console = tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match cli::parse_console_command(&line) {
                        Ok(message) => {
                            if commands_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("{}", e),
                    }
                }
            });

            let mut follower = PushFollower::new(&config.sync, clock, surface);
            follower.run_reconnecting(commands_rx, shutdown_rx).await;
            console.abort();
            info!("Last local status: {}", follower.local_status());
        }
    }
    Ok(())
}

async fn send(config: AppConfig, based_on: Option<u64>, action: SendAction) -> Result<()> {
    let client = PollClient::from_config(&config.sync)?;

    let ack = match action {
        SendAction::Load {
            url,
            media_type,
            no_autoplay,
        } => {
            let media_type = media_type
                .map(|t| t.parse::<MediaType>())
                .transpose()?;
            client
                .load(&url, media_type, Some(!no_autoplay), based_on)
                .await
        }
        SendAction::Play => client.play(based_on).await,
        SendAction::Pause => client.pause(based_on).await,
        SendAction::Seek { time } => client.seek(time, based_on).await,
        SendAction::Status => {
            let snapshot = client
                .status()
                .await
                .with_context(|| format!("Failed to query {}", client.base_url()))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            return Ok(());
        }
    }
    .with_context(|| format!("Command rejected by {}", client.base_url()))?;

    println!("ok, revision {}", ack.revision);
    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
