use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use mediasync_control::{ClientMessage, FollowerMode};
use mediasync_core::Command;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mediasync",
    version,
    about = "Synchronized media playback server and followers"
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        help = "Log level: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the authoritative sync server")]
    Serve {
        #[arg(long, help = "Address to bind")]
        host: Option<String>,
        #[arg(short, long, help = "Port to listen on")]
        port: Option<u16>,
        #[arg(long = "api-key", help = "Require this API key on every request")]
        api_key: Vec<String>,
        #[arg(long = "no-beacon", help = "Disable periodic clock beacons")]
        no_beacon: bool,
        #[arg(long, help = "Mirror playback onto a local simulated player")]
        mirror: bool,
    },
    #[command(about = "Follow a server with a local simulated player")]
    Follow {
        #[arg(short, long, help = "Server base URL, e.g. http://127.0.0.1:5000")]
        server: Option<String>,
        #[arg(short, long, help = "Follower mode: poll or push")]
        mode: Option<FollowerMode>,
        #[arg(long = "api-key", help = "API key sent to the server")]
        api_key: Option<String>,
        #[arg(long = "interval-ms", help = "Poll interval in milliseconds")]
        interval_ms: Option<u64>,
    },
    #[command(about = "Send one command to a server")]
    Send {
        #[arg(short, long, help = "Server base URL, e.g. http://127.0.0.1:5000")]
        server: Option<String>,
        #[arg(long = "api-key", help = "API key sent to the server")]
        api_key: Option<String>,
        #[arg(
            short,
            long = "based-on",
            help = "Reject the command unless the server is at this revision"
        )]
        based_on: Option<u64>,
        #[command(subcommand)]
        action: SendAction,
    },
}

#[derive(Subcommand)]
pub enum SendAction {
    #[command(about = "Load a media URL")]
    Load {
        url: String,
        #[arg(short = 't', long = "type", help = "Media type: audio or video")]
        media_type: Option<String>,
        #[arg(long = "no-autoplay", help = "Load paused")]
        no_autoplay: bool,
    },
    #[command(about = "Start or resume playback")]
    Play,
    #[command(about = "Pause playback")]
    Pause,
    #[command(about = "Seek to a position in seconds")]
    Seek { time: f64 },
    #[command(about = "Print the current playback status")]
    Status,
}

/// Parse a line typed at the push follower console
///
/// Accepts `play`, `pause`, `seek <secs>`, `load <url> [audio|video]` and
/// `beacon`.
pub fn parse_console_command(line: &str) -> Result<ClientMessage> {
    let mut words = line.split_whitespace();
    let verb = words
        .next()
        .ok_or_else(|| anyhow!("empty command"))?
        .to_ascii_lowercase();

    let message = match verb.as_str() {
        "play" => ClientMessage::command(Command::Play),
        "pause" => ClientMessage::command(Command::Pause),
        "seek" => {
            let time = words
                .next()
                .ok_or_else(|| anyhow!("usage: seek <seconds>"))?
                .parse::<f64>()
                .map_err(|e| anyhow!("invalid seek time: {}", e))?;
            ClientMessage::command(Command::Seek { time })
        }
        "load" => {
            let url = words
                .next()
                .ok_or_else(|| anyhow!("usage: load <url> [audio|video]"))?;
            let media_type = words.next();
            ClientMessage::command(Command::load(url, media_type, None)?)
        }
        "beacon" => ClientMessage::BeaconRequest,
        other => bail!("unknown command '{}'", other),
    };

    if let Some(extra) = words.next() {
        bail!("unexpected argument '{}'", extra);
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasync_core::MediaType;

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(
            parse_console_command("play").unwrap(),
            ClientMessage::command(Command::Play)
        );
        assert_eq!(
            parse_console_command("  PAUSE ").unwrap(),
            ClientMessage::command(Command::Pause)
        );
        assert_eq!(
            parse_console_command("seek 12.5").unwrap(),
            ClientMessage::command(Command::Seek { time: 12.5 })
        );
        assert_eq!(
            parse_console_command("beacon").unwrap(),
            ClientMessage::BeaconRequest
        );
    }

    #[test]
    fn test_parse_console_load() {
        match parse_console_command("load http://media/a.mp3 audio").unwrap() {
            ClientMessage::Command {
                command: Command::Load {
                    url,
                    media_type,
                    autoplay,
                },
                based_on: None,
            } => {
                assert_eq!(url, "http://media/a.mp3");
                assert_eq!(media_type, MediaType::Audio);
                assert!(autoplay);
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse_console_command("load http://media/v.mp4").unwrap() {
            ClientMessage::Command {
                command: Command::Load { media_type, .. },
                ..
            } => assert_eq!(media_type, MediaType::Video),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_console_rejects_garbage() {
        assert!(parse_console_command("").is_err());
        assert!(parse_console_command("rewind").is_err());
        assert!(parse_console_command("seek").is_err());
        assert!(parse_console_command("seek soon").is_err());
        assert!(parse_console_command("load").is_err());
        assert!(parse_console_command("load http://x image").is_err());
        assert!(parse_console_command("play now").is_err());
    }

    #[test]
    fn test_cli_parses_send_seek() {
        let cli = Cli::try_parse_from([
            "mediasync",
            "send",
            "--server",
            "http://host:5000",
            "--based-on",
            "3",
            "seek",
            "42",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                server,
                based_on,
                action: SendAction::Seek { time },
                ..
            } => {
                assert_eq!(server.as_deref(), Some("http://host:5000"));
                assert_eq!(based_on, Some(3));
                assert_eq!(time, 42.0);
            }
            _ => panic!("expected send seek"),
        }
    }

    #[test]
    fn test_cli_parses_follow_mode() {
        let cli = Cli::try_parse_from(["mediasync", "follow", "--mode", "poll"]).unwrap();
        match cli.command {
            Commands::Follow { mode, .. } => assert_eq!(mode, Some(FollowerMode::Poll)),
            _ => panic!("expected follow"),
        }
        assert!(Cli::try_parse_from(["mediasync", "follow", "--mode", "carrier-pigeon"]).is_err());
    }
}
