use futures::{SinkExt, StreamExt};
use mediasync_control::{
    AuthConfig, ClientMessage, FollowerConfig, PlaybackHub, PollClient, PollFollower, PushFollower,
    ServerMessage, WebServer, WebServerConfig,
};
use mediasync_core::{
    BeaconConfig, Clock, Command, MediaType, SystemClock, TransportStatus, VirtualSurface,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (Arc<PlaybackHub>, SocketAddr) {
    let hub = Arc::new(PlaybackHub::new(Arc::new(SystemClock), &BeaconConfig::default()));
    let addr = serve_hub(hub.clone()).await;
    (hub, addr)
}

async fn serve_hub(hub: Arc<PlaybackHub>) -> SocketAddr {
    let app = WebServer::new(WebServerConfig::default(), hub)
        .router()
        .unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    socket
}

async fn next_message(socket: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::parse(&text).unwrap();
        }
    }
}

async fn send(socket: &mut Socket, message: &str) {
    socket.send(Message::Text(message.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_late_joiner_gets_hello_and_state() {
    let (hub, addr) = start_server().await;
    hub.submit(Command::load("http://media/a.mp3", Some("audio"), Some(false)).unwrap(), None)
        .unwrap();

    let mut socket = connect(addr).await;
    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::Hello { .. }
    ));
    match next_message(&mut socket).await {
        ServerMessage::State(snapshot) => {
            assert_eq!(snapshot.revision, 1);
            assert_eq!(snapshot.state, TransportStatus::LoadedPaused);
            assert_eq!(snapshot.media.map(|m| m.media_type), Some(MediaType::Audio));
        }
        other => panic!("expected sync:state, got {:?}", other),
    }
}

#[tokio::test]
async fn test_commands_fan_out_and_errors_stay_private() {
    let (_hub, addr) = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    for socket in [&mut alice, &mut bob] {
        next_message(socket).await;
        next_message(socket).await;
    }

    // Rejected command is answered to the sender only
    send(&mut alice, r#"{"event":"media:play"}"#).await;
    match next_message(&mut alice).await {
        ServerMessage::Error { event, code, .. } => {
            assert_eq!(event, "media:play");
            assert_eq!(code, "no-media-loaded");
        }
        other => panic!("expected command:error, got {:?}", other),
    }

    send(&mut alice, "definitely not json").await;
    match next_message(&mut alice).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "invalid-message"),
        other => panic!("expected command:error, got {:?}", other),
    }

    // Any client may command; everyone sees the event
    send(
        &mut bob,
        r#"{"event":"media:load","data":{"url":"http://media/v.mp4","mediaType":"video","autoplay":true}}"#,
    )
    .await;
    for socket in [&mut alice, &mut bob] {
        match next_message(socket).await {
            ServerMessage::Event(event) => {
                assert_eq!(event.revision, 1);
                assert_eq!(event.state.status, TransportStatus::Playing);
            }
            other => panic!("expected media:load, got {:?}", other),
        }
    }

    // Client beacons are answered with a server-stamped beacon for everyone
    send(&mut alice, r#"{"event":"sync:beacon","data":{}}"#).await;
    for socket in [&mut alice, &mut bob] {
        match next_message(socket).await {
            ServerMessage::Beacon(beacon) => assert_eq!(beacon.revision, 1),
            other => panic!("expected sync:beacon, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_poll_and_push_followers_converge() {
    let (hub, addr) = start_server().await;
    let config = FollowerConfig::new(format!("http://{}", addr));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut push = PushFollower::new(
        &config,
        clock.clone(),
        Box::new(VirtualSurface::new(clock.clone())),
    );
    let push_task = tokio::spawn(async move {
        let result = push.run(&mut commands_rx, &mut shutdown_rx).await;
        (push, result)
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = PollClient::from_config(&config).unwrap();
    let ack = client
        .load("http://media/v.mp4", Some(MediaType::Video), Some(true), None)
        .await
        .unwrap();
    assert_eq!(ack.revision, 1);
    let ack = client.seek(30.0, Some(1)).await.unwrap();
    assert_eq!(ack.revision, 2);

    // Commands also travel up the push channel
    commands_tx
        .send(ClientMessage::command(Command::Pause))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hub.state().revision, 3);
    assert_eq!(hub.state().status, TransportStatus::Paused);

    shutdown_tx.send(true).unwrap();
    let (push, result) = push_task.await.unwrap();
    assert!(result.is_ok());

    let mut poll = PollFollower::new(
        client,
        &config,
        clock.clone(),
        Box::new(VirtualSurface::new(clock.clone())),
    );
    poll.poll_once().await.unwrap();

    assert_eq!(push.reconciler().revision(), Some(3));
    assert_eq!(poll.reconciler().revision(), Some(3));
    assert_eq!(push.reconciler().media(), poll.reconciler().media());

    let push_pos = push.surface().current_time().unwrap();
    let poll_pos = poll.surface().current_time().unwrap();
    assert!((push_pos - poll_pos).abs() < 1.0, "{} vs {}", push_pos, poll_pos);
    assert!(push_pos >= 30.0);
}

#[tokio::test]
async fn test_push_follower_reports_lost_server() {
    let config = FollowerConfig::new("http://127.0.0.1:9");
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut follower = PushFollower::new(
        &config,
        clock.clone(),
        Box::new(VirtualSurface::new(clock)),
    );
    let (_commands_tx, mut commands_rx) = mpsc::unbounded_channel();
    let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let result = follower.run(&mut commands_rx, &mut shutdown_rx).await;
    assert!(matches!(
        result,
        Err(mediasync_control::ControlError::TransportUnavailable(_))
    ));
}

#[tokio::test]
async fn test_lagging_client_gets_fresh_state() {
    let hub = Arc::new(PlaybackHub::with_capacity(
        Arc::new(SystemClock),
        &BeaconConfig::default(),
        1,
    ));
    let addr = serve_hub(hub.clone()).await;
    let mut socket = connect(addr).await;
    next_message(&mut socket).await;
    next_message(&mut socket).await;

    // No await between submits, so the connection's buffer of one overflows
    hub.submit(Command::load("http://media/v.mp4", None, Some(false)).unwrap(), None)
        .unwrap();
    hub.submit(Command::Seek { time: 12.0 }, None).unwrap();
    hub.submit(Command::Play, None).unwrap();
    hub.submit(Command::Pause, None).unwrap();

    match next_message(&mut socket).await {
        ServerMessage::State(snapshot) => {
            assert_eq!(snapshot.revision, 4);
            assert_eq!(snapshot.state, TransportStatus::Paused);
            assert_eq!(
                snapshot.media.map(|m| m.url),
                Some("http://media/v.mp4".to_string())
            );
        }
        other => panic!("expected sync:state after lag, got {:?}", other),
    }
    match next_message(&mut socket).await {
        ServerMessage::Event(event) => assert_eq!(event.revision, 4),
        other => panic!("expected the retained media:pause, got {:?}", other),
    }
}

#[tokio::test]
async fn test_poll_follower_stops_on_shutdown() {
    let (hub, addr) = start_server().await;
    hub.submit(Command::load("http://media/a.mp3", Some("audio"), Some(true)).unwrap(), None)
        .unwrap();

    let mut config = FollowerConfig::new(format!("http://{}", addr));
    config.poll_interval_ms = 50;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut follower = PollFollower::new(
        PollClient::from_config(&config).unwrap(),
        &config,
        clock.clone(),
        Box::new(VirtualSurface::new(clock)),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        follower.run(shutdown_rx).await;
        follower
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();

    let follower = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("poll follower ignored shutdown")
        .unwrap();
    assert_eq!(follower.reconciler().revision(), Some(1));
    assert_eq!(follower.local_status(), "playing");
}

#[tokio::test]
async fn test_push_channel_accepts_key_with_reserved_characters() {
    let key = "s3cr&t#k+y%";
    let hub = Arc::new(PlaybackHub::new(Arc::new(SystemClock), &BeaconConfig::default()));
    let app = WebServer::new(
        WebServerConfig::default().with_auth(AuthConfig::with_keys([key])),
        hub,
    )
    .router()
    .unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    let mut config = FollowerConfig::new(format!("http://{}", addr));
    assert!(tokio_tungstenite::connect_async(config.ws_url().as_str()).await.is_err());

    config.api_key = Some(key.to_string());
    let (mut socket, _) = tokio_tungstenite::connect_async(config.ws_url().as_str())
        .await
        .unwrap();
    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::Hello { .. }
    ));
}
