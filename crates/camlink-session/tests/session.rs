//! End-to-end session scenarios over the in-memory transport.
//!
//! Topology: `camera` hosts both channels, `display` opens mirroring and
//! `watch` opens remote. Time is paused, so heartbeat timing is exact.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use camlink_frame::{encode, MessageKind};
use camlink_session::{
    ChannelKind, ChannelRole, Command, ConnectionState, DisconnectReason, LostChannels,
    MediaKind, MediaPacket, Session, SessionConfig, SessionError, SessionEvent, SessionEvents,
    TimerMode,
};
use camlink_transport::{
    Link, MemoryNetwork, PeerId, Transport, TransportEvent, TransportError,
};

fn config() -> SessionConfig {
    SessionConfig {
        heartbeat_interval: Duration::from_millis(100),
        heartbeat_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(1),
        ..SessionConfig::default()
    }
}

async fn next_event(events: &mut SessionEvents) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session event queue closed")
}

fn connected(channel: ChannelKind, peer: &str) -> SessionEvent {
    SessionEvent::Connected {
        channel,
        peer: PeerId::from(peer),
    }
}

struct Rig {
    network: MemoryNetwork,
    camera: Session,
    camera_events: SessionEvents,
    display: Session,
    display_events: SessionEvents,
    watch: Session,
    watch_events: SessionEvents,
}

impl Rig {
    fn new() -> Self {
        let network = MemoryNetwork::new();
        let (camera_transport, camera_incoming) = network.endpoint("camera");
        let (display_transport, _display_incoming) = network.endpoint("display");
        let (watch_transport, _watch_incoming) = network.endpoint("watch");

        let (camera, camera_events) = Session::start(
            ChannelRole::Host,
            "camera",
            Arc::new(camera_transport),
            config(),
        )
        .unwrap();
        camera.accept_from(camera_incoming);

        let (display, display_events) = Session::start(
            ChannelRole::Peer,
            "display",
            Arc::new(display_transport),
            config(),
        )
        .unwrap();
        let (watch, watch_events) =
            Session::start(ChannelRole::Peer, "watch", Arc::new(watch_transport), config())
                .unwrap();

        Self {
            network,
            camera,
            camera_events,
            display,
            display_events,
            watch,
            watch_events,
        }
    }

    async fn connect_display(&mut self) {
        self.display.connect_mirroring("camera").await.unwrap();
        assert_eq!(
            next_event(&mut self.display_events).await,
            connected(ChannelKind::Mirroring, "camera")
        );
        assert_eq!(
            next_event(&mut self.camera_events).await,
            connected(ChannelKind::Mirroring, "display")
        );
    }

    async fn connect_watch(&mut self) {
        self.watch.connect_remote("camera").await.unwrap();
        assert_eq!(
            next_event(&mut self.watch_events).await,
            connected(ChannelKind::Remote, "camera")
        );
        assert_eq!(
            next_event(&mut self.camera_events).await,
            connected(ChannelKind::Remote, "watch")
        );
    }

    fn set_online(&self, id: &str, online: bool) {
        self.network.set_online(&PeerId::from(id), online);
    }
}

async fn expect_timeout(events: &mut SessionEvents, channel: ChannelKind, lost: LostChannels) {
    assert_eq!(
        next_event(events).await,
        SessionEvent::HeartbeatTimeout { channel }
    );
    assert_eq!(
        next_event(events).await,
        SessionEvent::Disconnected {
            channel,
            reason: DisconnectReason::HeartbeatTimeout
        }
    );
    assert_eq!(
        next_event(events).await,
        SessionEvent::ReconnectPrompt { lost }
    );
}

#[tokio::test(start_paused = true)]
async fn media_reaches_subscriber() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    let mut frames = rig.display.subscribe(MessageKind::IdrFrame).await.unwrap();
    rig.camera
        .send_media(
            ChannelKind::Mirroring,
            MediaPacket::new(MediaKind::IdrFrame, vec![0u8; 1024]),
        )
        .await
        .unwrap();

    let inbound = frames.recv().await.unwrap();
    assert_eq!(inbound.channel, ChannelKind::Mirroring);
    assert_eq!(inbound.peer, PeerId::from("camera"));
    assert_eq!(inbound.frame.kind, MessageKind::IdrFrame);
    assert_eq!(inbound.frame.payload.len(), 1024);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_idle_channel_alive() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        rig.camera.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::Connected
    );
    assert_eq!(
        rig.display.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::Connected
    );
    assert!(rig.camera_events.try_recv().is_none());
    assert!(rig.display_events.try_recv().is_none());
    assert_eq!(rig.camera.diagnostics().heartbeat_timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out_and_prompts() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    rig.set_online("display", false);
    expect_timeout(
        &mut rig.camera_events,
        ChannelKind::Mirroring,
        LostChannels::MirroringOnly,
    )
    .await;
    expect_timeout(
        &mut rig.display_events,
        ChannelKind::Mirroring,
        LostChannels::MirroringOnly,
    )
    .await;

    assert_eq!(
        rig.camera.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::NotConnected
    );
    assert_eq!(rig.camera.diagnostics().heartbeat_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn channels_fail_independently() {
    let mut rig = Rig::new();
    rig.connect_display().await;
    rig.connect_watch().await;

    rig.set_online("watch", false);
    expect_timeout(
        &mut rig.camera_events,
        ChannelKind::Remote,
        LostChannels::RemoteOnly,
    )
    .await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        rig.camera.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::Connected
    );
    assert!(rig.display_events.try_recv().is_none());

    let mut photos = rig.display.subscribe(MessageKind::Photo).await.unwrap();
    rig.camera
        .send(ChannelKind::Mirroring, MessageKind::Photo, vec![0xFF, 0xD8])
        .await
        .unwrap();
    assert_eq!(
        photos.recv().await.unwrap().frame.payload.as_ref(),
        &[0xFF, 0xD8]
    );
}

#[tokio::test(start_paused = true)]
async fn both_lost_reconnect_mirroring_first() {
    let mut rig = Rig::new();
    rig.connect_display().await;
    rig.connect_watch().await;

    rig.set_online("display", false);
    rig.set_online("watch", false);

    let mut prompts = Vec::new();
    while prompts.last() != Some(&LostChannels::Both) {
        if let SessionEvent::ReconnectPrompt { lost } = next_event(&mut rig.camera_events).await {
            prompts.push(lost);
        }
    }
    assert_eq!(prompts.len(), 2);

    expect_timeout(
        &mut rig.display_events,
        ChannelKind::Mirroring,
        LostChannels::MirroringOnly,
    )
    .await;
    expect_timeout(
        &mut rig.watch_events,
        ChannelKind::Remote,
        LostChannels::RemoteOnly,
    )
    .await;

    rig.set_online("display", true);
    rig.set_online("watch", true);

    rig.camera.confirm_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Reconnecting {
            channel: ChannelKind::Mirroring
        }
    );
    assert_eq!(
        rig.camera.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::Connecting
    );
    assert_eq!(
        rig.camera.state(ChannelKind::Remote).await.unwrap(),
        ConnectionState::NotConnected
    );

    rig.display.confirm_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.display_events).await,
        SessionEvent::Reconnecting {
            channel: ChannelKind::Mirroring
        }
    );
    assert_eq!(
        next_event(&mut rig.display_events).await,
        connected(ChannelKind::Mirroring, "camera")
    );
    assert_eq!(
        next_event(&mut rig.display_events).await,
        SessionEvent::ReconnectComplete
    );
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        connected(ChannelKind::Mirroring, "display")
    );
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Reconnecting {
            channel: ChannelKind::Remote
        }
    );

    rig.watch.confirm_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        connected(ChannelKind::Remote, "watch")
    );
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::ReconnectComplete
    );
}

#[tokio::test(start_paused = true)]
async fn loss_during_reconnect_is_prompted_not_chained() {
    let mut rig = Rig::new();
    rig.connect_display().await;
    rig.connect_watch().await;

    rig.set_online("display", false);
    expect_timeout(
        &mut rig.camera_events,
        ChannelKind::Mirroring,
        LostChannels::MirroringOnly,
    )
    .await;
    expect_timeout(
        &mut rig.display_events,
        ChannelKind::Mirroring,
        LostChannels::MirroringOnly,
    )
    .await;

    rig.camera.confirm_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Reconnecting {
            channel: ChannelKind::Mirroring
        }
    );

    // Remote drops while the camera is still waiting for mirroring.
    rig.set_online("watch", false);
    expect_timeout(&mut rig.camera_events, ChannelKind::Remote, LostChannels::Both).await;

    rig.set_online("display", true);
    rig.display.confirm_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        connected(ChannelKind::Mirroring, "display")
    );
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::ReconnectPrompt {
            lost: LostChannels::RemoteOnly
        }
    );
    assert_eq!(
        rig.camera.state(ChannelKind::Remote).await.unwrap(),
        ConnectionState::NotConnected
    );

    rig.camera.confirm_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Reconnecting {
            channel: ChannelKind::Remote
        }
    );
    assert_eq!(
        rig.camera.state(ChannelKind::Remote).await.unwrap(),
        ConnectionState::Connecting
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_resets_to_home() {
    let mut rig = Rig::new();
    rig.connect_display().await;
    rig.connect_watch().await;

    rig.set_online("display", false);
    expect_timeout(
        &mut rig.camera_events,
        ChannelKind::Mirroring,
        LostChannels::MirroringOnly,
    )
    .await;

    rig.camera.cancel_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Disconnected {
            channel: ChannelKind::Remote,
            reason: DisconnectReason::Reset
        }
    );
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::ResetToHome
    );
    assert_eq!(
        next_event(&mut rig.watch_events).await,
        SessionEvent::Disconnected {
            channel: ChannelKind::Remote,
            reason: DisconnectReason::RemoteDisconnect
        }
    );

    for channel in ChannelKind::ALL {
        assert_eq!(
            rig.camera.state(channel).await.unwrap(),
            ConnectionState::NotConnected
        );
    }
    assert!(matches!(
        rig.camera.confirm_reconnect().await,
        Err(SessionError::NoPendingReconnect)
    ));
}

#[tokio::test(start_paused = true)]
async fn host_gives_up_waiting_for_reattach() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    rig.set_online("display", false);
    expect_timeout(
        &mut rig.camera_events,
        ChannelKind::Mirroring,
        LostChannels::MirroringOnly,
    )
    .await;

    rig.camera.confirm_reconnect().await.unwrap();
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Reconnecting {
            channel: ChannelKind::Mirroring
        }
    );
    assert!(matches!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::ConnectFailed {
            channel: ChannelKind::Mirroring,
            peer: None,
            ..
        }
    ));
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::ReconnectPrompt {
            lost: LostChannels::MirroringOnly
        }
    );
}

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_fails() {
    let rig = Rig::new();

    let err = rig
        .camera
        .send(ChannelKind::Mirroring, MessageKind::Photo, vec![1u8, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotConnected(ChannelKind::Mirroring)));
    assert_eq!(rig.camera.diagnostics().send_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn raw_send_refuses_session_kinds_and_bad_commands() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    for kind in [
        MessageKind::Disconnect,
        MessageKind::Heartbeat,
        MessageKind::RemoteHeartbeat,
    ] {
        let err = rig
            .display
            .send(ChannelKind::Mirroring, kind, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ReservedKind(k) if k == kind));
    }
    assert!(matches!(
        rig.display
            .send_command(ChannelKind::Mirroring, Command::Disconnect)
            .await,
        Err(SessionError::ReservedKind(MessageKind::Disconnect))
    ));
    assert!(matches!(
        rig.display
            .send(ChannelKind::Mirroring, MessageKind::SelectedTimerMode, vec![7u8])
            .await,
        Err(SessionError::InvalidPayload { .. })
    ));

    tokio::time::sleep(Duration::from_secs(2)).await;
    for session in [&rig.camera, &rig.display] {
        assert_eq!(
            session.state(ChannelKind::Mirroring).await.unwrap(),
            ConnectionState::Connected
        );
    }
    assert!(rig.camera_events.try_recv().is_none());
    assert!(rig.display_events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn disconnect_notifies_peer_without_prompt() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    rig.display.disconnect(ChannelKind::Mirroring).await.unwrap();
    assert_eq!(
        next_event(&mut rig.display_events).await,
        SessionEvent::Disconnected {
            channel: ChannelKind::Mirroring,
            reason: DisconnectReason::Requested
        }
    );
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Disconnected {
            channel: ChannelKind::Mirroring,
            reason: DisconnectReason::RemoteDisconnect
        }
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(rig.camera_events.try_recv().is_none());

    rig.display.disconnect(ChannelKind::Mirroring).await.unwrap();
    assert!(rig.display_events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn second_connect_is_rejected() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    assert!(matches!(
        rig.display.connect_mirroring("camera").await,
        Err(SessionError::AlreadyActive(ChannelKind::Mirroring))
    ));
}

#[tokio::test(start_paused = true)]
async fn commands_reach_subscribers_and_reserved_kinds_are_refused() {
    let mut rig = Rig::new();
    rig.connect_watch().await;

    assert!(matches!(
        rig.camera.subscribe(MessageKind::Heartbeat).await,
        Err(SessionError::ReservedKind(MessageKind::Heartbeat))
    ));
    assert!(rig.camera.subscribe(MessageKind::Disconnect).await.is_err());

    let mut timers = rig
        .camera
        .subscribe(MessageKind::SelectedTimerMode)
        .await
        .unwrap();

    rig.watch
        .send_command(ChannelKind::Remote, Command::CaptureRequest)
        .await
        .unwrap();
    rig.watch
        .send_command(
            ChannelKind::Remote,
            Command::SelectedTimerMode(TimerMode::Ten),
        )
        .await
        .unwrap();

    let inbound = timers.recv().await.unwrap();
    assert_eq!(inbound.channel, ChannelKind::Remote);
    assert_eq!(
        Command::from_frame(&inbound.frame).unwrap(),
        Command::SelectedTimerMode(TimerMode::Ten)
    );
    assert_eq!(rig.camera.diagnostics().unhandled_frames, 1);
}

async fn raw_link(rig: &mut Rig, service: &str) -> Link {
    let (raw, _incoming) = rig.network.endpoint("raw");
    let link = raw.open(&PeerId::from("camera"), service).await.unwrap();
    let event = next_event(&mut rig.camera_events).await;
    assert!(matches!(
        event,
        SessionEvent::Connected { ref peer, .. } if peer.as_str() == "raw"
    ));
    link
}

#[tokio::test(start_paused = true)]
async fn malformed_bytes_are_counted_and_channel_stays_up() {
    let mut rig = Rig::new();
    let link = raw_link(&mut rig, "camlink-mirror").await;
    let mut photos = rig.camera.subscribe(MessageKind::Photo).await.unwrap();

    link.handle
        .write(Bytes::from_static(&[0x7F, 0x00, 0x00, 0x00, 0x00]))
        .unwrap();
    link.handle
        .write(encode(MessageKind::Photo, b"jpeg").unwrap())
        .unwrap();

    assert_eq!(photos.recv().await.unwrap().frame.payload.as_ref(), b"jpeg");
    assert_eq!(rig.camera.diagnostics().malformed_frames, 1);
    assert_eq!(
        rig.camera.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn host_beats_with_remote_heartbeat_on_remote_channel() {
    let mut rig = Rig::new();
    let mut link = raw_link(&mut rig, "camlink-remote").await;

    match link.inbound.recv().await.unwrap() {
        TransportEvent::Received(bytes) => {
            assert_eq!(bytes.as_ref(), &[0x11, 0x00, 0x00, 0x00, 0x00]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unknown_service_is_refused() {
    let mut rig = Rig::new();
    let (raw, _incoming) = rig.network.endpoint("raw");
    let mut link = raw
        .open(&PeerId::from("camera"), "camlink-unknown")
        .await
        .unwrap();

    assert!(matches!(
        link.inbound.recv().await.unwrap(),
        TransportEvent::Closed { .. }
    ));
    assert!(rig.camera_events.try_recv().is_none());
}

/// Transport whose opens never complete.
struct StallingTransport;

#[async_trait]
impl Transport for StallingTransport {
    async fn open(&self, _peer: &PeerId, _service: &str) -> Result<Link, TransportError> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

#[tokio::test(start_paused = true)]
async fn connect_attempt_times_out() {
    let (session, mut events) = Session::start(
        ChannelRole::Peer,
        "display",
        Arc::new(StallingTransport),
        config(),
    )
    .unwrap();

    session.connect_mirroring("nowhere").await.unwrap();
    assert_eq!(
        session.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::Connecting
    );

    match next_event(&mut events).await {
        SessionEvent::ConnectFailed {
            channel,
            peer,
            error,
        } => {
            assert_eq!(channel, ChannelKind::Mirroring);
            assert_eq!(peer, Some(PeerId::from("nowhere")));
            assert!(error.contains("timed out"), "{error}");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(
        session.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::NotConnected
    );
    assert!(events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_channels() {
    let mut rig = Rig::new();
    rig.connect_display().await;

    rig.display.shutdown().await.unwrap();
    assert_eq!(
        next_event(&mut rig.display_events).await,
        SessionEvent::Disconnected {
            channel: ChannelKind::Mirroring,
            reason: DisconnectReason::Requested
        }
    );
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Disconnected {
            channel: ChannelKind::Mirroring,
            reason: DisconnectReason::RemoteDisconnect
        }
    );
    assert!(matches!(
        rig.display.state(ChannelKind::Mirroring).await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test(start_paused = true)]
async fn closed_link_is_treated_like_a_timeout() {
    let mut rig = Rig::new();
    rig.connect_display().await;
    let link = raw_link(&mut rig, "camlink-remote").await;

    link.handle.close();

    assert!(matches!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::Disconnected {
            channel: ChannelKind::Remote,
            reason: DisconnectReason::TransportFailure(_)
        }
    ));
    assert_eq!(
        next_event(&mut rig.camera_events).await,
        SessionEvent::ReconnectPrompt {
            lost: LostChannels::RemoteOnly
        }
    );
    assert_eq!(
        rig.camera.state(ChannelKind::Remote).await.unwrap(),
        ConnectionState::NotConnected
    );
    assert_eq!(
        rig.camera.state(ChannelKind::Mirroring).await.unwrap(),
        ConnectionState::Connected
    );
    assert!(rig.display_events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn malformed_command_never_reaches_subscriber() {
    let mut rig = Rig::new();
    let link = raw_link(&mut rig, "camlink-remote").await;
    let mut modes = rig.camera.subscribe(MessageKind::SetRemoteMode).await.unwrap();

    link.handle
        .write(encode(MessageKind::SetRemoteMode, &[9]).unwrap())
        .unwrap();
    link.handle
        .write(encode(MessageKind::SetRemoteMode, &[1]).unwrap())
        .unwrap();

    let inbound = modes.recv().await.unwrap();
    assert_eq!(
        Command::from_frame(&inbound.frame).unwrap(),
        Command::SetRemoteMode(true)
    );
    assert_eq!(rig.camera.diagnostics().malformed_frames, 1);
    assert_eq!(rig.camera.diagnostics().unhandled_frames, 0);
    assert!(modes.try_recv().is_err());
}
