//! In-process camera and display linked over a memory network.
//!
//! The camera streams a few media packets to the display, the display asks
//! for a photo, then the display drops off the network and the camera's
//! heartbeat monitor notices.
//!
//! Run with:
//!   cargo run --example loopback-session

use std::sync::Arc;
use std::time::Duration;

use camlink::frame::MessageKind;
use camlink::session::{
    ChannelKind, ChannelRole, Command, MediaKind, MediaPacket, Session, SessionConfig,
    SessionEvent, SessionEvents,
};
use camlink::transport::{MemoryNetwork, PeerId};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = SessionConfig {
        heartbeat_interval: Duration::from_millis(100),
        heartbeat_timeout: Duration::from_millis(400),
        ..SessionConfig::default()
    };

    let network = MemoryNetwork::new();
    let (camera_transport, camera_incoming) = network.endpoint("camera");
    let (display_transport, _display_incoming) = network.endpoint("display");

    let (camera, mut camera_events) = Session::start(
        ChannelRole::Host,
        "camera",
        Arc::new(camera_transport),
        config.clone(),
    )?;
    camera.accept_from(camera_incoming);
    let (display, mut display_events) =
        Session::start(ChannelRole::Peer, "display", Arc::new(display_transport), config)?;

    let mut media = display.subscribe(MessageKind::IdrFrame).await?;
    let mut captures = camera.subscribe(MessageKind::CaptureRequest).await?;

    display.connect_mirroring("camera").await?;
    wait_for(&mut display_events, |e| matches!(e, SessionEvent::Connected { .. })).await?;
    wait_for(&mut camera_events, |e| matches!(e, SessionEvent::Connected { .. })).await?;

    for seq in 0u8..3 {
        let packet = MediaPacket::new(MediaKind::IdrFrame, vec![0, 0, 1, 0x65, seq]);
        camera.send_media(ChannelKind::Mirroring, packet).await?;
    }
    for _ in 0..3 {
        if let Some(inbound) = media.recv().await {
            eprintln!(
                "[display] {} ({} bytes) from {}",
                inbound.frame.kind,
                inbound.frame.payload.len(),
                inbound.peer
            );
        }
    }

    display
        .send_command(ChannelKind::Mirroring, Command::CaptureRequest)
        .await?;
    if let Some(inbound) = captures.recv().await {
        eprintln!("[camera] {} from {}", inbound.frame.kind, inbound.peer);
    }

    eprintln!("[network] display goes offline");
    network.set_online(&PeerId::new("display"), false);
    wait_for(&mut camera_events, |e| {
        matches!(e, SessionEvent::ReconnectPrompt { .. })
    })
    .await?;

    camera.cancel_reconnect().await?;
    wait_for(&mut camera_events, |e| matches!(e, SessionEvent::ResetToHome)).await?;
    eprintln!("[camera] counters: {:?}", camera.diagnostics());

    display.shutdown().await?;
    camera.shutdown().await?;
    Ok(())
}

async fn wait_for(
    events: &mut SessionEvents,
    wanted: impl Fn(&SessionEvent) -> bool,
) -> Result<SessionEvent, BoxError> {
    let wait = async {
        while let Some(event) = events.recv().await {
            eprintln!("  event: {event:?}");
            if wanted(&event) {
                return Some(event);
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await?
        .ok_or_else(|| "session stopped".into())
}
