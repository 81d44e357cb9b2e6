//! One established link: framing, liveness and the receive task.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use camlink_frame::{Frame, FrameError, MessageKind, PacketCodec, HEADER_SIZE};
use camlink_transport::{Link, PeerId, StreamHandle, TransportEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::heartbeat::{Beater, HeartbeatEvent, HeartbeatMonitor, MonitorId};
use crate::kind::ChannelKind;

/// What a receive task reports to the coordinator.
#[derive(Debug)]
pub(crate) struct ChannelInput {
    pub channel: ChannelKind,
    pub generation: u64,
    pub body: InputBody,
}

#[derive(Debug)]
pub(crate) enum InputBody {
    Frame(Frame),
    /// Buffered bytes did not parse and were discarded.
    Malformed(FrameError),
    /// The stream ended.
    Closed(Option<String>),
}

/// A connected channel.
///
/// Owns the heartbeat monitor and the receive task; both stop when the
/// channel is closed or dropped. `generation` distinguishes this link from
/// earlier links of the same kind.
pub(crate) struct Channel {
    kind: ChannelKind,
    peer: PeerId,
    generation: u64,
    handle: Arc<dyn StreamHandle>,
    codec: PacketCodec,
    monitor: HeartbeatMonitor,
    receiver: JoinHandle<()>,
}

impl Channel {
    pub fn open(
        kind: ChannelKind,
        generation: u64,
        peer: PeerId,
        link: Link,
        config: &SessionConfig,
        inputs: mpsc::UnboundedSender<ChannelInput>,
        heartbeats: mpsc::UnboundedSender<HeartbeatEvent>,
    ) -> Result<Self> {
        let mut monitor =
            HeartbeatMonitor::new(kind, config.heartbeat_interval, config.heartbeat_timeout)?;
        monitor.start(heartbeats);

        let receiver = tokio::spawn(receive_loop(
            kind,
            generation,
            link.inbound,
            monitor.beater(),
            PacketCodec::new(config.max_payload_size),
            inputs,
        ));

        Ok(Self {
            kind,
            peer,
            generation,
            handle: link.handle,
            codec: PacketCodec::new(config.max_payload_size),
            monitor,
            receiver,
        })
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn monitor_id(&self) -> MonitorId {
        self.monitor.id()
    }

    /// Frame and write one message.
    pub fn send(&mut self, kind: MessageKind, payload: Bytes) -> Result<()> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        self.codec.encode(Frame::new(kind, payload), &mut buf)?;
        trace!(channel = %self.kind, %kind, size = buf.len(), "sending frame");
        self.handle.write(buf.freeze())?;
        Ok(())
    }

    pub fn beat(&self) {
        self.monitor.beat();
    }

    /// Stop the monitor and receive task and close the transport stream.
    pub fn close(mut self) {
        self.monitor.stop();
        self.receiver.abort();
        self.handle.close();
        debug!(channel = %self.kind, peer = %self.peer, generation = self.generation, "channel closed");
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop(
    channel: ChannelKind,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    beater: Beater,
    mut codec: PacketCodec,
    inputs: mpsc::UnboundedSender<ChannelInput>,
) {
    let report = |body| {
        inputs
            .send(ChannelInput {
                channel,
                generation,
                body,
            })
            .is_ok()
    };

    let mut buf = BytesMut::new();
    let reason = loop {
        match inbound.recv().await {
            Some(TransportEvent::Received(bytes)) => {
                beater.beat();
                buf.extend_from_slice(&bytes);
                loop {
                    match codec.decode(&mut buf) {
                        Ok(Some(frame)) => {
                            if !report(InputBody::Frame(frame)) {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!(
                                %channel,
                                error = %err,
                                discarded = buf.len(),
                                "malformed frame; discarding buffered bytes"
                            );
                            buf.clear();
                            if !report(InputBody::Malformed(err)) {
                                return;
                            }
                            break;
                        }
                    }
                }
            }
            Some(TransportEvent::Closed { reason }) => break reason,
            None => break Some("transport dropped the stream".to_string()),
        }
    };
    debug!(%channel, generation, ?reason, "receive loop ended");
    report(InputBody::Closed(reason));
}
