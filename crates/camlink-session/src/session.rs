//! Session coordinator.
//!
//! A single actor task owns both channel slots, the reconnection policy and
//! the subscription table. [`Session`] handles talk to it over a request
//! queue; receive tasks, heartbeat monitors and connect attempts report back
//! over their own queues. Every report carries the channel kind plus a
//! generation or monitor id, and reports that no longer match the live
//! channel are dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use camlink_frame::{Flavor, Frame, MessageKind};
use camlink_transport::{Inbound, Incoming, Link, PeerId, Transport};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelInput, InputBody};
use crate::command::{check_outbound, Command, MediaPacket};
use crate::config::SessionConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::{Result, SessionError};
use crate::event::{DisconnectReason, InboundFrame, SessionEvent, SessionEvents};
use crate::heartbeat::{HeartbeatEvent, HeartbeatSignal};
use crate::kind::{ChannelKind, ChannelRole, ConnectionState};
use crate::reconnect::{Confirmation, PolicyStep, ReconnectionPolicy};

/// Snapshot of one channel slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelKind,
    pub state: ConnectionState,
    /// Connected peer, or the peer being dialled.
    pub peer: Option<String>,
}

/// Handle to a running session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    role: ChannelRole,
    local: PeerId,
    requests: mpsc::UnboundedSender<Request>,
    diagnostics: Arc<Diagnostics>,
}

enum Request {
    Connect {
        channel: ChannelKind,
        peer: PeerId,
        reply: oneshot::Sender<Result<()>>,
    },
    Attach {
        channel: ChannelKind,
        peer: PeerId,
        link: Link,
        reply: oneshot::Sender<Result<()>>,
    },
    Accept(Inbound),
    Send {
        channel: ChannelKind,
        frame: Frame,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        channel: ChannelKind,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<Vec<ChannelStatus>>,
    },
    Subscribe {
        kind: MessageKind,
        reply: oneshot::Sender<Result<mpsc::Receiver<InboundFrame>>>,
    },
    ConfirmReconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    CancelReconnect {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Completion of work the coordinator started on another task.
enum Internal {
    Opened {
        channel: ChannelKind,
        generation: u64,
        peer: PeerId,
        result: Result<Link>,
    },
    AttachTimedOut {
        channel: ChannelKind,
        generation: u64,
    },
}

impl Session {
    /// Start a session coordinator on the current tokio runtime.
    pub fn start(
        role: ChannelRole,
        local: impl Into<PeerId>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Result<(Self, SessionEvents)> {
        config.validate()?;
        let local = local.into();

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (heartbeats_tx, heartbeats_rx) = mpsc::unbounded_channel();
        let diagnostics = Arc::new(Diagnostics::default());

        info!(%role, local = %local, transport = transport.name(), "session started");
        let coordinator = Coordinator {
            role,
            transport,
            config,
            slots: Slots::default(),
            last_peer: BTreeMap::new(),
            handlers: HashMap::new(),
            policy: ReconnectionPolicy::new(),
            events: events_tx,
            diagnostics: Arc::clone(&diagnostics),
            internal: internal_tx,
            inputs: inputs_tx,
            heartbeats: heartbeats_tx,
            next_generation: 1,
        };
        tokio::spawn(coordinator.run(requests_rx, internal_rx, inputs_rx, heartbeats_rx));

        Ok((
            Self {
                role,
                local,
                requests: requests_tx,
                diagnostics,
            },
            SessionEvents::new(events_rx),
        ))
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local
    }

    /// Start opening the mirroring channel to `peer`.
    ///
    /// Returns once the attempt has started; the outcome arrives as
    /// [`SessionEvent::Connected`] or [`SessionEvent::ConnectFailed`].
    pub async fn connect_mirroring(&self, peer: impl Into<PeerId>) -> Result<()> {
        self.connect(ChannelKind::Mirroring, peer).await
    }

    /// Start opening the remote channel to `peer`.
    pub async fn connect_remote(&self, peer: impl Into<PeerId>) -> Result<()> {
        self.connect(ChannelKind::Remote, peer).await
    }

    pub async fn connect(&self, channel: ChannelKind, peer: impl Into<PeerId>) -> Result<()> {
        let peer = peer.into();
        self.call(|reply| Request::Connect {
            channel,
            peer,
            reply,
        })
        .await?
    }

    /// Adopt a link another peer opened towards us.
    pub async fn attach(&self, channel: ChannelKind, peer: PeerId, link: Link) -> Result<()> {
        self.call(|reply| Request::Attach {
            channel,
            peer,
            link,
            reply,
        })
        .await?
    }

    /// Feed accepted links into the session. The link's service name picks
    /// the channel; links for unknown services are closed.
    pub fn accept_from(&self, mut incoming: Incoming) -> JoinHandle<()> {
        let requests = self.requests.clone();
        tokio::spawn(async move {
            while let Some(inbound) = incoming.recv().await {
                if requests.send(Request::Accept(inbound)).is_err() {
                    break;
                }
            }
        })
    }

    /// Send a frame. Fails with [`SessionError::NotConnected`] unless the
    /// channel is connected. Heartbeat and `disconnect` kinds are refused with
    /// [`SessionError::ReservedKind`]; use [`Session::disconnect`] instead.
    pub async fn send(
        &self,
        channel: ChannelKind,
        kind: MessageKind,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let frame = Frame::new(kind, payload);
        self.call(|reply| Request::Send {
            channel,
            frame,
            reply,
        })
        .await?
    }

    pub async fn send_command(&self, channel: ChannelKind, command: Command) -> Result<()> {
        self.send(channel, command.kind(), command.payload()).await
    }

    pub async fn send_media(&self, channel: ChannelKind, packet: MediaPacket) -> Result<()> {
        let frame = packet.to_frame();
        self.send(channel, frame.kind, frame.payload).await
    }

    /// Close one channel. The peer is told with a `disconnect` command.
    /// No-op for a channel that is not connected.
    pub async fn disconnect(&self, channel: ChannelKind) -> Result<()> {
        self.call(|reply| Request::Disconnect { channel, reply }).await
    }

    pub async fn state(&self, channel: ChannelKind) -> Result<ConnectionState> {
        let status = self.status().await?;
        Ok(status
            .into_iter()
            .find(|s| s.channel == channel)
            .map(|s| s.state)
            .unwrap_or_default())
    }

    pub async fn status(&self) -> Result<Vec<ChannelStatus>> {
        self.call(|reply| Request::Status { reply }).await
    }

    /// Receive every inbound frame of `kind`. A later subscription for the
    /// same kind replaces the earlier one.
    pub async fn subscribe(&self, kind: MessageKind) -> Result<mpsc::Receiver<InboundFrame>> {
        self.call(|reply| Request::Subscribe { kind, reply }).await?
    }

    /// Answer a [`SessionEvent::ReconnectPrompt`] with "reconnect".
    pub async fn confirm_reconnect(&self) -> Result<()> {
        self.call(|reply| Request::ConfirmReconnect { reply }).await?
    }

    /// Answer a [`SessionEvent::ReconnectPrompt`] with "cancel": every
    /// channel is closed and [`SessionEvent::ResetToHome`] follows.
    pub async fn cancel_reconnect(&self) -> Result<()> {
        self.call(|reply| Request::CancelReconnect { reply }).await
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Close all channels and stop the coordinator.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Request::Shutdown { reply }).await
    }

    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(request(tx))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

enum Slot {
    Idle,
    Connecting {
        generation: u64,
        /// `None` while a host waits for its peer to attach again.
        peer: Option<PeerId>,
    },
    Connected(Channel),
}

impl Slot {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Idle => ConnectionState::NotConnected,
            Self::Connecting { .. } => ConnectionState::Connecting,
            Self::Connected(_) => ConnectionState::Connected,
        }
    }
}

struct Slots {
    mirroring: Slot,
    remote: Slot,
}

impl Default for Slots {
    fn default() -> Self {
        Self {
            mirroring: Slot::Idle,
            remote: Slot::Idle,
        }
    }
}

impl Slots {
    fn get(&self, channel: ChannelKind) -> &Slot {
        match channel {
            ChannelKind::Mirroring => &self.mirroring,
            ChannelKind::Remote => &self.remote,
        }
    }

    fn get_mut(&mut self, channel: ChannelKind) -> &mut Slot {
        match channel {
            ChannelKind::Mirroring => &mut self.mirroring,
            ChannelKind::Remote => &mut self.remote,
        }
    }

    fn take(&mut self, channel: ChannelKind) -> Slot {
        std::mem::replace(self.get_mut(channel), Slot::Idle)
    }

    fn connected(&mut self, channel: ChannelKind) -> Option<&mut Channel> {
        match self.get_mut(channel) {
            Slot::Connected(ch) => Some(ch),
            _ => None,
        }
    }
}

struct Coordinator {
    role: ChannelRole,
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    slots: Slots,
    last_peer: BTreeMap<ChannelKind, PeerId>,
    handlers: HashMap<MessageKind, mpsc::Sender<InboundFrame>>,
    policy: ReconnectionPolicy,
    events: mpsc::UnboundedSender<SessionEvent>,
    diagnostics: Arc<Diagnostics>,
    internal: mpsc::UnboundedSender<Internal>,
    inputs: mpsc::UnboundedSender<ChannelInput>,
    heartbeats: mpsc::UnboundedSender<HeartbeatEvent>,
    next_generation: u64,
}

impl Coordinator {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut inputs: mpsc::UnboundedReceiver<ChannelInput>,
        mut heartbeats: mpsc::UnboundedReceiver<HeartbeatEvent>,
    ) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Shutdown { reply }) => {
                        self.close_all(DisconnectReason::Requested);
                        let _ = reply.send(());
                        break;
                    }
                    Some(request) => self.handle_request(request),
                    None => {
                        self.close_all(DisconnectReason::Requested);
                        break;
                    }
                },
                Some(message) = internal.recv() => self.handle_internal(message),
                Some(input) = inputs.recv() => self.handle_input(input),
                Some(event) = heartbeats.recv() => self.handle_heartbeat(event),
            }
        }
        info!(role = %self.role, "session stopped");
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect {
                channel,
                peer,
                reply,
            } => {
                let _ = reply.send(self.start_connect(channel, peer));
            }
            Request::Attach {
                channel,
                peer,
                link,
                reply,
            } => {
                let _ = reply.send(self.attach(channel, peer, link));
            }
            Request::Accept(inbound) => self.accept(inbound),
            Request::Send {
                channel,
                frame,
                reply,
            } => {
                let _ = reply.send(self.send(channel, frame));
            }
            Request::Disconnect { channel, reply } => {
                self.disconnect(channel);
                let _ = reply.send(());
            }
            Request::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Request::Subscribe { kind, reply } => {
                let _ = reply.send(self.subscribe(kind));
            }
            Request::ConfirmReconnect { reply } => {
                let _ = reply.send(self.confirm_reconnect());
            }
            Request::CancelReconnect { reply } => {
                self.reset_to_home();
                let _ = reply.send(());
            }
            Request::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        debug!(event = event.name(), channel = ?event.channel(), "session event");
        let _ = self.events.send(event);
    }

    fn generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn start_connect(&mut self, channel: ChannelKind, peer: PeerId) -> Result<()> {
        if !matches!(self.slots.get(channel), Slot::Idle) {
            return Err(SessionError::AlreadyActive(channel));
        }
        let generation = self.generation();
        *self.slots.get_mut(channel) = Slot::Connecting {
            generation,
            peer: Some(peer.clone()),
        };
        self.last_peer.insert(channel, peer.clone());

        let transport = Arc::clone(&self.transport);
        let service = self.config.service_for(channel).to_string();
        let timeout = self.config.connect_timeout;
        let internal = self.internal.clone();
        info!(%channel, %peer, %service, "connecting");

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.open(&peer, &service)).await
            {
                Ok(result) => result.map_err(SessionError::from),
                Err(_) => Err(SessionError::ConnectTimeout {
                    channel,
                    after: timeout,
                }),
            };
            let _ = internal.send(Internal::Opened {
                channel,
                generation,
                peer,
                result,
            });
        });
        Ok(())
    }

    /// Host side of a confirmed reconnect: wait for the peer to open the
    /// channel again, bounded by the connect timeout.
    fn await_attach(&mut self, channel: ChannelKind) {
        let generation = self.generation();
        *self.slots.get_mut(channel) = Slot::Connecting {
            generation,
            peer: None,
        };
        let timeout = self.config.connect_timeout;
        let internal = self.internal.clone();
        info!(%channel, ?timeout, "waiting for peer to reattach");

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = internal.send(Internal::AttachTimedOut {
                channel,
                generation,
            });
        });
    }

    fn attach(&mut self, channel: ChannelKind, peer: PeerId, link: Link) -> Result<()> {
        let generation = match self.slots.get(channel) {
            Slot::Idle => self.generation(),
            Slot::Connecting {
                generation,
                peer: None,
            } => *generation,
            Slot::Connecting { .. } | Slot::Connected(_) => {
                warn!(%channel, %peer, "rejecting link: channel already active");
                link.handle.close();
                return Err(SessionError::AlreadyActive(channel));
            }
        };
        self.install(channel, generation, peer, link)
    }

    fn accept(&mut self, inbound: Inbound) {
        let Some(channel) = self.config.channel_for_service(&inbound.service) else {
            warn!(peer = %inbound.from, service = %inbound.service, "rejecting link for unknown service");
            inbound.link.handle.close();
            return;
        };
        if let Err(err) = self.attach(channel, inbound.from, inbound.link) {
            debug!(%channel, error = %err, "inbound link not attached");
        }
    }

    fn install(
        &mut self,
        channel: ChannelKind,
        generation: u64,
        peer: PeerId,
        link: Link,
    ) -> Result<()> {
        let handle = Arc::clone(&link.handle);
        let opened = Channel::open(
            channel,
            generation,
            peer.clone(),
            link,
            &self.config,
            self.inputs.clone(),
            self.heartbeats.clone(),
        );
        let ch = match opened {
            Ok(ch) => ch,
            Err(err) => {
                handle.close();
                *self.slots.get_mut(channel) = Slot::Idle;
                self.emit(SessionEvent::ConnectFailed {
                    channel,
                    peer: Some(peer),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        info!(%channel, %peer, generation, "channel connected");
        *self.slots.get_mut(channel) = Slot::Connected(ch);
        self.last_peer.insert(channel, peer.clone());
        self.emit(SessionEvent::Connected { channel, peer });

        match self.policy.reconnected(channel) {
            PolicyStep::Reconnect(next) => self.begin_reconnect(next),
            PolicyStep::Prompt(lost) => self.emit(SessionEvent::ReconnectPrompt { lost }),
            PolicyStep::Complete => {
                info!("reconnection complete");
                self.emit(SessionEvent::ReconnectComplete);
            }
            PolicyStep::Unchanged => {}
        }
        Ok(())
    }

    fn send(&mut self, channel: ChannelKind, frame: Frame) -> Result<()> {
        check_outbound(&frame)?;
        let Some(ch) = self.slots.connected(channel) else {
            self.diagnostics.send_failure();
            return Err(SessionError::NotConnected(channel));
        };
        match ch.send(frame.kind, frame.payload) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.diagnostics.send_failure();
                if matches!(err, SessionError::Transport(_)) {
                    self.fail_channel(channel, DisconnectReason::TransportFailure(err.to_string()));
                }
                Err(err)
            }
        }
    }

    fn disconnect(&mut self, channel: ChannelKind) {
        match self.slots.take(channel) {
            Slot::Idle => {}
            Slot::Connecting { .. } => {
                info!(%channel, "connect attempt abandoned");
                self.forget(channel);
                self.emit(SessionEvent::Disconnected {
                    channel,
                    reason: DisconnectReason::Requested,
                });
            }
            Slot::Connected(ch) => {
                self.close_channel(ch, true);
                self.forget(channel);
                self.emit(SessionEvent::Disconnected {
                    channel,
                    reason: DisconnectReason::Requested,
                });
            }
        }
    }

    fn forget(&mut self, channel: ChannelKind) {
        if let Some(lost) = self.policy.forget(channel) {
            self.emit(SessionEvent::ReconnectPrompt { lost });
        }
    }

    /// Close a connected channel, telling the peer first when `notify`.
    fn close_channel(&self, mut ch: Channel, notify: bool) {
        if notify {
            if let Err(err) = ch.send(MessageKind::Disconnect, Bytes::new()) {
                debug!(channel = %ch.kind(), error = %err, "disconnect command not sent");
            }
        }
        info!(channel = %ch.kind(), peer = %ch.peer(), "channel disconnected");
        ch.close();
    }

    fn status(&self) -> Vec<ChannelStatus> {
        ChannelKind::ALL
            .into_iter()
            .map(|channel| {
                let slot = self.slots.get(channel);
                let peer = match slot {
                    Slot::Idle => None,
                    Slot::Connecting { peer, .. } => peer.as_ref().map(|p| p.to_string()),
                    Slot::Connected(ch) => Some(ch.peer().to_string()),
                };
                ChannelStatus {
                    channel,
                    state: slot.state(),
                    peer,
                }
            })
            .collect()
    }

    fn subscribe(&mut self, kind: MessageKind) -> Result<mpsc::Receiver<InboundFrame>> {
        if kind.is_heartbeat() || kind == MessageKind::Disconnect {
            return Err(SessionError::ReservedKind(kind));
        }
        let (tx, rx) = mpsc::channel(self.config.handler_buffer);
        if self.handlers.insert(kind, tx).is_some() {
            debug!(%kind, "replacing existing subscription");
        }
        Ok(rx)
    }

    fn confirm_reconnect(&mut self) -> Result<()> {
        match self.policy.confirm() {
            Some(Confirmation::Start(channel)) => self.begin_reconnect(channel),
            Some(Confirmation::Queued) => {
                info!("reconnect confirmed; queued behind current attempt");
            }
            None => return Err(SessionError::NoPendingReconnect),
        }
        Ok(())
    }

    fn begin_reconnect(&mut self, channel: ChannelKind) {
        self.emit(SessionEvent::Reconnecting { channel });

        if !matches!(self.slots.get(channel), Slot::Idle) {
            // Something re-established or is already re-establishing it.
            debug!(%channel, "reconnect target already active");
            return;
        }

        match self.role {
            ChannelRole::Host => self.await_attach(channel),
            ChannelRole::Peer => match self.last_peer.get(&channel).cloned() {
                Some(peer) => {
                    if let Err(err) = self.start_connect(channel, peer) {
                        debug!(%channel, error = %err, "reconnect not started");
                    }
                }
                None => {
                    self.emit(SessionEvent::ConnectFailed {
                        channel,
                        peer: None,
                        error: "no previous peer to reconnect to".to_string(),
                    });
                    self.reconnect_failed(channel);
                }
            },
        }
    }

    fn reconnect_failed(&mut self, channel: ChannelKind) {
        if let Some(lost) = self.policy.reconnect_failed(channel) {
            warn!(%channel, %lost, "reconnect attempt failed");
            self.emit(SessionEvent::ReconnectPrompt { lost });
        }
    }

    fn reset_to_home(&mut self) {
        self.policy.cancel();
        self.close_all(DisconnectReason::Reset);
        info!("session reset to home");
        self.emit(SessionEvent::ResetToHome);
    }

    fn close_all(&mut self, reason: DisconnectReason) {
        for channel in ChannelKind::ALL {
            match self.slots.take(channel) {
                Slot::Idle => {}
                Slot::Connecting { .. } => self.emit(SessionEvent::Disconnected {
                    channel,
                    reason: reason.clone(),
                }),
                Slot::Connected(ch) => {
                    self.close_channel(ch, true);
                    self.emit(SessionEvent::Disconnected {
                        channel,
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    /// Tear down a channel that was lost and engage the reconnection policy.
    fn fail_channel(&mut self, channel: ChannelKind, reason: DisconnectReason) {
        let Slot::Connected(ch) = self.slots.take(channel) else {
            return;
        };
        warn!(%channel, peer = %ch.peer(), %reason, "channel lost");
        self.close_channel(ch, false);
        self.emit(SessionEvent::Disconnected { channel, reason });

        if let Some(lost) = self.policy.record_failure(channel) {
            self.emit(SessionEvent::ReconnectPrompt { lost });
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Opened {
                channel,
                generation,
                peer,
                result,
            } => {
                let current = matches!(
                    self.slots.get(channel),
                    Slot::Connecting { generation: g, .. } if *g == generation
                );
                if !current {
                    debug!(%channel, generation, "discarding stale connect result");
                    if let Ok(link) = result {
                        link.handle.close();
                    }
                    return;
                }
                match result {
                    Ok(link) => {
                        let _ = self.install(channel, generation, peer, link);
                    }
                    Err(err) => {
                        warn!(%channel, %peer, error = %err, "connect failed");
                        *self.slots.get_mut(channel) = Slot::Idle;
                        self.emit(SessionEvent::ConnectFailed {
                            channel,
                            peer: Some(peer),
                            error: err.to_string(),
                        });
                        self.reconnect_failed(channel);
                    }
                }
            }
            Internal::AttachTimedOut {
                channel,
                generation,
            } => {
                let waiting = matches!(
                    self.slots.get(channel),
                    Slot::Connecting { generation: g, peer: None } if *g == generation
                );
                if !waiting {
                    return;
                }
                warn!(%channel, "peer did not reattach in time");
                *self.slots.get_mut(channel) = Slot::Idle;
                self.emit(SessionEvent::ConnectFailed {
                    channel,
                    peer: None,
                    error: SessionError::ConnectTimeout {
                        channel,
                        after: self.config.connect_timeout,
                    }
                    .to_string(),
                });
                self.reconnect_failed(channel);
            }
        }
    }

    fn handle_input(&mut self, input: ChannelInput) {
        let ChannelInput {
            channel,
            generation,
            body,
        } = input;
        let Some(ch) = self.slots.connected(channel) else {
            return;
        };
        if ch.generation() != generation {
            debug!(%channel, generation, "discarding input from replaced link");
            return;
        }

        match body {
            InputBody::Frame(frame) => self.dispatch(channel, frame),
            InputBody::Malformed(_) => self.diagnostics.malformed_frame(),
            InputBody::Closed(reason) => {
                let detail = reason.unwrap_or_else(|| "stream closed".to_string());
                self.fail_channel(channel, DisconnectReason::TransportFailure(detail));
            }
        }
    }

    fn dispatch(&mut self, channel: ChannelKind, frame: Frame) {
        let Some(ch) = self.slots.connected(channel) else {
            return;
        };
        match frame.kind {
            MessageKind::Heartbeat | MessageKind::RemoteHeartbeat => ch.beat(),
            MessageKind::Disconnect => {
                if let Slot::Connected(ch) = self.slots.take(channel) {
                    self.close_channel(ch, false);
                }
                self.emit(SessionEvent::Disconnected {
                    channel,
                    reason: DisconnectReason::RemoteDisconnect,
                });
            }
            kind => {
                if kind.flavor() == Flavor::Command {
                    if let Err(err) = Command::from_frame(&frame) {
                        warn!(%channel, error = %err, "dropping malformed command");
                        self.diagnostics.malformed_frame();
                        return;
                    }
                }
                let peer = ch.peer().clone();
                let Some(handler) = self.handlers.get(&kind) else {
                    debug!(%channel, %kind, size = frame.payload.len(), "no subscriber; dropping frame");
                    self.diagnostics.unhandled_frame();
                    return;
                };
                match handler.try_send(InboundFrame {
                    channel,
                    peer,
                    frame,
                }) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(%channel, %kind, "subscriber queue full; dropping frame");
                        self.diagnostics.dropped_frame();
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(%kind, "subscriber went away");
                        self.handlers.remove(&kind);
                        self.diagnostics.unhandled_frame();
                    }
                }
            }
        }
    }

    fn handle_heartbeat(&mut self, event: HeartbeatEvent) {
        let HeartbeatEvent {
            channel,
            monitor,
            signal,
        } = event;
        let heartbeat = self.role.heartbeat_kind(channel);
        let Some(ch) = self.slots.connected(channel) else {
            return;
        };
        if ch.monitor_id() != monitor {
            debug!(%channel, %monitor, "ignoring event from retired monitor");
            return;
        }

        match signal {
            HeartbeatSignal::Tick => {
                if let Err(err) = ch.send(heartbeat, Bytes::new()) {
                    self.diagnostics.send_failure();
                    self.fail_channel(channel, DisconnectReason::TransportFailure(err.to_string()));
                }
            }
            HeartbeatSignal::Timeout => {
                self.diagnostics.heartbeat_timeout();
                self.emit(SessionEvent::HeartbeatTimeout { channel });
                self.fail_channel(channel, DisconnectReason::HeartbeatTimeout);
            }
        }
    }
}
