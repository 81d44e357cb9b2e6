use std::fmt;

use camlink_frame::Frame;
use camlink_transport::PeerId;
use tokio::sync::mpsc;

use crate::kind::ChannelKind;
use crate::reconnect::LostChannels;

/// Why a channel left the connected state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local `disconnect` call or session shutdown.
    Requested,
    /// No traffic within the heartbeat timeout.
    HeartbeatTimeout,
    /// The transport closed the stream or refused a write.
    TransportFailure(String),
    /// The peer sent a `disconnect` command.
    RemoteDisconnect,
    /// The user cancelled reconnection and the session returned home.
    Reset,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            Self::TransportFailure(detail) => write!(f, "transport failure: {detail}"),
            Self::RemoteDisconnect => f.write_str("remote disconnect"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

/// Notifications for the presentation layer, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected {
        channel: ChannelKind,
        peer: PeerId,
    },
    ConnectFailed {
        channel: ChannelKind,
        /// `None` when a host gave up waiting for its peer to attach.
        peer: Option<PeerId>,
        error: String,
    },
    Disconnected {
        channel: ChannelKind,
        reason: DisconnectReason,
    },
    HeartbeatTimeout {
        channel: ChannelKind,
    },
    /// Ask the user whether to reconnect. A later prompt supersedes an
    /// unanswered earlier one.
    ReconnectPrompt {
        lost: LostChannels,
    },
    Reconnecting {
        channel: ChannelKind,
    },
    ReconnectComplete,
    /// All channels are closed and the application should show its home
    /// screen.
    ResetToHome,
}

impl SessionEvent {
    /// Short event name for logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::Disconnected { .. } => "disconnected",
            Self::HeartbeatTimeout { .. } => "heartbeat_timeout",
            Self::ReconnectPrompt { .. } => "reconnect_prompt",
            Self::Reconnecting { .. } => "reconnecting",
            Self::ReconnectComplete => "reconnect_complete",
            Self::ResetToHome => "reset_to_home",
        }
    }

    /// The channel the event concerns, if it concerns exactly one.
    pub fn channel(&self) -> Option<ChannelKind> {
        match self {
            Self::Connected { channel, .. }
            | Self::ConnectFailed { channel, .. }
            | Self::Disconnected { channel, .. }
            | Self::HeartbeatTimeout { channel }
            | Self::Reconnecting { channel } => Some(*channel),
            Self::ReconnectPrompt { .. } | Self::ReconnectComplete | Self::ResetToHome => None,
        }
    }
}

/// A frame delivered to a per-kind subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub channel: ChannelKind,
    pub peer: PeerId,
    pub frame: Frame,
}

/// The session's event queue.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. `None` once the session has stopped and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is queued.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}
