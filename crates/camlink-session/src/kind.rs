use std::fmt;
use std::str::FromStr;

use camlink_frame::MessageKind;
use serde::{Deserialize, Serialize};

/// The two independent links a session can hold.
///
/// Ordering matters: reconnection walks channels in ascending order, so
/// mirroring is always re-established before remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Live preview stream to a display peer.
    Mirroring,
    /// Command link to a wearable controller.
    Remote,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Mirroring, ChannelKind::Remote];

    pub fn name(self) -> &'static str {
        match self {
            Self::Mirroring => "mirroring",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mirroring" | "mirror" => Ok(Self::Mirroring),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown channel '{other}' (expected mirroring or remote)")),
        }
    }
}

/// Which side of the link this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    /// Discoverable side; accepts links.
    Host,
    /// Discovering side; opens links.
    Peer,
}

impl ChannelRole {
    /// Liveness kind this role sends on `channel`.
    ///
    /// A host beats with `remoteHeartbeat` on the remote channel and plain
    /// `heartbeat` elsewhere; a peer always sends plain `heartbeat`.
    pub fn heartbeat_kind(self, channel: ChannelKind) -> MessageKind {
        match (self, channel) {
            (Self::Host, ChannelKind::Remote) => MessageKind::RemoteHeartbeat,
            _ => MessageKind::Heartbeat,
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Host => "host",
            Self::Peer => "peer",
        })
    }
}

/// Lifecycle of one channel.
///
/// Moves `NotConnected -> Connecting -> Connected -> NotConnected`; a channel
/// never jumps from `NotConnected` straight to `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotConnected => "not connected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}
