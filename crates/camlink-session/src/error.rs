use std::time::Duration;

use camlink_frame::MessageKind;

use crate::kind::ChannelKind;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] camlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] camlink_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading configuration from disk failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel is not connected.
    #[error("{0} channel is not connected")]
    NotConnected(ChannelKind),

    /// The channel already has a link or a connect attempt in progress.
    #[error("{0} channel is already connecting or connected")]
    AlreadyActive(ChannelKind),

    /// Opening the channel did not finish in time.
    #[error("connecting the {channel} channel timed out after {after:?}")]
    ConnectTimeout { channel: ChannelKind, after: Duration },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A command frame carried a payload that does not parse.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: MessageKind, reason: String },

    /// Liveness and disconnect kinds are consumed by the session itself.
    #[error("{0} frames are handled internally by the session")]
    ReservedKind(MessageKind),

    /// There is no lost channel waiting for a reconnect decision.
    #[error("no reconnection pending")]
    NoPendingReconnect,

    /// The session has shut down.
    #[error("session closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
