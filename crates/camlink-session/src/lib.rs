//! Session coordination for camlink peers.
//!
//! A session holds up to two independent channels to other devices: a
//! mirroring channel carrying live preview to a display, and a remote channel
//! to a wearable controller. Each channel frames traffic with
//! [`camlink_frame`], watches liveness with its own [`HeartbeatMonitor`], and
//! reports loss to a [`ReconnectionPolicy`] that prompts before anything is
//! re-established.

mod channel;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod kind;
pub mod reconnect;
pub mod session;

pub use command::{check_outbound, Command, MediaKind, MediaPacket, TimerMode};
pub use config::{SessionConfig, DEFAULT_MIRRORING_SERVICE, DEFAULT_REMOTE_SERVICE};
pub use diagnostics::DiagnosticsSnapshot;
pub use error::{Result, SessionError};
pub use event::{DisconnectReason, InboundFrame, SessionEvent, SessionEvents};
pub use heartbeat::{Beater, HeartbeatEvent, HeartbeatMonitor, HeartbeatSignal, MonitorId};
pub use kind::{ChannelKind, ChannelRole, ConnectionState};
pub use reconnect::{
    Confirmation, LostChannels, PolicyState, PolicyStep, ReconnectionPolicy,
    ReconnectionRequest,
};
pub use session::{ChannelStatus, Session};
