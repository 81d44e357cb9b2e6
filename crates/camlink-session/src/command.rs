use bytes::Bytes;
use camlink_frame::{Flavor, Frame, MessageKind};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Photo countdown selected on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    #[default]
    Off,
    Three,
    Five,
    Ten,
}

impl TimerMode {
    /// Countdown length as carried on the wire.
    pub fn seconds(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Three => 3,
            Self::Five => 5,
            Self::Ten => 10,
        }
    }

    pub fn from_seconds(seconds: u8) -> Option<Self> {
        match seconds {
            0 => Some(Self::Off),
            3 => Some(Self::Three),
            5 => Some(Self::Five),
            10 => Some(Self::Ten),
            _ => None,
        }
    }
}

/// A control message with its typed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Heartbeat,
    RemoteHeartbeat,
    SelectedTimerMode(TimerMode),
    SetRemoteMode(bool),
    CaptureRequest,
    Disconnect,
}

impl Command {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Heartbeat => MessageKind::Heartbeat,
            Self::RemoteHeartbeat => MessageKind::RemoteHeartbeat,
            Self::SelectedTimerMode(_) => MessageKind::SelectedTimerMode,
            Self::SetRemoteMode(_) => MessageKind::SetRemoteMode,
            Self::CaptureRequest => MessageKind::CaptureRequest,
            Self::Disconnect => MessageKind::Disconnect,
        }
    }

    pub fn payload(&self) -> Bytes {
        match self {
            Self::SelectedTimerMode(mode) => Bytes::copy_from_slice(&[mode.seconds()]),
            Self::SetRemoteMode(on) => Bytes::copy_from_slice(&[u8::from(*on)]),
            _ => Bytes::new(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(self.kind(), self.payload())
    }

    /// Interpret a received frame as a command.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let payload = frame.payload.as_ref();
        let command = match frame.kind {
            MessageKind::Heartbeat => expect_empty(frame, Self::Heartbeat)?,
            MessageKind::RemoteHeartbeat => expect_empty(frame, Self::RemoteHeartbeat)?,
            MessageKind::CaptureRequest => expect_empty(frame, Self::CaptureRequest)?,
            MessageKind::Disconnect => expect_empty(frame, Self::Disconnect)?,
            MessageKind::SelectedTimerMode => {
                let seconds = single_byte(frame)?;
                let mode = TimerMode::from_seconds(seconds).ok_or_else(|| {
                    invalid_payload(frame.kind, format!("unsupported countdown {seconds}s"))
                })?;
                Self::SelectedTimerMode(mode)
            }
            MessageKind::SetRemoteMode => match single_byte(frame)? {
                0 => Self::SetRemoteMode(false),
                1 => Self::SetRemoteMode(true),
                other => {
                    return Err(invalid_payload(
                        frame.kind,
                        format!("expected 0 or 1, got {other}"),
                    ))
                }
            },
            kind => {
                debug_assert_eq!(kind.flavor(), Flavor::Media);
                return Err(invalid_payload(
                    kind,
                    format!("media kind is not a command ({} bytes)", payload.len()),
                ));
            }
        };
        Ok(command)
    }
}

/// Check a frame an application wants to send.
///
/// Heartbeats and `disconnect` belong to the session and are refused with
/// [`SessionError::ReservedKind`]. Other commands must carry a valid payload.
pub fn check_outbound(frame: &Frame) -> Result<()> {
    match frame.kind {
        kind if kind.is_heartbeat() || kind == MessageKind::Disconnect => {
            Err(SessionError::ReservedKind(kind))
        }
        kind if kind.flavor() == Flavor::Command => Command::from_frame(frame).map(drop),
        _ => Ok(()),
    }
}

fn expect_empty(frame: &Frame, command: Command) -> Result<Command> {
    if frame.payload.is_empty() {
        Ok(command)
    } else {
        Err(invalid_payload(
            frame.kind,
            format!("expected empty payload, got {} bytes", frame.payload.len()),
        ))
    }
}

fn single_byte(frame: &Frame) -> Result<u8> {
    match frame.payload.as_ref() {
        [byte] => Ok(*byte),
        other => Err(invalid_payload(
            frame.kind,
            format!("expected 1 byte, got {}", other.len()),
        )),
    }
}

fn invalid_payload(kind: MessageKind, reason: String) -> SessionError {
    SessionError::InvalidPayload { kind, reason }
}

/// Kinds that carry encoded video or photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Sps,
    Pps,
    IdrFrame,
    PFrame,
    Photo,
}

impl MediaKind {
    pub fn message_kind(self) -> MessageKind {
        match self {
            Self::Sps => MessageKind::Sps,
            Self::Pps => MessageKind::Pps,
            Self::IdrFrame => MessageKind::IdrFrame,
            Self::PFrame => MessageKind::PFrame,
            Self::Photo => MessageKind::Photo,
        }
    }
}

impl TryFrom<MessageKind> for MediaKind {
    type Error = SessionError;

    fn try_from(kind: MessageKind) -> Result<Self> {
        match kind {
            MessageKind::Sps => Ok(Self::Sps),
            MessageKind::Pps => Ok(Self::Pps),
            MessageKind::IdrFrame => Ok(Self::IdrFrame),
            MessageKind::PFrame => Ok(Self::PFrame),
            MessageKind::Photo => Ok(Self::Photo),
            other => Err(invalid_payload(other, "command kind is not media".to_string())),
        }
    }
}

/// An opaque encoded buffer (H.264 parameter set or slice, or a photo).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub kind: MediaKind,
    pub data: Bytes,
}

impl MediaPacket {
    pub fn new(kind: MediaKind, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(self.kind.message_kind(), self.data.clone())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Ok(Self {
            kind: MediaKind::try_from(frame.kind)?,
            data: frame.payload.clone(),
        })
    }
}
