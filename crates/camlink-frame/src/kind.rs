//! Message kinds carried in the first byte of every frame.
//!
//! The byte values are part of the wire protocol and are never renumbered.
//! Media kinds occupy `0x01..=0x05`, control commands `0x10..=0x15`.

use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// Which family a message kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// Control commands exchanged on any channel.
    Command,
    /// Encoded video and photo buffers.
    Media,
}

/// The closed set of frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageKind {
    /// H.264 sequence parameter set.
    Sps = 0x01,
    /// H.264 picture parameter set.
    Pps = 0x02,
    /// Key frame (IDR slice).
    IdrFrame = 0x03,
    /// Predicted frame.
    PFrame = 0x04,
    /// Captured still photo.
    Photo = 0x05,
    /// Liveness beat on the mirroring channel (and everything a peer sends).
    Heartbeat = 0x10,
    /// Liveness beat sent by the host on the remote channel.
    RemoteHeartbeat = 0x11,
    /// Countdown timer selection.
    SelectedTimerMode = 0x12,
    /// Enable or disable remote-control mode.
    SetRemoteMode = 0x13,
    /// Ask the camera side to take a photo.
    CaptureRequest = 0x14,
    /// Orderly channel shutdown.
    Disconnect = 0x15,
}

impl MessageKind {
    /// Every known kind, in wire-value order.
    pub const ALL: [MessageKind; 11] = [
        MessageKind::Sps,
        MessageKind::Pps,
        MessageKind::IdrFrame,
        MessageKind::PFrame,
        MessageKind::Photo,
        MessageKind::Heartbeat,
        MessageKind::RemoteHeartbeat,
        MessageKind::SelectedTimerMode,
        MessageKind::SetRemoteMode,
        MessageKind::CaptureRequest,
        MessageKind::Disconnect,
    ];

    /// The wire byte for this kind.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn flavor(self) -> Flavor {
        match self {
            MessageKind::Sps
            | MessageKind::Pps
            | MessageKind::IdrFrame
            | MessageKind::PFrame
            | MessageKind::Photo => Flavor::Media,
            _ => Flavor::Command,
        }
    }

    /// Returns true for the two liveness-only kinds.
    pub fn is_heartbeat(self) -> bool {
        matches!(self, MessageKind::Heartbeat | MessageKind::RemoteHeartbeat)
    }

    /// Stable protocol name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Sps => "sps",
            MessageKind::Pps => "pps",
            MessageKind::IdrFrame => "idrFrame",
            MessageKind::PFrame => "pFrame",
            MessageKind::Photo => "photo",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::RemoteHeartbeat => "remoteHeartbeat",
            MessageKind::SelectedTimerMode => "selectedTimerMode",
            MessageKind::SetRemoteMode => "setRemoteMode",
            MessageKind::CaptureRequest => "captureRequest",
            MessageKind::Disconnect => "disconnect",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::Sps),
            0x02 => Ok(MessageKind::Pps),
            0x03 => Ok(MessageKind::IdrFrame),
            0x04 => Ok(MessageKind::PFrame),
            0x05 => Ok(MessageKind::Photo),
            0x10 => Ok(MessageKind::Heartbeat),
            0x11 => Ok(MessageKind::RemoteHeartbeat),
            0x12 => Ok(MessageKind::SelectedTimerMode),
            0x13 => Ok(MessageKind::SetRemoteMode),
            0x14 => Ok(MessageKind::CaptureRequest),
            0x15 => Ok(MessageKind::Disconnect),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        kind.as_u8()
    }
}

impl FromStr for MessageKind {
    type Err = String;

    /// Accepts the protocol name (case-insensitive, `-`/`_` ignored) or a
    /// `0x`-prefixed wire value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x") {
            let value =
                u8::from_str_radix(hex, 16).map_err(|_| format!("invalid kind value: {s}"))?;
            return MessageKind::try_from(value).map_err(|err| err.to_string());
        }

        let wanted: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.name().to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown message kind: {s}"))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(MessageKind::Sps.as_u8(), 0x01);
        assert_eq!(MessageKind::Pps.as_u8(), 0x02);
        assert_eq!(MessageKind::IdrFrame.as_u8(), 0x03);
        assert_eq!(MessageKind::PFrame.as_u8(), 0x04);
        assert_eq!(MessageKind::Photo.as_u8(), 0x05);
        assert_eq!(MessageKind::Heartbeat.as_u8(), 0x10);
        assert_eq!(MessageKind::RemoteHeartbeat.as_u8(), 0x11);
        assert_eq!(MessageKind::SelectedTimerMode.as_u8(), 0x12);
        assert_eq!(MessageKind::SetRemoteMode.as_u8(), 0x13);
        assert_eq!(MessageKind::CaptureRequest.as_u8(), 0x14);
        assert_eq!(MessageKind::Disconnect.as_u8(), 0x15);
    }

    #[test]
    fn try_from_matches_as_u8_for_all_kinds() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::try_from(kind.as_u8()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_bytes_rejected() {
        let known: Vec<u8> = MessageKind::ALL.iter().map(|k| k.as_u8()).collect();
        for byte in 0..=u8::MAX {
            let parsed = MessageKind::try_from(byte);
            if known.contains(&byte) {
                assert!(parsed.is_ok());
            } else {
                assert!(matches!(parsed, Err(FrameError::UnknownKind(b)) if b == byte));
            }
        }
    }

    #[test]
    fn flavor_split() {
        assert_eq!(MessageKind::Photo.flavor(), Flavor::Media);
        assert_eq!(MessageKind::IdrFrame.flavor(), Flavor::Media);
        assert_eq!(MessageKind::CaptureRequest.flavor(), Flavor::Command);
        assert_eq!(MessageKind::Heartbeat.flavor(), Flavor::Command);
    }

    #[test]
    fn parses_names_and_hex() {
        assert_eq!("idrFrame".parse::<MessageKind>().unwrap(), MessageKind::IdrFrame);
        assert_eq!("idr-frame".parse::<MessageKind>().unwrap(), MessageKind::IdrFrame);
        assert_eq!(
            "CAPTURE_REQUEST".parse::<MessageKind>().unwrap(),
            MessageKind::CaptureRequest
        );
        assert_eq!("0x11".parse::<MessageKind>().unwrap(), MessageKind::RemoteHeartbeat);
        assert!("0x99".parse::<MessageKind>().is_err());
        assert!("selfie".parse::<MessageKind>().is_err());
    }
}
