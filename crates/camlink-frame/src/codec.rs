use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::MessageKind;

/// Frame header: kind (1) + length (4) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Default maximum payload size: 32 MiB.
///
/// The wire format itself allows up to `u32::MAX`; this bound keeps a corrupt
/// or hostile peer from making a channel buffer without limit.
pub const DEFAULT_MAX_PAYLOAD: usize = 32 * 1024 * 1024;

/// Most [`decode_frame`] reserves ahead of bytes that have not arrived yet.
const MAX_RESERVE_AHEAD: usize = 64 * 1024;

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the payload is.
    pub kind: MessageKind,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A frame with no payload.
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Outcome of a non-consuming [`decode`] attempt.
#[derive(Debug)]
pub enum Decoded {
    /// A complete frame and the number of buffer bytes it occupied.
    Frame { frame: Frame, consumed: usize },
    /// More bytes are needed; nothing may be consumed yet.
    Incomplete,
    /// The header is unusable (unknown kind or oversized length).
    Invalid(FrameError),
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────────┬──────────────────┐
/// │ Kind     │ Length       │ Payload          │
/// │ (1B)     │ (4B BE u32)  │ (Length bytes)   │
/// └──────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(kind: MessageKind, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(kind.as_u8());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a single frame into a fresh buffer.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(kind, payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Try to decode one frame from the front of `src` without consuming it.
///
/// The kind byte is validated as soon as the header is available, so an
/// unknown kind is reported regardless of how much payload has arrived.
pub fn decode(src: &[u8], max_payload: usize) -> Decoded {
    if src.len() < HEADER_SIZE {
        return Decoded::Incomplete;
    }

    let kind = match MessageKind::try_from(src[0]) {
        Ok(kind) => kind,
        Err(err) => return Decoded::Invalid(err),
    };

    let payload_len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
    if payload_len > max_payload {
        return Decoded::Invalid(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Decoded::Incomplete;
    }

    Decoded::Frame {
        frame: Frame::new(kind, Bytes::copy_from_slice(&src[HEADER_SIZE..total])),
        consumed: total,
    }
}

/// Decode a frame from an accumulating buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. On error nothing is
/// consumed; the caller decides what to discard.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let kind = MessageKind::try_from(src[0])?;
    let payload_len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        // The declared length is only a claim until the bytes show up.
        src.reserve((total - src.len()).min(MAX_RESERVE_AHEAD));
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { kind, payload }))
}

/// Limits for the blocking [`FrameReader`](crate::FrameReader) and
/// [`FrameWriter`](crate::FrameWriter).
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted or written. Default: 32 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = b"capture now";
        let wire = encode(MessageKind::CaptureRequest, payload).unwrap();

        assert_eq!(wire.len(), HEADER_SIZE + payload.len());

        match decode(&wire, DEFAULT_MAX_PAYLOAD) {
            Decoded::Frame { frame, consumed } => {
                assert_eq!(frame.kind, MessageKind::CaptureRequest);
                assert_eq!(frame.payload.as_ref(), payload);
                assert_eq!(consumed, wire.len());
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_idr_frame_layout() {
        let payload = vec![0u8; 1024];
        let wire = encode(MessageKind::IdrFrame, &payload).unwrap();

        assert_eq!(wire.len(), 1029);
        assert_eq!(&wire[..5], &[0x03, 0x00, 0x00, 0x04, 0x00]);
        assert!(wire[5..].iter().all(|b| *b == 0));

        let mut buf = BytesMut::from(wire.as_ref());
        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.kind, MessageKind::IdrFrame);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let buf = [0x03, 0x00, 0x00];
        assert!(matches!(decode(&buf, DEFAULT_MAX_PAYLOAD), Decoded::Incomplete));

        let mut buf = BytesMut::from(&buf[..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let wire = encode(MessageKind::Photo, b"jpeg-bytes").unwrap();
        let truncated = &wire[..HEADER_SIZE + 2];

        assert!(matches!(
            decode(truncated, DEFAULT_MAX_PAYLOAD),
            Decoded::Incomplete
        ));

        let mut buf = BytesMut::from(truncated);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn test_byte_by_byte_yields_exactly_one_frame() {
        let wire = encode(MessageKind::PFrame, b"delta").unwrap();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();

        for (i, byte) in wire.iter().enumerate() {
            buf.put_u8(*byte);
            if let Some(frame) = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap() {
                assert_eq!(i, wire.len() - 1, "frame emitted before final byte");
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, MessageKind::PFrame);
        assert_eq!(frames[0].payload.as_ref(), b"delta");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_unknown_kind() {
        for len in [0u32, 1, 16, 4096, u32::MAX] {
            let mut buf = BytesMut::new();
            buf.put_u8(0xEE);
            buf.put_u32(len);
            buf.put_slice(b"xy");

            assert!(matches!(
                decode(&buf, DEFAULT_MAX_PAYLOAD),
                Decoded::Invalid(FrameError::UnknownKind(0xEE))
            ));
            assert!(matches!(
                decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
                Err(FrameError::UnknownKind(0xEE))
            ));
        }
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageKind::Photo.as_u8());
        buf.put_u32(64 * 1024 * 1024);

        assert!(matches!(
            decode(&buf, DEFAULT_MAX_PAYLOAD),
            Decoded::Invalid(FrameError::PayloadTooLarge { .. })
        ));
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_header_alone_does_not_reserve_declared_length() {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageKind::IdrFrame.as_u8());
        buf.put_u32(16 * 1024 * 1024);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE);
        assert!(buf.capacity() < 1024 * 1024);

        // Repeated polls with no new bytes do not keep growing it.
        let capacity = buf.capacity();
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(MessageKind::Sps, b"sps", &mut buf).unwrap();
        encode_frame(MessageKind::Pps, b"pps", &mut buf).unwrap();

        let consumed = match decode(&buf, DEFAULT_MAX_PAYLOAD) {
            Decoded::Frame { frame, consumed } => {
                assert_eq!(frame.kind, MessageKind::Sps);
                consumed
            }
            other => panic!("expected frame, got {other:?}"),
        };
        match decode(&buf[consumed..], DEFAULT_MAX_PAYLOAD) {
            Decoded::Frame { frame, consumed } => {
                assert_eq!(frame.kind, MessageKind::Pps);
                assert_eq!(consumed, HEADER_SIZE + 3);
            }
            other => panic!("expected frame, got {other:?}"),
        }

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f1.payload.as_ref(), b"sps");
        assert_eq!(f2.payload.as_ref(), b"pps");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let wire = encode(MessageKind::Heartbeat, b"").unwrap();
        assert_eq!(wire.as_ref(), &[0x10, 0, 0, 0, 0]);

        let mut buf = BytesMut::from(wire.as_ref());
        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.kind, MessageKind::Heartbeat);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(MessageKind::Photo, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
        assert_eq!(Frame::empty(MessageKind::Disconnect).wire_size(), HEADER_SIZE);
    }
}
