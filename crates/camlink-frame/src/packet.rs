use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for camlink frames.
///
/// Decoding errors leave the buffer untouched. Callers that keep the stream
/// alive after a framing error must discard buffered bytes themselves.
#[derive(Debug, Clone)]
pub struct PacketCodec {
    max_payload: usize,
}

impl PacketCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for PacketCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.max_payload)
    }
}

impl Encoder<Frame> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.max_payload,
            });
        }
        encode_frame(item.kind, &item.payload, dst)
    }
}
