use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::kind::MessageKind;

/// Writes whole frames to a [`Write`] sink.
///
/// Each call encodes into a scratch buffer first, so an oversized payload
/// leaves the sink untouched.
pub struct FrameWriter<W> {
    sink: W,
    scratch: BytesMut,
    max_payload: usize,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(sink: W) -> Self {
        Self::with_config(sink, FrameConfig::default())
    }

    pub fn with_config(sink: W, config: FrameConfig) -> Self {
        Self {
            sink,
            scratch: BytesMut::new(),
            max_payload: config.max_payload_size,
        }
    }

    /// Encode one frame, write it and flush.
    pub fn send(&mut self, kind: MessageKind, payload: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.push(kind, payload)?;
        self.drain()
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.kind, frame.payload.as_ref())
    }

    /// Write several frames back to back with a single flush. Nothing is
    /// written if any payload is over the limit. Returns the byte count.
    pub fn write_frames<'a>(
        &mut self,
        frames: impl IntoIterator<Item = &'a Frame>,
    ) -> Result<usize> {
        self.scratch.clear();
        for frame in frames {
            self.push(frame.kind, frame.payload.as_ref())?;
        }
        let written = self.scratch.len();
        self.drain()?;
        Ok(written)
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn push(&mut self, kind: MessageKind, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }
        encode_frame(kind, payload, &mut self.scratch)
    }

    fn drain(&mut self) -> Result<()> {
        self.sink
            .write_all(&self.scratch)
            .and_then(|()| self.sink.flush())
            .map_err(|err| match err.kind() {
                ErrorKind::WriteZero => FrameError::ConnectionClosed,
                _ => FrameError::Io(err),
            })
    }
}
