//! Blocking frame input for capture files, pipes and sockets.

use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Pulls whole frames out of a [`Read`] source, buffering partial reads.
pub struct FrameReader<R> {
    source: R,
    pending: BytesMut,
    max_payload: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, FrameConfig::default())
    }

    pub fn with_config(source: R, config: FrameConfig) -> Self {
        Self {
            source,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            max_payload: config.max_payload_size,
        }
    }

    /// Read the next frame, blocking until it is complete.
    ///
    /// End of input yields [`FrameError::ConnectionClosed`], whether it falls
    /// between frames or inside one.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.pending, self.max_payload)? {
                return Ok(frame);
            }
            if self.fill()? == 0 {
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Like [`read_frame`](Self::read_frame), but a clean end of input
    /// between frames is `Ok(None)`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.read_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(FrameError::ConnectionClosed) if self.pending.is_empty() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Iterate frames until a clean end of input. The first error ends the
    /// iteration.
    pub fn frames(&mut self) -> Frames<'_, R> {
        Frames {
            reader: self,
            done: false,
        }
    }

    /// Bytes read but not yet part of a returned frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn fill(&mut self) -> Result<usize> {
        let start = self.pending.len();
        self.pending.resize(start + READ_CHUNK_SIZE, 0);
        let read = loop {
            match self.source.read(&mut self.pending[start..]) {
                Ok(n) => break Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(FrameError::Io(err)),
            }
        };
        let filled = match &read {
            Ok(n) => start + n,
            Err(_) => start,
        };
        self.pending.truncate(filled);
        read
    }
}

/// Iterator returned by [`FrameReader::frames`].
pub struct Frames<'a, R> {
    reader: &'a mut FrameReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Frames<'_, R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
