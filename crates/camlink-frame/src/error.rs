/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The kind byte does not map to a known message kind.
    #[error("unknown message kind 0x{0:02x}")]
    UnknownKind(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
