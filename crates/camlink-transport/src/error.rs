use crate::traits::PeerId;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind a listening address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to open a stream to the peer.
    #[error("failed to connect to {peer}: {source}")]
    Connect {
        peer: PeerId,
        source: std::io::Error,
    },

    /// No peer with this identifier is known to the transport.
    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    /// Failed to accept an incoming stream.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The service name could not be sent or understood.
    #[error("invalid service name: {0}")]
    InvalidService(String),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream has been closed.
    #[error("stream closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
