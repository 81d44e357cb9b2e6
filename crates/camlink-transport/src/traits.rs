use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Opaque identifier of a remote device, as understood by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Something the transport delivers for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes in arrival order. Chunk boundaries carry no meaning.
    Received(Bytes),
    /// The stream ended, with an optional reason from the transport.
    Closed { reason: Option<String> },
}

/// Write side of an established stream.
///
/// Handles are shared: the transport owns the stream, callers borrow it for
/// writing and may request it be closed.
pub trait StreamHandle: Send + Sync + fmt::Debug {
    /// The peer at the other end.
    fn peer_id(&self) -> &PeerId;

    /// Queue bytes for delivery. Never blocks.
    fn write(&self, bytes: Bytes) -> Result<()>;

    /// Close the stream. Idempotent.
    fn close(&self);

    /// Whether [`StreamHandle::close`] was called or the stream ended.
    fn is_closed(&self) -> bool;
}

/// An established stream: shared write handle plus the inbound event queue.
#[derive(Debug)]
pub struct Link {
    pub handle: Arc<dyn StreamHandle>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// A stream another peer opened towards us.
#[derive(Debug)]
pub struct Inbound {
    /// Who opened it.
    pub from: PeerId,
    /// The service name it was opened for.
    pub service: String,
    pub link: Link,
}

/// Queue of accepted inbound streams.
pub type Incoming = mpsc::UnboundedReceiver<Inbound>;

/// Outbound side of the transport collaborator.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a stream to `peer` for `service`.
    async fn open(&self, peer: &PeerId, service: &str) -> Result<Link>;

    /// Transport name for diagnostics.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_conversions() {
        let a = PeerId::from("camera");
        let b = PeerId::from(String::from("camera"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "camera");
        assert_eq!(a.to_string(), "camera");
    }
}
