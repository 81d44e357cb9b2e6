//! In-process transport.
//!
//! Endpoints registered on one [`MemoryNetwork`] can open streams to each
//! other. Taking an endpoint offline makes the network silently swallow every
//! byte to and from it, which is how a peer that walked out of radio range
//! looks from the other side: no error, just silence.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Inbound, Incoming, Link, PeerId, StreamHandle, Transport, TransportEvent};

struct Endpoint {
    inbound: mpsc::UnboundedSender<Inbound>,
    online: Arc<AtomicBool>,
}

/// Registry of in-process endpoints.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<HashMap<PeerId, Endpoint>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an endpoint and return its transport plus the
    /// queue of streams other endpoints open towards it.
    pub fn endpoint(&self, id: impl Into<PeerId>) -> (MemoryTransport, Incoming) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let online = Arc::new(AtomicBool::new(true));

        self.lock().insert(
            id.clone(),
            Endpoint {
                inbound: tx,
                online: Arc::clone(&online),
            },
        );
        debug!(peer = %id, "memory endpoint registered");

        let transport = MemoryTransport {
            local: id,
            network: self.clone(),
            online,
        };
        (transport, rx)
    }

    /// Bring an endpoint on or off the network.
    ///
    /// While offline, opens to or from it fail and bytes on its existing
    /// streams are dropped without any error or close notification.
    pub fn set_online(&self, id: &PeerId, online: bool) {
        if let Some(endpoint) = self.lock().get(id) {
            endpoint.online.store(online, Ordering::SeqCst);
            debug!(peer = %id, online, "memory endpoint reachability changed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, Endpoint>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One endpoint's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
    online: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Identifier other endpoints see for this one.
    pub fn local_id(&self) -> &PeerId {
        &self.local
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, peer: &PeerId, service: &str) -> Result<Link> {
        let (remote_inbound, remote_online) = {
            let endpoints = self.network.lock();
            let endpoint = endpoints
                .get(peer)
                .ok_or_else(|| TransportError::PeerNotFound(peer.clone()))?;
            (endpoint.inbound.clone(), Arc::clone(&endpoint.online))
        };

        if !self.online.load(Ordering::SeqCst) || !remote_online.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                peer: peer.clone(),
                source: io::Error::new(io::ErrorKind::NotConnected, "peer unreachable"),
            });
        }

        let (to_remote, remote_rx) = mpsc::unbounded_channel();
        let (to_local, local_rx) = mpsc::unbounded_channel();

        let local_handle = MemoryHandle {
            peer: peer.clone(),
            tx: to_remote,
            closed: AtomicBool::new(false),
            local_online: Arc::clone(&self.online),
            remote_online: Arc::clone(&remote_online),
        };
        let remote_handle = MemoryHandle {
            peer: self.local.clone(),
            tx: to_local,
            closed: AtomicBool::new(false),
            local_online: remote_online,
            remote_online: Arc::clone(&self.online),
        };

        remote_inbound
            .send(Inbound {
                from: self.local.clone(),
                service: service.to_string(),
                link: Link {
                    handle: Arc::new(remote_handle),
                    inbound: remote_rx,
                },
            })
            .map_err(|_| TransportError::Connect {
                peer: peer.clone(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "peer not accepting"),
            })?;

        debug!(from = %self.local, to = %peer, service, "memory stream opened");
        Ok(Link {
            handle: Arc::new(local_handle),
            inbound: local_rx,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug)]
struct MemoryHandle {
    peer: PeerId,
    tx: mpsc::UnboundedSender<TransportEvent>,
    closed: AtomicBool,
    local_online: Arc<AtomicBool>,
    remote_online: Arc<AtomicBool>,
}

impl MemoryHandle {
    fn reachable(&self) -> bool {
        self.local_online.load(Ordering::SeqCst) && self.remote_online.load(Ordering::SeqCst)
    }
}

impl StreamHandle for MemoryHandle {
    fn peer_id(&self) -> &PeerId {
        &self.peer
    }

    fn write(&self, bytes: Bytes) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.reachable() {
            return Ok(());
        }
        self.tx
            .send(TransportEvent::Received(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.reachable() {
            let _ = self.tx.send(TransportEvent::Closed {
                reason: Some("closed by peer".to_string()),
            });
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}
