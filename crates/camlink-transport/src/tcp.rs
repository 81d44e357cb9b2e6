//! TCP transport.
//!
//! The opener writes a one-byte length followed by the UTF-8 service name
//! before any channel traffic, so the acceptor can tell a mirroring stream
//! from a remote one. After that the stream carries channel bytes only.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Inbound, Incoming, Link, PeerId, StreamHandle, Transport, TransportEvent};

/// Maximum service name length that fits the preamble.
pub const MAX_SERVICE_LEN: usize = u8::MAX as usize;

const PREAMBLE_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Opens TCP streams; peers are addressed as `host:port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, peer: &PeerId, service: &str) -> Result<Link> {
        validate_service(service)?;

        let mut stream =
            TcpStream::connect(peer.as_str())
                .await
                .map_err(|source| TransportError::Connect {
                    peer: peer.clone(),
                    source,
                })?;
        stream.set_nodelay(true)?;

        let mut preamble = Vec::with_capacity(1 + service.len());
        preamble.push(service.len() as u8);
        preamble.extend_from_slice(service.as_bytes());
        stream.write_all(&preamble).await?;

        debug!(%peer, service, "tcp stream opened");
        Ok(spawn_link(stream, peer.clone()))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// Accepts TCP streams and reads their service preamble.
pub struct TcpAcceptor {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TcpAcceptor {
    /// Bind a listening socket and start accepting in the background.
    pub async fn bind(addr: &str) -> Result<(Self, Incoming)> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening for camlink peers");

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(accept_loop(listener, tx, shutdown.clone()));

        Ok((
            Self {
                local_addr,
                shutdown,
            },
            rx,
        ))
    }

    /// The bound address (useful after binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Established streams are unaffected.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TcpAcceptor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::UnboundedSender<Inbound>,
    shutdown: CancellationToken,
) {
    loop {
        let (mut stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "tcp accept failed");
                    continue;
                }
            },
        };

        let tx = tx.clone();
        tokio::spawn(async move {
            let service = match tokio::time::timeout(PREAMBLE_TIMEOUT, read_service(&mut stream)).await
            {
                Ok(Ok(service)) => service,
                Ok(Err(err)) => {
                    warn!(%addr, error = %err, "rejecting stream with bad preamble");
                    return;
                }
                Err(_) => {
                    warn!(%addr, "rejecting stream: no preamble within {PREAMBLE_TIMEOUT:?}");
                    return;
                }
            };
            if let Err(err) = stream.set_nodelay(true) {
                debug!(%addr, error = %err, "set_nodelay failed");
            }

            let from = PeerId::new(addr.to_string());
            debug!(peer = %from, %service, "accepted tcp stream");
            let link = spawn_link(stream, from.clone());
            if tx
                .send(Inbound {
                    from,
                    service,
                    link,
                })
                .is_err()
            {
                debug!(%addr, "incoming queue dropped; discarding stream");
            }
        });
    }
    debug!("tcp accept loop stopped");
}

async fn read_service(stream: &mut TcpStream) -> Result<String> {
    let len = stream.read_u8().await? as usize;
    if len == 0 {
        return Err(TransportError::InvalidService("empty".to_string()));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|_| TransportError::InvalidService("not UTF-8".to_string()))
}

fn validate_service(service: &str) -> Result<()> {
    if service.is_empty() || service.len() > MAX_SERVICE_LEN {
        return Err(TransportError::InvalidService(format!(
            "length {} (must be 1..={MAX_SERVICE_LEN})",
            service.len()
        )));
    }
    Ok(())
}

fn spawn_link(stream: TcpStream, peer: PeerId) -> Link {
    let (read_half, write_half) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    tokio::spawn(write_loop(write_half, out_rx, shutdown.clone()));
    tokio::spawn(read_loop(read_half, in_tx, shutdown.clone()));

    Link {
        handle: Arc::new(TcpHandle {
            peer,
            outbound: out_tx,
            shutdown,
        }),
        inbound: in_rx,
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                // Flush what was queued before close.
                while let Ok(bytes) = rx.try_recv() {
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                break;
            }
            next = rx.recv() => match next {
                Some(bytes) => {
                    if let Err(err) = writer.write_all(&bytes).await {
                        debug!(error = %err, "tcp write failed");
                        shutdown.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    tx: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
) {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            read = reader.read(&mut chunk) => match read {
                Ok(0) => break None,
                Ok(n) => {
                    let bytes = Bytes::copy_from_slice(&chunk[..n]);
                    if tx.send(TransportEvent::Received(bytes)).is_err() {
                        shutdown.cancel();
                        return;
                    }
                }
                Err(err) => break Some(err.to_string()),
            },
        }
    };
    shutdown.cancel();
    let _ = tx.send(TransportEvent::Closed { reason });
}

#[derive(Debug)]
struct TcpHandle {
    peer: PeerId,
    outbound: mpsc::UnboundedSender<Bytes>,
    shutdown: CancellationToken,
}

impl StreamHandle for TcpHandle {
    fn peer_id(&self) -> &PeerId {
        &self.peer
    }

    fn write(&self, bytes: Bytes) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(bytes)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.shutdown.cancel();
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
