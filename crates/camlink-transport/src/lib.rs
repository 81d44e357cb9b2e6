//! Peer-to-peer byte-stream transport abstraction.
//!
//! camlink does not discover peers or negotiate sessions itself. It consumes
//! a narrow collaborator interface:
//! - [`Transport::open`] establishes an outbound stream to a peer for a service
//! - [`Incoming`] yields streams other peers opened towards us
//! - every stream is a [`Link`]: a shared [`StreamHandle`] for writes and a
//!   queue of [`TransportEvent`]s for whatever arrives
//!
//! Two implementations ship here: an in-process [`MemoryNetwork`] used by tests
//! and demos, and a tokio TCP transport for running across machines.

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::{TcpAcceptor, TcpTransport};
pub use traits::{Inbound, Incoming, Link, PeerId, StreamHandle, Transport, TransportEvent};
