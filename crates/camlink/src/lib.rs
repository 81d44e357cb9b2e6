//! Peer session and streaming protocol engine.
//!
//! camlink links a camera device to a display peer (live mirroring) and to a
//! wearable controller (remote commands) over a peer-to-peer byte stream, and
//! keeps those links alive across an unreliable transport.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transport abstraction (in-memory, TCP)
//! - [`frame`]: type-tagged, length-prefixed packet framing
//! - [`session`]: channels, heartbeats, reconnection policy and the session
//!   coordinator (behind the `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use camlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use camlink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use camlink_session::*;
}
