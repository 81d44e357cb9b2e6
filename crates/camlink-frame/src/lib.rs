//! Type-tagged, length-prefixed packet framing for camlink channels.
//!
//! Every packet on a mirroring or remote channel is framed with:
//! - A 1-byte [`MessageKind`] tag
//! - A 4-byte big-endian payload length
//! - The payload, verbatim
//!
//! Control commands and media buffers share the same framing and one
//! numbering space for the kind byte.

pub mod codec;
pub mod error;
pub mod kind;
#[cfg(feature = "async")]
pub mod packet;
pub mod reader;
pub mod writer;

pub use codec::{
    decode, decode_frame, encode, encode_frame, Decoded, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use kind::{Flavor, MessageKind};
#[cfg(feature = "async")]
pub use packet::PacketCodec;
pub use reader::FrameReader;
pub use writer::FrameWriter;
