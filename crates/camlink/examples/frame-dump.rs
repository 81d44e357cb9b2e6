//! Encode a short capture session into a buffer and dump it frame by frame.
//!
//! Run with:
//!   cargo run --example frame-dump

use std::io::Cursor;

use camlink::frame::{FrameReader, FrameWriter, MessageKind, HEADER_SIZE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = FrameWriter::new(Vec::new());
    writer.send(MessageKind::Sps, &[0x67, 0x42, 0x00, 0x1f])?;
    writer.send(MessageKind::Pps, &[0x68, 0xce, 0x3c, 0x80])?;
    writer.send(MessageKind::IdrFrame, &[0x65; 64])?;
    writer.send(MessageKind::Heartbeat, &[])?;
    writer.send(MessageKind::SelectedTimerMode, &[3])?;
    writer.send(MessageKind::CaptureRequest, &[])?;
    let wire = writer.into_inner();

    let mut reader = FrameReader::new(Cursor::new(wire));
    let mut offset = 0usize;
    while let Some(frame) = reader.next_frame()? {
        println!(
            "{offset:>6}  0x{:02x} {:<18} {:>4} bytes",
            frame.kind.as_u8(),
            frame.kind.name(),
            frame.payload.len()
        );
        offset += HEADER_SIZE + frame.payload.len();
    }
    Ok(())
}
