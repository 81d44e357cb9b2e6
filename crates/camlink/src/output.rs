use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use camlink_frame::{Flavor, Frame};
use camlink_session::{ChannelKind, DiagnosticsSnapshot, SessionEvent};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'static str,
    kind_byte: u8,
    flavor: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<ChannelKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<&'a str>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_frame(
    frame: &Frame,
    channel: Option<ChannelKind>,
    peer: Option<&str>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind: frame.kind.name(),
                kind_byte: frame.kind.as_u8(),
                flavor: flavor_name(frame.kind.flavor()),
                channel,
                peer,
                payload_size: frame.payload.len(),
                payload: payload_preview(frame.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "CHANNEL", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    frame.kind.name().to_string(),
                    channel.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                    frame.payload.len().to_string(),
                    peer.unwrap_or("-").to_string(),
                    payload_preview(frame.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} (0x{:02x}) channel={} size={} peer={} payload={}",
                frame.kind,
                frame.kind.as_u8(),
                channel.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                frame.payload.len(),
                peer.unwrap_or("-"),
                payload_preview(frame.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.payload.as_ref());
        }
    }
}

#[derive(Serialize)]
struct EventOutput {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<ChannelKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    timestamp: String,
}

pub fn print_event(event: &SessionEvent, format: OutputFormat) {
    let detail = event_detail(event);
    match format {
        OutputFormat::Json => print_json(&EventOutput {
            event: event.name(),
            channel: event.channel(),
            detail,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            let channel = event
                .channel()
                .map(|c| format!(" channel={c}"))
                .unwrap_or_default();
            let detail = detail.map(|d| format!(" {d}")).unwrap_or_default();
            println!("event={}{channel}{detail}", event.name());
        }
        OutputFormat::Raw => {}
    }
}

fn event_detail(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Connected { peer, .. } => Some(format!("peer={peer}")),
        SessionEvent::ConnectFailed { peer, error, .. } => Some(match peer {
            Some(peer) => format!("peer={peer} error={error}"),
            None => format!("error={error}"),
        }),
        SessionEvent::Disconnected { reason, .. } => Some(format!("reason={reason}")),
        SessionEvent::ReconnectPrompt { lost } => Some(lost.describe().to_string()),
        _ => None,
    }
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    address: &'a str,
}

/// Announce the bound address; always the first line a host prints.
pub fn print_listening(address: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            address,
        }),
        OutputFormat::Raw => {}
        _ => println!("listening on {address}"),
    }
}

pub fn print_diagnostics(snapshot: &DiagnosticsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(snapshot),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            for (name, value) in [
                ("malformed_frames", snapshot.malformed_frames),
                ("unhandled_frames", snapshot.unhandled_frames),
                ("dropped_frames", snapshot.dropped_frames),
                ("send_failures", snapshot.send_failures),
                ("heartbeat_timeouts", snapshot.heartbeat_timeouts),
            ] {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{snapshot:?}"),
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn flavor_name(flavor: Flavor) -> &'static str {
    match flavor {
        Flavor::Command => "command",
        Flavor::Media => "media",
    }
}

fn payload_preview(payload: &[u8]) -> String {
    if payload.is_empty() {
        return String::new();
    }
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ if payload.len() <= 16 => payload.iter().map(|b| format!("{b:02x}")).collect(),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_preview_prefers_text_then_hex() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0x05]), "05");
        assert_eq!(payload_preview(&[0u8; 64]), "<binary 64 bytes>");
        assert_eq!(payload_preview(&[]), "");
    }
}
