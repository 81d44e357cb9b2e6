use std::path::PathBuf;
use std::time::Duration;

use camlink_frame::MessageKind;
use camlink_session::{ChannelKind, InboundFrame, Session, SessionConfig};
use clap::{Args, Subcommand, ValueEnum};
use tokio::sync::mpsc;

use crate::exit::{io_error, session_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod decode;
pub mod encode;
pub mod host;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept peers as the camera side and print what they send.
    Host(HostArgs),
    /// Open a channel to a host as a peer and send frames.
    Connect(ConnectArgs),
    /// Write one encoded frame to a file or stdout.
    Encode(EncodeArgs),
    /// Read encoded frames from a file or stdin and print them.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: Option<PathBuf>) -> CliResult<i32> {
    match command {
        Command::Host(args) => host::run(args, format, load_config(config)?),
        Command::Connect(args) => connect::run(args, format, load_config(config)?),
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Address to accept peers on.
    #[arg(long, default_value = "127.0.0.1:7878")]
    pub listen: String,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// What to do when a channel is lost.
    #[arg(long, value_enum, default_value = "reconnect")]
    pub on_loss: LossAction,
    /// Print session counters on exit.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LossAction {
    /// Wait for the peer to come back.
    Reconnect,
    /// Close everything and go back to waiting.
    Reset,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Host address (`host:port`).
    pub peer: String,
    /// Channel to open.
    #[arg(long, short = 'c', default_value = "mirroring")]
    pub channel: ChannelKind,
    /// Frame kind to send (name or 0x-prefixed value). Nothing is sent if omitted.
    #[arg(long, short = 'k')]
    pub kind: Option<MessageKind>,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Send the frame N times.
    #[arg(long, default_value = "1")]
    pub count: usize,
    /// Wait for one inbound frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Override the configured connect timeout.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Print session counters on exit.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame kind (name or 0x-prefixed value).
    pub kind: MessageKind,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Write to this file instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File to read. Default: stdin.
    pub path: Option<PathBuf>,
    /// Largest payload to accept.
    #[arg(long)]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload (e.g. 0a ff or 0aff).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    /// The payload bytes; empty when no source was given.
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(hex) = &self.hex {
            return parse_hex(hex);
        }
        if let Some(path) = &self.file {
            return std::fs::read(path)
                .map_err(|err| io_error(&format!("read {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

fn load_config(path: Option<PathBuf>) -> CliResult<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(&path)
            .map_err(|err| session_error(&format!("load config {}", path.display()), err)),
        None => Ok(SessionConfig::default()),
    }
}

pub(crate) fn build_runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))
}

/// Subscribe to every kind an application may handle and merge the
/// subscriptions into one queue.
pub(crate) async fn subscribe_all(
    session: &Session,
) -> CliResult<mpsc::UnboundedReceiver<InboundFrame>> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in MessageKind::ALL {
        if kind.is_heartbeat() || kind == MessageKind::Disconnect {
            continue;
        }
        let mut frames = session
            .subscribe(kind)
            .await
            .map_err(|err| session_error("subscribe failed", err))?;
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if tx.send(frame).is_err() {
                    break;
                }
            }
        });
    }
    Ok(rx)
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex payload needs an even number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex payload: {input}")))
        })
        .collect()
}
