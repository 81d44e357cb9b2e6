use std::sync::Arc;
use std::time::Duration;

use camlink_frame::{Frame, MessageKind};
use camlink_session::{
    check_outbound, ChannelKind, ChannelRole, Session, SessionConfig, SessionEvent,
    SessionEvents,
};
use camlink_transport::TcpTransport;
use tracing::debug;

use crate::cmd::{build_runtime, parse_duration, subscribe_all, ConnectArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::{print_diagnostics, print_event, print_frame, OutputFormat};

/// Time left for the transport to flush the final `disconnect` before exit.
const LINGER: Duration = Duration::from_millis(100);

pub fn run(args: ConnectArgs, format: OutputFormat, mut config: SessionConfig) -> CliResult<i32> {
    if let Some(timeout) = &args.timeout {
        config.connect_timeout = parse_duration(timeout)?;
    }
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let frame = match args.kind {
        Some(kind) => Some(build_frame(kind, args.payload.resolve()?)?),
        None => None,
    };

    build_runtime()?.block_on(async {
        let (session, mut events) = Session::start(
            ChannelRole::Peer,
            "camlink-cli",
            Arc::new(TcpTransport::new()),
            config,
        )
        .map_err(|err| session_error("session start failed", err))?;

        let outcome = exchange(&session, &mut events, &args, frame, wait_timeout, format).await;

        if args.stats {
            print_diagnostics(&session.diagnostics(), format);
        }
        if let Err(err) = session.shutdown().await {
            debug!(error = %err, "session already stopped");
        }
        tokio::time::sleep(LINGER).await;
        outcome
    })
}

async fn exchange(
    session: &Session,
    events: &mut SessionEvents,
    args: &ConnectArgs,
    frame: Option<Frame>,
    wait_timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut inbound = match args.wait {
        true => Some(subscribe_all(session).await?),
        false => None,
    };

    session
        .connect(args.channel, args.peer.as_str())
        .await
        .map_err(|err| session_error("connect failed", err))?;
    wait_connected(events, args.channel, format).await?;

    if let Some(frame) = frame {
        for _ in 0..args.count {
            session
                .send(args.channel, frame.kind, frame.payload.clone())
                .await
                .map_err(|err| session_error("send failed", err))?;
        }
    }

    if let Some(frames) = inbound.as_mut() {
        match tokio::time::timeout(wait_timeout, frames.recv()).await {
            Ok(Some(reply)) => print_frame(
                &reply.frame,
                Some(reply.channel),
                Some(reply.peer.as_str()),
                format,
            ),
            Ok(None) => return Err(CliError::new(INTERNAL, "session stopped while waiting")),
            Err(_) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no frame within {wait_timeout:?}"),
                ))
            }
        }
    }

    session
        .disconnect(args.channel)
        .await
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

async fn wait_connected(
    events: &mut SessionEvents,
    channel: ChannelKind,
    format: OutputFormat,
) -> CliResult<()> {
    loop {
        let Some(event) = events.recv().await else {
            return Err(CliError::new(INTERNAL, "session stopped while connecting"));
        };
        print_event(&event, format);
        match event {
            SessionEvent::Connected { channel: c, .. } if c == channel => return Ok(()),
            SessionEvent::ConnectFailed {
                channel: c, error, ..
            } if c == channel => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    format!("connect failed: {error}"),
                ))
            }
            _ => {}
        }
    }
}

/// Command kinds must carry a payload their receiver will accept.
fn build_frame(kind: MessageKind, payload: Vec<u8>) -> CliResult<Frame> {
    let frame = Frame::new(kind, payload);
    check_outbound(&frame).map_err(|err| session_error("cannot send frame", err))?;
    Ok(frame)
}
