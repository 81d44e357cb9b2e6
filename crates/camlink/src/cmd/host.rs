use std::sync::Arc;

use camlink_session::{
    ChannelRole, LostChannels, Session, SessionConfig, SessionError, SessionEvent,
};
use camlink_transport::{TcpAcceptor, TcpTransport};
use tracing::{debug, info};

use crate::cmd::{build_runtime, subscribe_all, HostArgs, LossAction};
use crate::exit::{io_error, session_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_diagnostics, print_event, print_frame, print_listening, OutputFormat};

pub fn run(args: HostArgs, format: OutputFormat, config: SessionConfig) -> CliResult<i32> {
    build_runtime()?.block_on(serve(args, format, config))
}

async fn serve(args: HostArgs, format: OutputFormat, config: SessionConfig) -> CliResult<i32> {
    let (acceptor, incoming) = TcpAcceptor::bind(&args.listen)
        .await
        .map_err(|err| transport_error("bind failed", err))?;
    let local = acceptor.local_addr().to_string();

    let (session, mut events) = Session::start(
        ChannelRole::Host,
        local.as_str(),
        Arc::new(TcpTransport::new()),
        config,
    )
    .map_err(|err| session_error("session start failed", err))?;
    let mut frames = subscribe_all(&session).await?;
    let accepting = session.accept_from(incoming);
    print_listening(&local, format);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    let outcome = loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(err) = signal {
                    break Err(io_error("signal handler setup failed", err));
                }
                info!("interrupted; shutting down");
                break Ok(SUCCESS);
            }
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event, format);
                    if let SessionEvent::ReconnectPrompt { lost } = event {
                        answer_prompt(&session, args.on_loss, lost).await?;
                    }
                }
                None => break Ok(SUCCESS),
            },
            frame = frames.recv() => match frame {
                Some(inbound) => {
                    print_frame(
                        &inbound.frame,
                        Some(inbound.channel),
                        Some(inbound.peer.as_str()),
                        format,
                    );
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        break Ok(SUCCESS);
                    }
                }
                None => break Ok(SUCCESS),
            },
        }
    };

    acceptor.shutdown();
    accepting.abort();
    if args.stats {
        print_diagnostics(&session.diagnostics(), format);
    }
    if let Err(err) = session.shutdown().await {
        debug!(error = %err, "session already stopped");
    }
    outcome
}

async fn answer_prompt(session: &Session, action: LossAction, lost: LostChannels) -> CliResult<()> {
    let answer = match action {
        LossAction::Reconnect => {
            info!(%lost, "waiting for peer to reconnect");
            session.confirm_reconnect().await
        }
        LossAction::Reset => {
            info!(%lost, "resetting to home");
            session.cancel_reconnect().await
        }
    };
    match answer {
        // A later prompt already superseded this one.
        Err(SessionError::NoPendingReconnect) => Ok(()),
        other => other.map_err(|err| session_error("reconnect prompt", err)),
    }
}
