//! WebSocket session loop.
//!
//! While a session is open the bridge relays in both directions: each serial
//! line goes out as a (possibly chunked) text message, each inbound frame is
//! written to serial. `[SOCKET/STOP]`, a remote close, a failure or the idle
//! deadline ends the session; the command dispatcher resumes afterwards.

use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use flipper_bridge_core::{BridgeConfig, BridgeError, SocketTarget};
use flipper_bridge_protocol::{Command, CommandFrame, Reply};

use crate::socket::{send_large_message, InboundFrame, SessionState, WebSocketConnector, WebSocketSession};
use crate::transport::{write_chunked, write_reply, SerialTransport};

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// `[SOCKET/STOP]` from the host.
    Stopped,
    RemoteClosed,
    /// The serial link closed; nothing more is written to it.
    TransportClosed,
    IdleTimeout,
    Failed(BridgeError),
}

/// Open a session to `target` and relay until it ends.
///
/// Connection failures are returned before `[SOCKET/CONNECTED]` is written.
/// Once connected, the session is always closed and `[SOCKET/STOPPED]`
/// written (unless the serial link itself is gone).
pub async fn run_session<T, C>(
    transport: &mut T,
    connector: &mut C,
    config: &BridgeConfig,
    target: &SocketTarget,
) -> Result<SessionEnd, BridgeError>
where
    T: SerialTransport,
    C: WebSocketConnector,
{
    let mut state = SessionState::Connecting;
    debug!("WebSocket {:?}: {}", state, target.url);

    let wait = config.socket_connect_timeout();
    let mut session = match timeout(wait, connector.connect(target)).await {
        Ok(result) => result?,
        Err(_) => return Err(BridgeError::TransportTimeout(wait)),
    };
    state = SessionState::Connected;
    info!("WebSocket {:?}: {}", state, target.url);
    write_reply(
        transport,
        &Reply::SocketConnected(format!("Connected to {}.", target.url)),
    )
    .await?;

    let idle = config.socket_idle_timeout();
    let mut last_activity = Instant::now();

    let end = loop {
        let deadline = idle.map(|idle| last_activity + idle);

        tokio::select! {
            line = transport.read_line() => {
                let Some(line) = line? else {
                    break SessionEnd::TransportClosed;
                };
                if line.is_empty() {
                    continue;
                }
                if CommandFrame::parse(&line).map(|frame| frame.command) == Some(Command::SocketStop) {
                    break SessionEnd::Stopped;
                }
                last_activity = Instant::now();
                if let Err(e) = send_large_message(&mut session, &line, config.socket_chunk_size).await {
                    break SessionEnd::Failed(e);
                }
            }
            frame = session.recv() => {
                last_activity = Instant::now();
                match frame {
                    Some(Ok(InboundFrame::Text(text))) => {
                        let mut line = text.into_bytes();
                        line.push(b'\n');
                        write_chunked(transport, &line, config.serial_chunk_size).await?;
                        transport.flush().await?;
                    }
                    Some(Ok(InboundFrame::Binary(data))) => {
                        write_chunked(transport, &data, config.serial_chunk_size).await?;
                        transport.flush().await?;
                    }
                    Some(Ok(InboundFrame::Closed)) | None => break SessionEnd::RemoteClosed,
                    Some(Err(e)) => break SessionEnd::Failed(e),
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                break SessionEnd::IdleTimeout;
            }
        }
    };

    state = SessionState::Closing;
    debug!("WebSocket {:?}: {:?}", state, end);
    if let Err(e) = session.close().await {
        debug!("Close handshake failed: {}", e);
    }
    drop(session);
    state = SessionState::Disconnected;
    info!("WebSocket {:?} from {}", state, target.url);

    match &end {
        SessionEnd::TransportClosed => return Ok(end),
        SessionEnd::Failed(e) => {
            warn!("WebSocket session failed: {}", e);
            write_reply(transport, &Reply::error(e)).await?;
        }
        SessionEnd::IdleTimeout => {
            write_reply(transport, &Reply::Error("WebSocket idle timeout.".to_string())).await?;
        }
        SessionEnd::Stopped | SessionEnd::RemoteClosed => {}
    }
    write_reply(
        transport,
        &Reply::SocketStopped(format!("Disconnected from {}.", target.url)),
    )
    .await?;

    Ok(end)
}
