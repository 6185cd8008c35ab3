//! WebSocket client collaborator and large-message chunking.

use tracing::debug;

use flipper_bridge_core::{BridgeError, SocketTarget};
use flipper_bridge_protocol::{Chunker, CodecError};

/// A frame received from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// The remote end closed the session.
    Closed,
}

/// Lifecycle of the single WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Opens WebSocket sessions.
pub trait WebSocketConnector {
    type Session: WebSocketSession;

    async fn connect(&mut self, target: &SocketTarget) -> Result<Self::Session, BridgeError>;
}

/// One open WebSocket connection.
///
/// `recv` must be cancel safe; the session loop races it against serial input.
pub trait WebSocketSession {
    async fn send_text(&mut self, text: &str) -> Result<(), BridgeError>;

    /// Next data frame. `None` once the connection is gone.
    async fn recv(&mut self) -> Option<Result<InboundFrame, BridgeError>>;

    async fn close(&mut self) -> Result<(), BridgeError>;
}

/// Write `message` as consecutive text frames of at most `ceiling` bytes.
///
/// Returns the number of frames written once the last one has been accepted.
/// A failed frame aborts the rest; the error reports how much went out.
pub async fn send_large_message<S: WebSocketSession>(
    session: &mut S,
    message: &str,
    ceiling: usize,
) -> Result<usize, BridgeError> {
    let chunker = Chunker::text(message, ceiling).map_err(codec_error)?;
    let total = message.len();
    let mut sent = 0;
    let mut frames = 0;

    for chunk in chunker {
        let text = chunk.as_str().unwrap_or_default();
        if let Err(e) = session.send_text(text).await {
            return Err(BridgeError::TransportWrite {
                sent,
                total,
                reason: e.to_string(),
            });
        }
        sent += chunk.data.len();
        frames += 1;
    }

    if frames > 1 {
        debug!("Sent {} bytes as {} frames", total, frames);
    }
    Ok(frames)
}

fn codec_error(e: CodecError) -> BridgeError {
    BridgeError::Validation(e.to_string())
}

#[cfg(feature = "net")]
pub use self::tungstenite::{TungsteniteConnector, TungsteniteSession};

#[cfg(feature = "net")]
mod tungstenite {
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
    use tracing::{debug, info};

    use flipper_bridge_core::{BridgeError, SocketTarget};

    use super::{InboundFrame, WebSocketConnector, WebSocketSession};

    /// WebSocket client backed by `tokio-tungstenite` (ws:// and wss://).
    #[derive(Debug, Clone, Default)]
    pub struct TungsteniteConnector;

    impl TungsteniteConnector {
        pub fn new() -> Self {
            Self
        }
    }

    #[derive(Debug)]
    pub struct TungsteniteSession {
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    }

    impl WebSocketConnector for TungsteniteConnector {
        type Session = TungsteniteSession;

        async fn connect(&mut self, target: &SocketTarget) -> Result<TungsteniteSession, BridgeError> {
            let mut request = target
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| BridgeError::Parse(format!("Invalid WebSocket URL: {}", e)))?;

            for (name, value) in &target.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| BridgeError::Parse(format!("Invalid header name '{}': {}", name, e)))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| BridgeError::Parse(format!("Invalid header value: {}", e)))?;
                request.headers_mut().append(name, value);
            }

            let (stream, response) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| BridgeError::Connection(e.to_string()))?;
            info!("WebSocket connected to {} ({})", target.url, response.status());

            Ok(TungsteniteSession { stream })
        }
    }

    impl WebSocketSession for TungsteniteSession {
        async fn send_text(&mut self, text: &str) -> Result<(), BridgeError> {
            self.stream
                .send(Message::Text(text.to_string()))
                .await
                .map_err(|e| BridgeError::Connection(e.to_string()))
        }

        async fn recv(&mut self) -> Option<Result<InboundFrame, BridgeError>> {
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(InboundFrame::Text(text))),
                    Ok(Message::Binary(data)) => return Some(Ok(InboundFrame::Binary(data))),
                    Ok(Message::Close(frame)) => {
                        debug!("Remote closed WebSocket: {:?}", frame);
                        return Some(Ok(InboundFrame::Closed));
                    }
                    // Pings are answered by tungstenite itself.
                    Ok(_) => {}
                    Err(e) => return Some(Err(BridgeError::Connection(e.to_string()))),
                }
            }
        }

        async fn close(&mut self) -> Result<(), BridgeError> {
            self.stream
                .close(None)
                .await
                .map_err(|e| BridgeError::Connection(e.to_string()))
        }
    }
}
