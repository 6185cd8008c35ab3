//! HTTP client collaborator.
//!
//! The engine never parses HTTP itself. It hands a `RequestDescriptor` to an
//! `HttpClient` and gets back a `ResponseEnvelope`: the status, the announced
//! length, and a body read piece by piece. The envelope owns whatever
//! connection backs the body, so dropping it releases the connection on
//! every exit path.

use flipper_bridge_core::{BridgeError, RequestDescriptor, ResponseHead};

/// Readable response body.
pub trait ResponseBody {
    /// Next piece of the body. `None` at end of data.
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, BridgeError>>;
}

/// Status, announced length and body of one response.
#[derive(Debug)]
pub struct ResponseEnvelope<B> {
    pub head: ResponseHead,
    pub body: B,
}

/// Issues one HTTP request at a time.
pub trait HttpClient {
    type Body: ResponseBody;

    /// Send the request and resolve once the response head has arrived.
    ///
    /// Callers bound the wait; implementations need not time out themselves.
    async fn send(
        &mut self,
        request: &RequestDescriptor,
    ) -> Result<ResponseEnvelope<Self::Body>, BridgeError>;
}

#[cfg(feature = "net")]
pub use self::ureq_client::{ChannelBody, UreqClient};

#[cfg(feature = "net")]
mod ureq_client {
    use std::io::Read;
    use std::time::Duration;

    use tokio::sync::{mpsc, oneshot};
    use tracing::{debug, warn};

    use flipper_bridge_core::{BridgeError, RequestDescriptor, ResponseHead};

    use super::{HttpClient, ResponseBody, ResponseEnvelope};

    const READ_BUFFER: usize = 512;

    /// HTTP(S) client backed by `ureq`, run on tokio's blocking pool.
    ///
    /// The agent keeps no idle connections, so every transaction opens and
    /// closes its own socket.
    #[derive(Debug, Clone)]
    pub struct UreqClient {
        agent: ureq::Agent,
    }

    impl UreqClient {
        /// `io_timeout` bounds connecting and each socket read.
        pub fn new(io_timeout: Duration) -> Self {
            let agent = ureq::AgentBuilder::new()
                .timeout_connect(io_timeout)
                .timeout_read(io_timeout)
                .max_idle_connections(0)
                .max_idle_connections_per_host(0)
                .build();
            Self { agent }
        }
    }

    impl Default for UreqClient {
        fn default() -> Self {
            Self::new(Duration::from_secs(10))
        }
    }

    /// Body fed by the blocking worker that owns the connection.
    ///
    /// Dropping it makes the worker stop at its next read and close the socket.
    #[derive(Debug)]
    pub struct ChannelBody {
        chunks: mpsc::Receiver<Result<Vec<u8>, BridgeError>>,
    }

    impl ResponseBody for ChannelBody {
        async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, BridgeError>> {
            self.chunks.recv().await
        }
    }

    impl HttpClient for UreqClient {
        type Body = ChannelBody;

        async fn send(
            &mut self,
            request: &RequestDescriptor,
        ) -> Result<ResponseEnvelope<ChannelBody>, BridgeError> {
            let (head_tx, head_rx) = oneshot::channel();
            let (chunk_tx, chunk_rx) = mpsc::channel(4);
            let agent = self.agent.clone();
            let request = request.clone();

            tokio::task::spawn_blocking(move || {
                let mut call = agent.request(request.method.as_str(), &request.url);
                for (name, value) in &request.headers {
                    call = call.set(name, value);
                }
                let result = match &request.payload {
                    Some(payload) => call.send_string(payload),
                    None => call.call(),
                };

                let response = match result {
                    Ok(response) => response,
                    // Error statuses still carry a body worth forwarding.
                    Err(ureq::Error::Status(_, response)) => response,
                    Err(e) => {
                        let _ = head_tx.send(Err(BridgeError::Connection(e.to_string())));
                        return;
                    }
                };

                let head = ResponseHead::new(
                    response.status(),
                    response
                        .header("Content-Length")
                        .and_then(|len| len.trim().parse().ok()),
                );
                debug!("{} {} -> {}", request.method, request.url, head.status);
                if head_tx.send(Ok(head)).is_err() {
                    return;
                }

                let mut reader = response.into_reader();
                let mut buf = vec![0u8; READ_BUFFER];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if chunk_tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Body read failed for {}: {}", request.url, e);
                            let _ = chunk_tx.blocking_send(Err(BridgeError::Connection(
                                format!("Body read failed: {}", e),
                            )));
                            break;
                        }
                    }
                }
            });

            let head = head_rx.await.map_err(|_| {
                BridgeError::Connection("HTTP worker exited before a response".to_string())
            })??;

            Ok(ResponseEnvelope {
                head,
                body: ChannelBody { chunks: chunk_rx },
            })
        }
    }
}
