//! Request Engine: one HTTP transaction, streamed back over serial.
//!
//! Errors raised before the response head is written become the single
//! error frame of the command. Once the head is out, a body failure is
//! reported on its own line after the bytes already relayed.

use tokio::time::timeout;
use tracing::{debug, warn};

use flipper_bridge_core::{BodyMode, BridgeConfig, BridgeError, RequestDescriptor, ResponseHead};
use flipper_bridge_protocol::{encode_head, Reply};

use crate::http::{HttpClient, ResponseBody, ResponseEnvelope};
use crate::transport::{write_chunked, write_reply, SerialTransport};

/// Run `request` through `http` and relay the response to `transport`.
///
/// Returns the head that was written. The response, and whatever connection
/// backs it, is dropped before this returns.
pub async fn execute<T, H>(
    transport: &mut T,
    http: &mut H,
    config: &BridgeConfig,
    request: &RequestDescriptor,
) -> Result<ResponseHead, BridgeError>
where
    T: SerialTransport,
    H: HttpClient,
{
    let wait = config.http_timeout();
    debug!("{} {} ({:?} mode)", request.method, request.url, request.mode);

    let envelope = match timeout(wait, http.send(request)).await {
        Ok(result) => result?,
        Err(_) => return Err(BridgeError::TransportTimeout(wait)),
    };

    match request.mode {
        BodyMode::Text => stream_response(transport, envelope, config).await,
        BodyMode::Bytes => match envelope.head.content_length {
            Some(_) => stream_response(transport, envelope, config).await,
            None => buffer_response(transport, envelope, config).await,
        },
    }
}

/// Head first, then the body as it arrives.
async fn stream_response<T, B>(
    transport: &mut T,
    envelope: ResponseEnvelope<B>,
    config: &BridgeConfig,
) -> Result<ResponseHead, BridgeError>
where
    T: SerialTransport,
    B: ResponseBody,
{
    let ResponseEnvelope { head, mut body } = envelope;
    transport.write_str(&encode_head(&head)).await?;

    if let Err(e) = relay_body(transport, &mut body, head.content_length, config).await {
        if e.is_fatal() {
            return Err(e);
        }
        warn!("Response body aborted: {}", e);
        transport.write(b"\n").await?;
        write_reply(transport, &Reply::error(&e)).await?;
        return Ok(head);
    }

    transport.flush().await?;
    Ok(head)
}

async fn relay_body<T, B>(
    transport: &mut T,
    body: &mut B,
    expected: Option<u64>,
    config: &BridgeConfig,
) -> Result<(), BridgeError>
where
    T: SerialTransport,
    B: ResponseBody,
{
    let wait = config.http_timeout();
    let mut written: u64 = 0;

    loop {
        if let Some(expected) = expected {
            if written >= expected {
                return Ok(());
            }
        }

        match timeout(wait, body.next_chunk()).await {
            Ok(Some(Ok(bytes))) => {
                let take = match expected {
                    Some(expected) => bytes.len().min((expected - written) as usize),
                    None => bytes.len(),
                };
                write_chunked(transport, &bytes[..take], config.serial_chunk_size).await?;
                written += take as u64;
            }
            Ok(Some(Err(e))) => return Err(e),
            Ok(None) => {
                return match expected {
                    Some(expected) if written < expected => Err(BridgeError::Connection(format!(
                        "Body ended after {} of {} bytes",
                        written, expected
                    ))),
                    _ => Ok(()),
                };
            }
            // Without a length, silence is the only end-of-body signal.
            Err(_) if expected.is_none() => return Ok(()),
            Err(_) => return Err(BridgeError::TransportTimeout(wait)),
        }
    }
}

/// Byte mode without a `Content-Length`: collect the body so the head can
/// carry its exact size.
async fn buffer_response<T, B>(
    transport: &mut T,
    envelope: ResponseEnvelope<B>,
    config: &BridgeConfig,
) -> Result<ResponseHead, BridgeError>
where
    T: SerialTransport,
    B: ResponseBody,
{
    let ResponseEnvelope { head, mut body } = envelope;
    let wait = config.http_timeout();
    let mut buffer = Vec::new();

    loop {
        match timeout(wait, body.next_chunk()).await {
            Ok(Some(Ok(bytes))) => {
                if buffer.len() + bytes.len() > config.max_buffered_body {
                    return Err(BridgeError::Validation(format!(
                        "Response body exceeds {} bytes",
                        config.max_buffered_body
                    )));
                }
                buffer.extend_from_slice(&bytes);
            }
            Ok(Some(Err(e))) => return Err(e),
            Ok(None) | Err(_) => break,
        }
    }
    drop(body);

    let head = ResponseHead::new(head.status, Some(buffer.len() as u64));
    transport.write_str(&encode_head(&head)).await?;
    write_chunked(transport, &buffer, config.serial_chunk_size).await?;
    transport.flush().await?;
    Ok(head)
}
