//! Serial transport capability.
//!
//! Every board variant exposes its UART differently. The engine only sees
//! this trait; the concrete backend is chosen where the bridge is built.
//! `StreamTransport` adapts any tokio byte stream (stdio, a TCP socket, a
//! UART driver, `tokio::io::duplex` in tests).

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use flipper_bridge_core::BridgeError;
use flipper_bridge_protocol::{Chunker, Reply};

/// Default wait used by the timed reads.
pub const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Byte-oriented duplex link to the host device.
///
/// Line reads must be cancel safe: dropping a pending `read_line` future
/// must not lose bytes already received.
pub trait SerialTransport {
    /// Bytes received but not yet consumed.
    fn available(&self) -> usize;

    /// Wait used by `read_line_timeout` and `read`.
    fn set_timeout(&mut self, timeout: Duration);

    fn timeout(&self) -> Duration;

    /// Wait for the next line, without a time limit.
    ///
    /// The line is returned trimmed. `None` means the link was closed.
    async fn read_line(&mut self) -> Result<Option<String>, BridgeError>;

    /// Wait for the next line for at most `timeout()`.
    ///
    /// `None` means nothing complete arrived in time or the link closed.
    async fn read_line_timeout(&mut self) -> Result<Option<String>, BridgeError>;

    /// Read raw bytes, waiting at most `timeout()`. Returns 0 on timeout.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, BridgeError>;

    async fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    async fn flush(&mut self) -> Result<(), BridgeError>;

    /// Drop everything received but not yet consumed.
    fn discard_input(&mut self) -> usize;

    async fn write_str(&mut self, text: &str) -> Result<(), BridgeError> {
        self.write(text.as_bytes()).await
    }
}

/// Write one reply line and flush it.
pub async fn write_reply<T: SerialTransport>(transport: &mut T, reply: &Reply) -> Result<(), BridgeError> {
    transport.write_str(&reply.encode()).await?;
    transport.flush().await
}

/// Write `bytes` in pieces of at most `ceiling` bytes.
pub async fn write_chunked<T: SerialTransport>(
    transport: &mut T,
    bytes: &[u8],
    ceiling: usize,
) -> Result<(), BridgeError> {
    let chunker = Chunker::bytes(bytes, ceiling).map_err(|e| BridgeError::Validation(e.to_string()))?;
    for chunk in chunker {
        transport.write(chunk.data).await?;
    }
    Ok(())
}

/// Serial transport over a pair of tokio byte streams.
#[derive(Debug)]
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
    buffer: Vec<u8>,
    timeout: Duration,
    eof: bool,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::new(),
            timeout: DEFAULT_SERIAL_TIMEOUT,
            eof: false,
        }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Pull whatever the reader has into the buffer.
    async fn fill(&mut self) -> Result<usize, BridgeError> {
        let mut chunk = [0u8; 256];
        let n = self.reader.read(&mut chunk).await?;
        if n == 0 {
            self.eof = true;
        } else {
            self.buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(n)
    }

    fn take_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    fn take_rest(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest: Vec<u8> = self.buffer.drain(..).collect();
        Some(String::from_utf8_lossy(&rest).trim().to_string())
    }
}

impl<R, W> SerialTransport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    fn available(&self) -> usize {
        self.buffer.len()
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn read_line(&mut self) -> Result<Option<String>, BridgeError> {
        loop {
            if let Some(line) = self.take_line() {
                trace!("serial rx: {:?}", line);
                return Ok(Some(line));
            }
            if self.eof {
                // A final line without its newline still counts.
                return Ok(self.take_rest());
            }
            self.fill().await?;
        }
    }

    async fn read_line_timeout(&mut self) -> Result<Option<String>, BridgeError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.read_line()).await {
            Ok(line) => line,
            Err(_) => Ok(None),
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, BridgeError> {
        if self.buffer.is_empty() && !self.eof {
            let timeout = self.timeout;
            if tokio::time::timeout(timeout, self.fill()).await.is_err() {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.buffer.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.drain(..n);
        Ok(n)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), BridgeError> {
        self.writer.flush().await?;
        Ok(())
    }

    fn discard_input(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }
}
