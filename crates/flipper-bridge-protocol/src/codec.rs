//! Chunking codec for size-limited transports.
//!
//! Some links accept only a few dozen bytes per write. A message is split
//! into consecutive chunks no larger than the ceiling, with nothing between
//! them but the chunk boundary. The receiver concatenates chunks until the
//! length it was told out-of-band (the content-length of the response head)
//! has arrived.

use thiserror::Error;

use flipper_bridge_core::config::MIN_CHUNK_SIZE;

/// Errors raised by the codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Ceiling too small to carry any UTF-8 scalar.
    #[error("Chunk ceiling {0} is below the minimum of {min} bytes", min = MIN_CHUNK_SIZE)]
    CeilingTooSmall(usize),

    /// More bytes arrived than the announced length.
    #[error("Received {received} bytes, expected {expected}")]
    Overflow { expected: usize, received: usize },
}

/// Where a chunk sits in its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPosition {
    /// The whole message fits in one chunk.
    Only,
    First,
    Middle,
    Last,
}

impl ChunkPosition {
    /// Whether the chunk ends its message.
    pub fn is_final(&self) -> bool {
        matches!(self, ChunkPosition::Only | ChunkPosition::Last)
    }
}

/// One bounded fragment of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub data: &'a [u8],
    pub position: ChunkPosition,
    pub index: usize,
}

impl<'a> Chunk<'a> {
    /// The chunk as text. Always `Some` for chunks of a `Chunker::text`.
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.data).ok()
    }
}

/// Iterator splitting a message into chunks.
///
/// An empty message yields one empty `Only` chunk, so every message maps to
/// at least one write.
#[derive(Debug, Clone)]
pub struct Chunker<'a> {
    data: &'a [u8],
    ceiling: usize,
    offset: usize,
    index: usize,
    text: bool,
    done: bool,
}

impl<'a> Chunker<'a> {
    /// Split raw bytes at exact ceiling boundaries.
    pub fn bytes(data: &'a [u8], ceiling: usize) -> Result<Self, CodecError> {
        Self::new(data, ceiling, false)
    }

    /// Split text, never cutting through a UTF-8 sequence.
    pub fn text(text: &'a str, ceiling: usize) -> Result<Self, CodecError> {
        Self::new(text.as_bytes(), ceiling, true)
    }

    fn new(data: &'a [u8], ceiling: usize, text: bool) -> Result<Self, CodecError> {
        if ceiling < MIN_CHUNK_SIZE {
            return Err(CodecError::CeilingTooSmall(ceiling));
        }
        Ok(Self {
            data,
            ceiling,
            offset: 0,
            index: 0,
            text,
            done: false,
        })
    }

    fn next_end(&self) -> usize {
        let mut end = (self.offset + self.ceiling).min(self.data.len());
        if self.text {
            // Continuation bytes are 0b10xx_xxxx; back off to a scalar start.
            while end < self.data.len() && end > self.offset && (self.data[end] & 0xC0) == 0x80 {
                end -= 1;
            }
        }
        end
    }
}

impl<'a> Iterator for Chunker<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let end = self.next_end();
        let last = end >= self.data.len();
        let position = match (self.index == 0, last) {
            (true, true) => ChunkPosition::Only,
            (true, false) => ChunkPosition::First,
            (false, false) => ChunkPosition::Middle,
            (false, true) => ChunkPosition::Last,
        };

        let chunk = Chunk {
            data: &self.data[self.offset..end],
            position,
            index: self.index,
        };

        self.offset = end;
        self.index += 1;
        self.done = last;
        Some(chunk)
    }
}

/// Receiving side: concatenates chunks until the expected length arrives.
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    expected: Option<usize>,
    buffer: Vec<u8>,
}

impl Reassembler {
    /// `expected` is the out-of-band length; `None` means read until told to stop.
    pub fn new(expected: Option<usize>) -> Self {
        Self {
            expected,
            buffer: Vec::with_capacity(expected.unwrap_or(0)),
        }
    }

    /// Append a chunk. Returns `true` once the expected length is reached.
    pub fn push(&mut self, chunk: &[u8]) -> Result<bool, CodecError> {
        if let Some(expected) = self.expected {
            let received = self.buffer.len() + chunk.len();
            if received > expected {
                return Err(CodecError::Overflow { expected, received });
            }
        }
        self.buffer.extend_from_slice(chunk);
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.expected == Some(self.buffer.len())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rejects_tiny_ceiling() {
        assert_eq!(
            Chunker::bytes(b"abc", 3).unwrap_err(),
            CodecError::CeilingTooSmall(3)
        );
    }

    #[test]
    fn test_positions() {
        let positions: Vec<_> = Chunker::bytes(&[0u8; 300], 128)
            .unwrap()
            .map(|chunk| (chunk.position, chunk.data.len()))
            .collect();
        assert_eq!(
            positions,
            vec![
                (ChunkPosition::First, 128),
                (ChunkPosition::Middle, 128),
                (ChunkPosition::Last, 44),
            ]
        );
    }

    #[test]
    fn test_small_and_empty_messages_are_one_chunk() {
        let chunks: Vec<_> = Chunker::text("hi", 128).unwrap().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, ChunkPosition::Only);

        let chunks: Vec<_> = Chunker::bytes(b"", 128).unwrap().collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.is_empty());
        assert!(chunks[0].position.is_final());
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_chunk() {
        let chunks: Vec<_> = Chunker::bytes(&[1u8; 256], 128).unwrap().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].position, ChunkPosition::Last);
    }

    #[test]
    fn test_text_never_splits_a_scalar() {
        // Each "é" is two bytes; an odd ceiling would cut one in half.
        let message = "é".repeat(100);
        let chunks: Vec<_> = Chunker::text(&message, 5).unwrap().collect();
        assert!(chunks.iter().all(|chunk| chunk.data.len() <= 5));
        assert!(chunks.iter().all(|chunk| chunk.as_str().is_some()));

        let joined: String = chunks.iter().filter_map(|chunk| chunk.as_str()).collect();
        assert_eq!(joined, message);
    }

    #[test]
    fn test_reassembly_restores_large_message() {
        let message: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let mut reassembler = Reassembler::new(Some(message.len()));

        let mut complete = false;
        for chunk in Chunker::text(&message, 128).unwrap() {
            assert!(!complete);
            complete = reassembler.push(chunk.data).unwrap();
        }

        assert!(complete);
        assert_eq!(reassembler.into_inner(), message.into_bytes());
    }

    #[test]
    fn test_reassembly_overflow() {
        let mut reassembler = Reassembler::new(Some(4));
        assert!(!reassembler.push(b"ab").unwrap());
        assert_eq!(
            reassembler.push(b"cde").unwrap_err(),
            CodecError::Overflow {
                expected: 4,
                received: 5
            }
        );
    }
}
