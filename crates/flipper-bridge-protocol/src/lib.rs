//! # flipper-bridge-protocol
//!
//! Wire formats spoken over the serial link.
//!
//! This crate defines the bracket-tagged command vocabulary, the reply
//! frames written back to the host, the payload formats each command
//! accepts, and the chunking codec used for transports with a per-write
//! size ceiling. It performs no I/O.

pub mod codec;
pub mod command;
pub mod frames;
pub mod payload;
pub mod query;

pub use codec::{Chunk, ChunkPosition, Chunker, CodecError, Reassembler};
pub use command::{Command, CommandFrame};
pub use frames::{decode_head, encode_head, Reply};
