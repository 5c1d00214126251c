//! MySQL client packet framing with optional compression.
//!
//! Every logical packet travels as one or more plain frames:
//! - A 3-byte little-endian payload length
//! - A 1-byte sequence number
//!
//! Payloads of `0xFFFFFF` bytes or more are split, and an exact multiple ends
//! with an empty frame. Once compression is negotiated, the plain frames are
//! carried inside compressed frames with their own 7-byte header and sequence.
//!
//! Blocking I/O only. One caller per connection at a time.

pub mod arena;
pub mod codec;
pub mod compressor;
pub mod connection;
pub mod decompressor;
pub mod error;
pub mod header;
pub mod transceiver;

#[cfg(test)]
mod testing;

pub use arena::{plan_growth, Arena, Growth, DEFAULT_ARENA_CAPACITY};
pub use codec::{
    Compressor, Decompressor, ZlibCompressor, ZlibDecompressor, DEFAULT_COMPRESSION_LEVEL,
};
pub use compressor::PacketCompressor;
pub use connection::{CancelToken, Connection, WireConfig, DEFAULT_MAX_ALLOWED_PACKET};
pub use decompressor::PacketDecompressor;
pub use error::{Result, SequenceLayer, WireError};
pub use header::{
    CompressedHeader, PacketHeader, COMPRESSED_HEADER_SIZE, MAX_PACKET_SIZE, MIN_COMPRESS_LENGTH,
    PACKET_HEADER_SIZE,
};
pub use transceiver::PacketTransceiver;
