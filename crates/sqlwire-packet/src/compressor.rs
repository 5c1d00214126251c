use sqlwire_transport::Transport;
use tracing::trace;

use crate::codec::{Compressor, ZlibCompressor};
use crate::connection::Connection;
use crate::error::{Result, WireError};
use crate::header::{
    CompressedHeader, COMPRESSED_HEADER_SIZE, MAX_PACKET_SIZE, MIN_COMPRESS_LENGTH,
};

const INITIAL_BUFFER_CAPACITY: usize = 16 * 1024;

/// Write side of the compression layer.
///
/// Turns each piece of an outgoing chunk into one compressed frame, falling
/// back to a literal frame whenever compression does not pay off.
pub struct PacketCompressor {
    buffer: Vec<u8>,
    codec: Option<Box<dyn Compressor>>,
}

impl PacketCompressor {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: None,
        }
    }

    /// Use `codec` instead of the lazily created zlib compressor.
    pub fn with_codec(codec: Box<dyn Compressor>) -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: Some(codec),
        }
    }

    /// Send `chunk` as one or more compressed frames.
    ///
    /// Pieces are at most [`MAX_PACKET_SIZE`] bytes. The compression sequence
    /// advances once per fully written frame. Returns `chunk.len()`.
    pub fn write_packet<T: Transport>(
        &mut self,
        conn: &mut Connection<T>,
        chunk: &[u8],
    ) -> Result<usize> {
        let mut offset = 0usize;
        while offset < chunk.len() {
            let end = chunk.len().min(offset + MAX_PACKET_SIZE);
            let sequence = conn.compression_sequence();
            self.encode_frame(&chunk[offset..end], sequence, conn.config().compression_level)?;

            let sent = conn.send(&self.buffer)?;
            if sent != self.buffer.len() {
                return Err(WireError::ShortWrite {
                    written: sent,
                    expected: self.buffer.len(),
                });
            }

            conn.advance_compression_sequence();
            offset = end;
        }
        Ok(chunk.len())
    }

    /// Build one frame for `piece` in the compression buffer.
    fn encode_frame(&mut self, piece: &[u8], sequence: u8, level: u32) -> Result<()> {
        self.buffer.clear();

        if piece.len() >= MIN_COMPRESS_LENGTH {
            let codec = self
                .codec
                .get_or_insert_with(|| Box::new(ZlibCompressor::new(level)) as Box<dyn Compressor>);

            self.buffer.resize(COMPRESSED_HEADER_SIZE, 0);
            let compressed = codec.compress(piece, &mut self.buffer)?;

            if compressed < piece.len() && compressed <= MAX_PACKET_SIZE {
                CompressedHeader::new(compressed as u32, sequence, piece.len() as u32)
                    .write_to(&mut self.buffer);
                trace!(sequence, piece = piece.len(), compressed, "compressed frame");
                return Ok(());
            }

            trace!(sequence, piece = piece.len(), compressed, "compression not beneficial");
            self.buffer.clear();
        }

        self.buffer.reserve(COMPRESSED_HEADER_SIZE + piece.len());
        self.buffer
            .extend_from_slice(&CompressedHeader::literal(piece.len() as u32, sequence).encode());
        self.buffer.extend_from_slice(piece);
        Ok(())
    }
}

impl Default for PacketCompressor {
    fn default() -> Self {
        Self::new()
    }
}
