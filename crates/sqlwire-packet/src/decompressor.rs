use sqlwire_transport::Transport;
use tracing::trace;

use crate::arena::Arena;
use crate::codec::{Decompressor, ZlibDecompressor};
use crate::connection::Connection;
use crate::error::{Result, SequenceLayer, WireError};
use crate::header::{CompressedHeader, COMPRESSED_HEADER_SIZE};

/// Read side of the compression layer.
///
/// Serves byte ranges out of the decompression arena, pulling and inflating
/// compressed frames from the transport whenever the arena runs short.
pub struct PacketDecompressor {
    arena: Arena,
    codec: Option<Box<dyn Decompressor>>,
}

impl PacketDecompressor {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            codec: None,
        }
    }

    /// Use `codec` instead of the lazily created zlib decompressor.
    pub fn with_codec(codec: Box<dyn Decompressor>) -> Self {
        Self {
            arena: Arena::new(),
            codec: Some(codec),
        }
    }

    /// The decompression arena.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Return the next `n` unread bytes, reading frames as needed.
    pub fn read_next<T: Transport>(
        &mut self,
        conn: &mut Connection<T>,
        n: usize,
    ) -> Result<&[u8]> {
        self.fill(conn, n)?;
        Ok(self.take(n))
    }

    /// Read frames until at least `n` bytes are pending.
    pub fn fill<T: Transport>(&mut self, conn: &mut Connection<T>, n: usize) -> Result<()> {
        while self.arena.pending() < n {
            self.read_frame(conn)?;
        }
        Ok(())
    }

    /// Hand out `n` pending bytes. Call only after a successful [`fill`](Self::fill).
    pub fn take(&mut self, n: usize) -> &[u8] {
        self.arena.take(n)
    }

    /// Read one compressed frame and append its payload to the arena.
    fn read_frame<T: Transport>(&mut self, conn: &mut Connection<T>) -> Result<()> {
        self.arena.reclaim();

        conn.fill(COMPRESSED_HEADER_SIZE)?;
        let mut raw = [0u8; COMPRESSED_HEADER_SIZE];
        raw.copy_from_slice(conn.take(COMPRESSED_HEADER_SIZE));
        let header = CompressedHeader::decode(raw);

        let expected = conn.compression_sequence();
        if header.sequence != expected {
            return Err(WireError::sequence_mismatch(
                SequenceLayer::Compression,
                expected,
                header.sequence,
            ));
        }
        conn.advance_compression_sequence();

        let payload_length = header.payload_length as usize;
        conn.fill(payload_length)?;
        let payload = conn.take(payload_length);

        trace!(
            sequence = header.sequence,
            payload_length,
            uncompressed_length = header.uncompressed_length,
            "read compressed frame"
        );

        if header.is_literal() {
            self.arena.append(payload);
            return Ok(());
        }

        let codec = self
            .codec
            .get_or_insert_with(|| Box::new(ZlibDecompressor::new()) as Box<dyn Decompressor>);
        let uncompressed_length = header.uncompressed_length as usize;
        // Reserve first: compaction moves the pending range.
        self.arena.reserve(uncompressed_length);
        let len = self.arena.len();
        let region = self.arena.extend_zeroed(uncompressed_length);
        if let Err(err) = codec.decompress(payload, region) {
            self.arena.truncate(len);
            return Err(err);
        }
        Ok(())
    }
}

impl Default for PacketDecompressor {
    fn default() -> Self {
        Self::new()
    }
}
