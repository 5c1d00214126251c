use bytes::{Buf, BufMut};

/// Largest payload one frame may carry: 2^24 - 1 bytes.
pub const MAX_PACKET_SIZE: usize = 0x00FF_FFFF;

/// Plain frame header: length (3) + sequence (1) = 4 bytes.
pub const PACKET_HEADER_SIZE: usize = 4;

/// Compressed frame header: length (3) + sequence (1) + uncompressed length (3) = 7 bytes.
pub const COMPRESSED_HEADER_SIZE: usize = 7;

/// Pieces shorter than this are always sent literal.
pub const MIN_COMPRESS_LENGTH: usize = 100;

/// Header of a plain frame.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬──────────────────┐
/// │ Length       │ Sequence │ Payload          │
/// │ (3B LE)      │ (1B)     │ (Length bytes)   │
/// └──────────────┴──────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length, at most [`MAX_PACKET_SIZE`].
    pub length: u32,
    /// Protocol sequence number.
    pub sequence: u8,
}

impl PacketHeader {
    pub fn new(length: u32, sequence: u8) -> Self {
        Self { length, sequence }
    }

    /// Write the header into the first 4 bytes of `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`PACKET_HEADER_SIZE`].
    pub fn write_to(&self, dst: &mut [u8]) {
        let mut dst = &mut dst[..PACKET_HEADER_SIZE];
        dst.put_uint_le(u64::from(self.length), 3);
        dst.put_u8(self.sequence);
    }

    pub fn encode(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut out = [0u8; PACKET_HEADER_SIZE];
        self.write_to(&mut out);
        out
    }

    pub fn decode(src: [u8; PACKET_HEADER_SIZE]) -> Self {
        let mut src = &src[..];
        let length = src.get_uint_le(3) as u32;
        let sequence = src.get_u8();
        Self { length, sequence }
    }
}

/// Header of a compressed frame.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬──────────────────┬──────────────────┐
/// │ Length       │ Sequence │ Uncompressed     │ Payload          │
/// │ (3B LE)      │ (1B)     │ length (3B LE)   │ (Length bytes)   │
/// └──────────────┴──────────┴──────────────────┴──────────────────┘
/// ```
///
/// An uncompressed length of 0 marks a literal payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedHeader {
    /// On-wire payload length.
    pub payload_length: u32,
    /// Compression sequence number.
    pub sequence: u8,
    /// Length after decompression, or 0 for a literal payload.
    pub uncompressed_length: u32,
}

impl CompressedHeader {
    pub fn new(payload_length: u32, sequence: u8, uncompressed_length: u32) -> Self {
        Self {
            payload_length,
            sequence,
            uncompressed_length,
        }
    }

    /// Header for a frame whose payload is sent as-is.
    pub fn literal(payload_length: u32, sequence: u8) -> Self {
        Self::new(payload_length, sequence, 0)
    }

    pub fn is_literal(&self) -> bool {
        self.uncompressed_length == 0
    }

    /// Write the header into the first 7 bytes of `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`COMPRESSED_HEADER_SIZE`].
    pub fn write_to(&self, dst: &mut [u8]) {
        let mut dst = &mut dst[..COMPRESSED_HEADER_SIZE];
        dst.put_uint_le(u64::from(self.payload_length), 3);
        dst.put_u8(self.sequence);
        dst.put_uint_le(u64::from(self.uncompressed_length), 3);
    }

    pub fn encode(&self) -> [u8; COMPRESSED_HEADER_SIZE] {
        let mut out = [0u8; COMPRESSED_HEADER_SIZE];
        self.write_to(&mut out);
        out
    }

    pub fn decode(src: [u8; COMPRESSED_HEADER_SIZE]) -> Self {
        let mut src = &src[..];
        let payload_length = src.get_uint_le(3) as u32;
        let sequence = src.get_u8();
        let uncompressed_length = src.get_uint_le(3) as u32;
        Self {
            payload_length,
            sequence,
            uncompressed_length,
        }
    }
}
