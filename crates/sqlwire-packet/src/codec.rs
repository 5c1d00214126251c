//! Compression codecs for packet payloads.
//!
//! The protocol negotiates zlib today. The packet layer only talks to the
//! [`Compressor`] and [`Decompressor`] traits, so another codec can be slotted
//! in without touching the framing code.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::{Result, WireError};

/// Default zlib compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Spare room kept in the sink before each compression step.
const MIN_SPARE_CAPACITY: usize = 64;

/// Stateful, reusable compressor.
pub trait Compressor: Send {
    /// Append the compressed encoding of `input` to `sink`.
    ///
    /// Bytes already in `sink` are preserved. Returns the number of bytes appended.
    fn compress(&mut self, input: &[u8], sink: &mut Vec<u8>) -> Result<usize>;
}

/// Stateful, reusable decompressor.
pub trait Decompressor: Send {
    /// Decompress `input` into `output`, which must be filled exactly.
    ///
    /// The protocol always declares the uncompressed length up front, so the
    /// destination is sized by the caller.
    fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> Result<()>;
}

/// zlib compressor that keeps its deflate state across frames.
pub struct ZlibCompressor {
    stream: Compress,
}

impl ZlibCompressor {
    /// Create a compressor at `level` (0-9; higher values are clamped to 9).
    pub fn new(level: u32) -> Self {
        Self {
            stream: Compress::new(Compression::new(level.min(9)), true),
        }
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Compressor for ZlibCompressor {
    fn compress(&mut self, input: &[u8], sink: &mut Vec<u8>) -> Result<usize> {
        self.stream.reset();
        let start = sink.len();
        let mut consumed = 0usize;

        loop {
            if sink.capacity() - sink.len() < MIN_SPARE_CAPACITY {
                sink.reserve((input.len() - consumed) / 2 + MIN_SPARE_CAPACITY);
            }

            let before = self.stream.total_in();
            let status = self
                .stream
                .compress_vec(&input[consumed..], sink, FlushCompress::Finish)
                .map_err(|e| WireError::Compression(e.to_string()))?;
            consumed += (self.stream.total_in() - before) as usize;

            if status == Status::StreamEnd {
                return Ok(sink.len() - start);
            }
        }
    }
}

/// zlib decompressor that keeps its inflate state across frames.
pub struct ZlibDecompressor {
    stream: Decompress,
}

impl ZlibDecompressor {
    pub fn new() -> Self {
        Self {
            stream: Decompress::new(true),
        }
    }
}

impl Default for ZlibDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for ZlibDecompressor {
    fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        self.stream.reset(true);
        let mut read = 0usize;
        let mut written = 0usize;

        while written < output.len() {
            let before_in = self.stream.total_in();
            let before_out = self.stream.total_out();
            let status = self
                .stream
                .decompress(&input[read..], &mut output[written..], FlushDecompress::None)
                .map_err(|e| WireError::CompressedStreamCorrupt(e.to_string()))?;

            let consumed = (self.stream.total_in() - before_in) as usize;
            let produced = (self.stream.total_out() - before_out) as usize;
            read += consumed;
            written += produced;

            if written == output.len() {
                break;
            }
            if status == Status::StreamEnd || (consumed == 0 && produced == 0) {
                return Err(WireError::CompressedStreamTruncated {
                    expected: output.len(),
                    produced: written,
                });
            }
        }

        Ok(())
    }
}
