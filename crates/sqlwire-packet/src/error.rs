use std::fmt;

/// Which of the two per-connection sequence counters a frame violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceLayer {
    /// The outer packet framing counter.
    Protocol,
    /// The compressed frame counter.
    Compression,
}

impl fmt::Display for SequenceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceLayer::Protocol => f.write_str("protocol"),
            SequenceLayer::Compression => f.write_str("compression"),
        }
    }
}

/// Errors that can occur while framing, compressing or transmitting packets.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A frame arrived with a sequence number greater than expected.
    #[error("{layer} sequence ahead: expected {expected}, got {actual}")]
    SequenceMismatchAhead {
        layer: SequenceLayer,
        expected: u8,
        actual: u8,
    },

    /// A frame arrived with a sequence number lower than expected.
    #[error("{layer} sequence behind: expected {expected}, got {actual}")]
    SequenceMismatchBehind {
        layer: SequenceLayer,
        expected: u8,
        actual: u8,
    },

    /// A zero-length frame arrived with no fragment before it.
    #[error("malformed packet")]
    MalformedPacket,

    /// The compressed payload is not a valid stream.
    #[error("compressed stream corrupt: {0}")]
    CompressedStreamCorrupt(String),

    /// The compressed payload ended before the declared length was produced.
    #[error("compressed stream truncated ({produced} of {expected} bytes)")]
    CompressedStreamTruncated { expected: usize, produced: usize },

    /// The packet exceeds the configured maximum allowed packet size.
    #[error("packet too large ({size} bytes, max {max})")]
    OversizedPacket { size: usize, max: usize },

    /// The transport accepted fewer bytes than the frame holds.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The caller cancelled the operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The connection is unusable, but nothing was sent; retry on a fresh one.
    #[error("bad connection (safe to retry): {0}")]
    RetryableBadConnection(String),

    /// The connection is unusable and has been closed.
    #[error("invalid connection")]
    InvalidConnection,

    /// The write buffer has no room for the 4-byte packet header.
    #[error("write buffer of {len} bytes has no room for a packet header")]
    MissingHeaderSpace { len: usize },

    /// The compressor failed.
    #[error("compression failed: {0}")]
    Compression(String),

    /// An I/O error occurred on the transport.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether the connection cannot be used after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            WireError::OversizedPacket { .. }
                | WireError::MissingHeaderSpace { .. }
                | WireError::Cancelled(_)
        )
    }

    /// Whether a pooled caller may discard the connection and retry transparently.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WireError::RetryableBadConnection(_))
    }

    pub(crate) fn sequence_mismatch(layer: SequenceLayer, expected: u8, actual: u8) -> Self {
        if actual > expected {
            WireError::SequenceMismatchAhead {
                layer,
                expected,
                actual,
            }
        } else {
            WireError::SequenceMismatchBehind {
                layer,
                expected,
                actual,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
