use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use sqlwire_transport::{Transport, TransportError};
use tracing::debug;

use crate::codec::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 16 * 1024;
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Default maximum allowed packet size: 64 MiB.
pub const DEFAULT_MAX_ALLOWED_PACKET: usize = 64 * 1024 * 1024;

/// Per-connection packet layer configuration.
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Largest logical packet the writer accepts. Default: 64 MiB.
    pub max_allowed_packet: usize,
    /// Re-armed before every blocking read.
    pub read_timeout: Option<Duration>,
    /// Re-armed before every blocking write.
    pub write_timeout: Option<Duration>,
    /// Probe a stale connection before its first write.
    pub check_liveness: bool,
    /// zlib level used when compressing outgoing frames.
    pub compression_level: u32,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            read_timeout: None,
            write_timeout: None,
            check_liveness: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Externally settable cancellation signal.
///
/// The first recorded cause wins. The packet layer never blocks on it; it is
/// consulted after an I/O failure to report why the failure happened.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cause: Arc<OnceLock<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cause`. Returns false if a cause was already recorded.
    pub fn cancel(&self, cause: impl Into<String>) -> bool {
        self.cause.set(cause.into()).is_ok()
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.get().map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause.get().is_some()
    }
}

/// Read window over the transport with deferred consumption.
///
/// Bytes handed out by `take` stay valid until the next `fill`.
#[derive(Debug)]
struct ReadBuffer {
    buf: BytesMut,
    consumed: usize,
}

impl ReadBuffer {
    fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            consumed: 0,
        }
    }

    fn buffered(&self) -> usize {
        self.buf.len() - self.consumed
    }

    fn take(&mut self, n: usize) -> &[u8] {
        let start = self.consumed;
        self.consumed += n;
        &self.buf[start..start + n]
    }

    /// Read from `src` until at least `need` unconsumed bytes are buffered,
    /// re-arming the read timeout before each blocking read.
    /// Returns the number of bytes read from `src`.
    fn fill<T: Transport>(
        &mut self,
        src: &mut T,
        need: usize,
        read_timeout: Option<Duration>,
    ) -> std::io::Result<usize> {
        if self.consumed > 0 {
            self.buf.advance(self.consumed);
            self.consumed = 0;
        }

        let mut total = 0usize;
        while self.buf.len() < need {
            if let Some(timeout) = read_timeout {
                src.set_read_timeout(Some(timeout)).map_err(transport_to_io)?;
            }

            let start = self.buf.len();
            let want = (need - start).max(READ_CHUNK_SIZE);
            self.buf.resize(start + want, 0);

            let read = match src.read(&mut self.buf[start..]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    self.buf.truncate(start);
                    continue;
                }
                Err(err) => {
                    self.buf.truncate(start);
                    return Err(err);
                }
            };
            self.buf.truncate(start + read);

            if read == 0 {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed (incomplete packet)",
                ));
            }
            total += read;
        }
        Ok(total)
    }
}

/// Connection-owned state shared by every packet operation.
///
/// Holds the transport, the two sequence counters, the stale and closed flags
/// and the cancellation signal. One caller at a time; no locking.
pub struct Connection<T> {
    transport: T,
    reader: ReadBuffer,
    config: WireConfig,
    sequence: u8,
    compression_sequence: u8,
    stale: bool,
    closed: bool,
    cancel: CancelToken,
    bytes_sent: u64,
    bytes_received: u64,
}

impl<T: Transport> Connection<T> {
    /// Create a connection context with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, WireConfig::default())
    }

    /// Create a connection context with explicit configuration.
    pub fn with_config(transport: T, config: WireConfig) -> Self {
        Self {
            transport,
            reader: ReadBuffer::new(),
            config,
            sequence: 0,
            compression_sequence: 0,
            stale: false,
            closed: false,
            cancel: CancelToken::new(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Current connection configuration.
    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Update maximum allowed packet size, e.g. after reading the server variable.
    pub fn set_max_allowed_packet(&mut self, max_allowed_packet: usize) {
        self.config.max_allowed_packet = max_allowed_packet;
    }

    /// Expected protocol sequence of the next frame.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Expected compression sequence of the next compressed frame.
    pub fn compression_sequence(&self) -> u8 {
        self.compression_sequence
    }

    /// Restart both sequence counters; done at the start of every command.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
        self.compression_sequence = 0;
    }

    pub(crate) fn advance_sequence(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
    }

    pub(crate) fn advance_compression_sequence(&mut self) {
        self.compression_sequence = self.compression_sequence.wrapping_add(1);
    }

    /// Flag the connection as possibly stale, e.g. when checked out of a pool.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn take_stale(&mut self) -> bool {
        std::mem::take(&mut self.stale)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the connection. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.transport.shutdown() {
            debug!(error = %err, "transport shutdown failed");
        }
        debug!(
            bytes_sent = self.bytes_sent,
            bytes_received = self.bytes_received,
            "connection closed"
        );
    }

    /// A handle the caller can use to cancel operations on this connection.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn cancel_cause(&self) -> Option<String> {
        self.cancel.cause().map(str::to_owned)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Bytes read from the transport but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.reader.buffered()
    }

    /// Read exactly `n` bytes from the transport (blocking).
    pub fn read_next(&mut self, n: usize) -> Result<&[u8]> {
        self.fill(n)?;
        Ok(self.take(n))
    }

    /// Block until `n` bytes are buffered.
    pub(crate) fn fill(&mut self, n: usize) -> Result<()> {
        if self.closed {
            return Err(WireError::InvalidConnection);
        }
        let read = self
            .reader
            .fill(&mut self.transport, n, self.config.read_timeout)?;
        self.bytes_received += read as u64;
        Ok(())
    }

    /// Hand out `n` buffered bytes. Call only after a successful [`fill`](Self::fill).
    pub(crate) fn take(&mut self, n: usize) -> &[u8] {
        self.reader.take(n)
    }

    /// Write a whole frame, re-arming the write timeout first.
    ///
    /// Returns the number of bytes the transport accepted; fewer than
    /// `frame.len()` means the transport stopped taking data.
    pub(crate) fn send(&mut self, frame: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(WireError::InvalidConnection);
        }
        if let Some(timeout) = self.config.write_timeout {
            self.transport
                .set_write_timeout(Some(timeout))
                .map_err(transport_to_io)?;
        }

        let mut offset = 0usize;
        while offset < frame.len() {
            match self.transport.write(&frame[offset..]) {
                Ok(0) => break,
                Ok(n) => {
                    offset += n;
                    self.bytes_sent += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(offset)
    }

    /// Clear the read timeout and probe the idle transport.
    pub(crate) fn probe_liveness(&mut self) -> sqlwire_transport::Result<()> {
        if self.config.read_timeout.is_some() {
            self.transport.set_read_timeout(None)?;
        }
        if self.config.check_liveness {
            self.transport.check_liveness()?;
        }
        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the connection and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

fn transport_to_io(err: TransportError) -> std::io::Error {
    match err {
        TransportError::Io(io) => io,
        TransportError::ConnectTcp { source, .. } | TransportError::ConnectUnix { source, .. } => {
            source
        }
        other => std::io::Error::other(other.to_string()),
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("sequence", &self.sequence)
            .field("compression_sequence", &self.compression_sequence)
            .field("stale", &self.stale)
            .field("closed", &self.closed)
            .field("bytes_sent", &self.bytes_sent)
            .field("bytes_received", &self.bytes_received)
            .finish()
    }
}
