//! In-memory transport double for packet layer tests.

use std::cell::{Cell, RefCell};
use std::io::{Cursor, ErrorKind, Read, Write};
use std::time::Duration;

use sqlwire_transport::{Transport, TransportError};

use crate::header::{CompressedHeader, PacketHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    Alive,
    PeerClosed,
    UnexpectedRead,
}

/// Reads come from `input`; writes land in `output`.
#[derive(Debug)]
pub(crate) struct MemoryTransport {
    pub input: Cursor<Vec<u8>>,
    pub output: Vec<u8>,
    /// Largest slice handed out per read call.
    pub read_chunk: usize,
    /// Once `output` holds this many bytes, writes return `Ok(0)`.
    pub accept_limit: Option<usize>,
    /// Fail writes with this error once `output` holds `fail_after` bytes.
    pub write_error: Option<ErrorKind>,
    pub fail_after: usize,
    pub probe: Probe,
    pub probes: Cell<usize>,
    pub read_timeouts: RefCell<Vec<Option<Duration>>>,
    pub write_timeouts: RefCell<Vec<Option<Duration>>>,
    pub shut_down: Cell<bool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_input(Vec::new())
    }

    pub fn with_input(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            output: Vec::new(),
            read_chunk: usize::MAX,
            accept_limit: None,
            write_error: None,
            fail_after: 0,
            probe: Probe::Alive,
            probes: Cell::new(0),
            read_timeouts: RefCell::new(Vec::new()),
            write_timeouts: RefCell::new(Vec::new()),
            shut_down: Cell::new(false),
        }
    }

    /// Bytes in `input` not yet read.
    pub fn unread(&self) -> usize {
        self.input.get_ref().len() - self.input.position() as usize
    }
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.read_chunk);
        self.input.read(&mut buf[..n])
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(kind) = self.write_error {
            if self.output.len() >= self.fail_after {
                return Err(std::io::Error::from(kind));
            }
            let room = self.fail_after - self.output.len();
            let n = buf.len().min(room);
            self.output.extend_from_slice(&buf[..n]);
            return Ok(n);
        }
        let n = match self.accept_limit {
            Some(limit) => buf.len().min(limit.saturating_sub(self.output.len())),
            None => buf.len(),
        };
        self.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> sqlwire_transport::Result<()> {
        self.read_timeouts.borrow_mut().push(timeout);
        Ok(())
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> sqlwire_transport::Result<()> {
        self.write_timeouts.borrow_mut().push(timeout);
        Ok(())
    }

    fn check_liveness(&self) -> sqlwire_transport::Result<()> {
        self.probes.set(self.probes.get() + 1);
        match self.probe {
            Probe::Alive => Ok(()),
            Probe::PeerClosed => Err(TransportError::PeerClosed),
            Probe::UnexpectedRead => Err(TransportError::UnexpectedRead),
        }
    }

    fn shutdown(&self) -> sqlwire_transport::Result<()> {
        self.shut_down.set(true);
        Ok(())
    }
}

/// Encode a plain frame.
pub(crate) fn plain_frame(sequence: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = PacketHeader::new(payload.len() as u32, sequence)
        .encode()
        .to_vec();
    out.extend_from_slice(payload);
    out
}

/// Encode a literal compressed frame.
pub(crate) fn literal_frame(sequence: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = CompressedHeader::literal(payload.len() as u32, sequence)
        .encode()
        .to_vec();
    out.extend_from_slice(payload);
    out
}

/// Split a wire image into compressed frames: (header, payload).
pub(crate) fn split_compressed(mut wire: &[u8]) -> Vec<(CompressedHeader, Vec<u8>)> {
    let mut frames = Vec::new();
    while !wire.is_empty() {
        let mut raw = [0u8; 7];
        raw.copy_from_slice(&wire[..7]);
        let header = CompressedHeader::decode(raw);
        let end = 7 + header.payload_length as usize;
        frames.push((header, wire[7..end].to_vec()));
        wire = &wire[end..];
    }
    frames
}

/// Split a wire image into plain frames: (header, payload).
pub(crate) fn split_plain(mut wire: &[u8]) -> Vec<(PacketHeader, Vec<u8>)> {
    let mut frames = Vec::new();
    while !wire.is_empty() {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&wire[..4]);
        let header = PacketHeader::decode(raw);
        let end = 4 + header.length as usize;
        frames.push((header, wire[4..end].to_vec()));
        wire = &wire[end..];
    }
    frames
}

/// Deterministic, compressible test content.
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Deterministic, incompressible test content (xorshift).
pub(crate) fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_F491_4F6C_DD1Du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

#[test]
fn memory_transport_short_reads() {
    let mut transport = MemoryTransport::with_input(b"abcdef".to_vec());
    transport.read_chunk = 2;
    let mut buf = [0u8; 6];
    assert_eq!(transport.read(&mut buf).unwrap(), 2);
    assert_eq!(transport.unread(), 4);
}

#[test]
fn memory_transport_accept_limit() {
    let mut transport = MemoryTransport::new();
    transport.accept_limit = Some(3);
    assert_eq!(transport.write(b"abcdef").unwrap(), 3);
    assert_eq!(transport.write(b"gh").unwrap(), 0);
}
