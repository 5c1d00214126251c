use std::borrow::Cow;

use sqlwire_transport::Transport;
use tracing::{error, trace, warn};

use crate::compressor::PacketCompressor;
use crate::connection::Connection;
use crate::decompressor::PacketDecompressor;
use crate::error::{Result, SequenceLayer, WireError};
use crate::header::{PacketHeader, MAX_PACKET_SIZE, PACKET_HEADER_SIZE};

/// Splits and reassembles logical packets across physical frames.
///
/// A frame carries at most [`MAX_PACKET_SIZE`] payload bytes. A frame of
/// exactly that size means more follow; a logical packet whose length is an
/// exact multiple of it ends with a zero-length frame.
///
/// With compression negotiated, frames travel inside compressed frames through
/// the [`PacketCompressor`] and [`PacketDecompressor`]; otherwise they go
/// straight to the transport.
#[derive(Default)]
pub struct PacketTransceiver {
    compressor: PacketCompressor,
    decompressor: PacketDecompressor,
}

impl PacketTransceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transceiver around explicit compression layers.
    pub fn with_parts(compressor: PacketCompressor, decompressor: PacketDecompressor) -> Self {
        Self {
            compressor,
            decompressor,
        }
    }

    pub fn compressor(&self) -> &PacketCompressor {
        &self.compressor
    }

    pub fn decompressor(&self) -> &PacketDecompressor {
        &self.decompressor
    }

    /// Read one logical packet (blocking).
    ///
    /// A packet that fits in one frame is returned borrowed from the read
    /// buffer, valid until the next read; a split packet is reassembled into
    /// an owned buffer.
    pub fn read_packet<'a, T: Transport>(
        &'a mut self,
        conn: &'a mut Connection<T>,
        compress: bool,
    ) -> Result<Cow<'a, [u8]>> {
        if conn.is_closed() {
            return Err(WireError::InvalidConnection);
        }

        let mut prev: Option<Vec<u8>> = None;
        let last = loop {
            let header = match self.read_header(conn, compress) {
                Ok(header) => header,
                Err(err) => return Err(read_failure(conn, err)),
            };

            let expected = conn.sequence();
            if header.sequence != expected {
                let err = WireError::sequence_mismatch(
                    SequenceLayer::Protocol,
                    expected,
                    header.sequence,
                );
                error!(error = %err, "packets out of order");
                conn.close();
                return Err(err);
            }
            conn.advance_sequence();

            let length = header.length as usize;
            trace!(sequence = header.sequence, length, compress, "read frame header");

            // A zero-length frame terminates a packet that is a multiple of MAX_PACKET_SIZE.
            if length == 0 {
                return match prev {
                    Some(data) => Ok(Cow::Owned(data)),
                    None => {
                        error!("zero-length packet with no preceding fragment");
                        conn.close();
                        Err(WireError::MalformedPacket)
                    }
                };
            }

            if length < MAX_PACKET_SIZE {
                break length;
            }

            if let Err(err) = self.fill(conn, compress, length) {
                return Err(read_failure(conn, err));
            }
            let fragment = if compress {
                self.decompressor.take(length)
            } else {
                conn.take(length)
            };
            prev.get_or_insert_with(Vec::new).extend_from_slice(fragment);
        };

        if let Err(err) = self.fill(conn, compress, last) {
            return Err(read_failure(conn, err));
        }
        let data = if compress {
            self.decompressor.take(last)
        } else {
            conn.take(last)
        };

        Ok(match prev {
            None => Cow::Borrowed(data),
            Some(mut acc) => {
                acc.extend_from_slice(data);
                Cow::Owned(acc)
            }
        })
    }

    /// Write one logical packet (blocking).
    ///
    /// `data` starts with [`PACKET_HEADER_SIZE`] reserved bytes followed by the
    /// payload. Frame headers are written in place, so bytes in `data` are
    /// overwritten as frames go out.
    pub fn write_packet<T: Transport>(
        &mut self,
        conn: &mut Connection<T>,
        data: &mut [u8],
        compress: bool,
    ) -> Result<()> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(WireError::MissingHeaderSpace { len: data.len() });
        }
        let mut remaining = data.len() - PACKET_HEADER_SIZE;
        let max = conn.config().max_allowed_packet;
        if remaining > max {
            return Err(WireError::OversizedPacket {
                size: remaining,
                max,
            });
        }
        if conn.is_closed() {
            return Err(WireError::InvalidConnection);
        }

        if conn.take_stale() {
            if let Err(err) = conn.probe_liveness() {
                warn!(error = %err, "closing bad idle connection");
                conn.close();
                return Err(WireError::RetryableBadConnection(err.to_string()));
            }
        }

        let sent_before = conn.bytes_sent();
        let mut offset = 0usize;
        loop {
            let size = remaining.min(MAX_PACKET_SIZE);
            PacketHeader::new(size as u32, conn.sequence()).write_to(&mut data[offset..]);
            let frame = &data[offset..offset + PACKET_HEADER_SIZE + size];

            let result = if compress {
                self.compressor.write_packet(conn, frame)
            } else {
                conn.send(frame)
            };

            match result {
                Ok(n) if n == frame.len() => {
                    conn.advance_sequence();
                    if size != MAX_PACKET_SIZE {
                        return Ok(());
                    }
                    remaining -= size;
                    offset += size;
                }
                Ok(n) => {
                    let err = WireError::ShortWrite {
                        written: n,
                        expected: frame.len(),
                    };
                    error!(error = %err, "packet write incomplete");
                    conn.close();
                    return Err(err);
                }
                Err(err) => {
                    let untouched = offset == 0 && conn.bytes_sent() == sent_before;
                    return Err(write_failure(conn, err, untouched));
                }
            }
        }
    }

    fn read_header<T: Transport>(
        &mut self,
        conn: &mut Connection<T>,
        compress: bool,
    ) -> Result<PacketHeader> {
        self.fill(conn, compress, PACKET_HEADER_SIZE)?;
        let src = if compress {
            self.decompressor.take(PACKET_HEADER_SIZE)
        } else {
            conn.take(PACKET_HEADER_SIZE)
        };
        let mut raw = [0u8; PACKET_HEADER_SIZE];
        raw.copy_from_slice(src);
        Ok(PacketHeader::decode(raw))
    }

    fn fill<T: Transport>(
        &mut self,
        conn: &mut Connection<T>,
        compress: bool,
        n: usize,
    ) -> Result<()> {
        if compress {
            self.decompressor.fill(conn, n)
        } else {
            conn.fill(n)
        }
    }
}

/// Map a failed read to what the caller sees, closing the connection unless
/// the caller cancelled.
fn read_failure<T: Transport>(conn: &mut Connection<T>, err: WireError) -> WireError {
    if let Some(cause) = conn.cancel_cause() {
        return WireError::Cancelled(cause);
    }
    error!(error = %err, "packet read failed");
    conn.close();
    match err {
        WireError::Io(_) => WireError::InvalidConnection,
        other => other,
    }
}

/// Map a failed write to what the caller sees.
///
/// `untouched` means nothing reached the transport yet, so a pooled caller can
/// safely retry on a fresh connection.
fn write_failure<T: Transport>(
    conn: &mut Connection<T>,
    err: WireError,
    untouched: bool,
) -> WireError {
    if let Some(cause) = conn.cancel_cause() {
        return WireError::Cancelled(cause);
    }
    if untouched && matches!(err, WireError::Io(_)) {
        warn!(error = %err, "write failed before any bytes were sent");
        return WireError::RetryableBadConnection(err.to_string());
    }
    error!(error = %err, "packet write failed");
    conn.close();
    match err {
        WireError::Io(_) => WireError::InvalidConnection,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::time::Duration;

    use super::*;
    use crate::connection::WireConfig;
    use crate::testing::{plain_frame, split_plain, MemoryTransport, Probe};

    fn with_header(payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; PACKET_HEADER_SIZE];
        buf.extend_from_slice(payload);
        buf
    }

    fn reader(wire: Vec<u8>) -> Connection<MemoryTransport> {
        Connection::new(MemoryTransport::with_input(wire))
    }

    #[test]
    fn write_single_frame() {
        let mut conn = Connection::new(MemoryTransport::new());
        let mut transceiver = PacketTransceiver::new();

        transceiver
            .write_packet(&mut conn, &mut with_header(b"SELECT 1"), false)
            .unwrap();

        assert_eq!(conn.sequence(), 1);
        let wire = conn.into_inner().output;
        assert_eq!(wire, plain_frame(0, b"SELECT 1"));
    }

    #[test]
    fn read_single_frame_is_borrowed() {
        let mut conn = reader(plain_frame(0, b"row"));
        let mut transceiver = PacketTransceiver::new();

        let packet = transceiver.read_packet(&mut conn, false).unwrap();
        assert!(matches!(packet, Cow::Borrowed(_)));
        assert_eq!(packet.as_ref(), b"row");
        assert_eq!(conn.sequence(), 1);
    }

    #[test]
    fn consecutive_packets() {
        let mut wire = plain_frame(0, b"first");
        wire.extend(plain_frame(1, b"second"));
        let mut conn = reader(wire);
        let mut transceiver = PacketTransceiver::new();

        let first = transceiver.read_packet(&mut conn, false).unwrap().into_owned();
        let second = transceiver.read_packet(&mut conn, false).unwrap().into_owned();

        assert_eq!(first, b"first");
        assert_eq!(second, b"second");
        assert_eq!(conn.sequence(), 2);
    }

    #[test]
    fn exact_multiple_gets_terminator() {
        let payload = vec![0x42u8; MAX_PACKET_SIZE];
        let mut conn = Connection::new(MemoryTransport::new());
        let mut transceiver = PacketTransceiver::new();

        transceiver
            .write_packet(&mut conn, &mut with_header(&payload), false)
            .unwrap();
        assert_eq!(conn.sequence(), 2);

        let wire = conn.into_inner().output;
        let frames = split_plain(&wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, PacketHeader::new(MAX_PACKET_SIZE as u32, 0));
        assert_eq!(frames[1].0, PacketHeader::new(0, 1));

        let mut conn = reader(wire);
        let packet = transceiver.read_packet(&mut conn, false).unwrap();
        assert!(matches!(packet, Cow::Owned(_)));
        assert_eq!(packet.as_ref(), payload.as_slice());
    }

    #[test]
    fn remainder_needs_no_terminator() {
        let payload: Vec<u8> = (0..MAX_PACKET_SIZE + 10).map(|i| i as u8).collect();
        let mut conn = Connection::new(MemoryTransport::new());
        let mut transceiver = PacketTransceiver::new();

        transceiver
            .write_packet(&mut conn, &mut with_header(&payload), false)
            .unwrap();

        let wire = conn.into_inner().output;
        let frames = split_plain(&wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].0, PacketHeader::new(10, 1));

        let mut conn = reader(wire);
        let packet = transceiver.read_packet(&mut conn, false).unwrap();
        assert_eq!(packet.as_ref(), payload.as_slice());
        assert_eq!(conn.transport().unread(), 0);
    }

    #[test]
    fn empty_packet_writes_one_empty_frame() {
        let mut conn = Connection::new(MemoryTransport::new());
        let mut transceiver = PacketTransceiver::new();

        transceiver
            .write_packet(&mut conn, &mut with_header(b""), false)
            .unwrap();

        let wire = conn.into_inner().output;
        assert_eq!(wire, vec![0, 0, 0, 0]);

        let mut conn = reader(wire);
        let err = transceiver.read_packet(&mut conn, false).unwrap_err();
        assert!(matches!(err, WireError::MalformedPacket));
        assert!(conn.is_closed());
    }

    #[test]
    fn protocol_sequence_ahead() {
        let mut conn = reader(plain_frame(1, b"x"));
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver.read_packet(&mut conn, false).unwrap_err();
        assert!(matches!(
            err,
            WireError::SequenceMismatchAhead {
                layer: SequenceLayer::Protocol,
                expected: 0,
                actual: 1
            }
        ));
        assert_eq!(conn.sequence(), 0);
        assert!(conn.is_closed());
    }

    #[test]
    fn protocol_sequence_behind() {
        let mut wire = plain_frame(0, b"a");
        wire.extend(plain_frame(0, b"b"));
        let mut conn = reader(wire);
        let mut transceiver = PacketTransceiver::new();

        transceiver.read_packet(&mut conn, false).unwrap();
        let err = transceiver.read_packet(&mut conn, false).unwrap_err();
        assert!(matches!(
            err,
            WireError::SequenceMismatchBehind {
                layer: SequenceLayer::Protocol,
                ..
            }
        ));
    }

    #[test]
    fn closed_connection_rejected() {
        let mut conn = reader(plain_frame(0, b"x"));
        conn.close();
        let mut transceiver = PacketTransceiver::new();

        assert!(matches!(
            transceiver.read_packet(&mut conn, false),
            Err(WireError::InvalidConnection)
        ));
        assert!(matches!(
            transceiver.write_packet(&mut conn, &mut with_header(b"x"), false),
            Err(WireError::InvalidConnection)
        ));
    }

    #[test]
    fn eof_becomes_invalid_connection() {
        let mut wire = plain_frame(0, b"truncated");
        wire.truncate(6);
        let mut conn = reader(wire);
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver.read_packet(&mut conn, false).unwrap_err();
        assert!(matches!(err, WireError::InvalidConnection));
        assert!(conn.is_closed());
        assert!(conn.transport().shut_down.get());
    }

    #[test]
    fn cancellation_cause_surfaces_on_read() {
        let mut conn = reader(Vec::new());
        conn.cancel_token().cancel("context deadline exceeded");
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver.read_packet(&mut conn, false).unwrap_err();
        assert!(
            matches!(err, WireError::Cancelled(ref cause) if cause == "context deadline exceeded")
        );
        assert!(!conn.is_closed());
    }

    #[test]
    fn oversized_rejected_before_io() {
        let config = WireConfig {
            max_allowed_packet: 8,
            ..WireConfig::default()
        };
        let mut conn = Connection::with_config(MemoryTransport::new(), config);
        conn.mark_stale();
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver
            .write_packet(&mut conn, &mut with_header(b"123456789"), false)
            .unwrap_err();
        assert!(matches!(err, WireError::OversizedPacket { size: 9, max: 8 }));
        assert!(!err.is_fatal());
        assert!(conn.transport().output.is_empty());
        assert_eq!(conn.transport().probes.get(), 0);
        assert!(!conn.is_closed());
    }

    #[test]
    fn missing_header_space_rejected() {
        let mut conn = Connection::new(MemoryTransport::new());
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver
            .write_packet(&mut conn, &mut [0u8; 3], false)
            .unwrap_err();
        assert!(matches!(err, WireError::MissingHeaderSpace { len: 3 }));
    }

    #[test]
    fn stale_connection_probed_once() {
        let config = WireConfig {
            read_timeout: Some(Duration::from_secs(1)),
            ..WireConfig::default()
        };
        let mut conn = Connection::with_config(MemoryTransport::new(), config);
        conn.mark_stale();
        let mut transceiver = PacketTransceiver::new();

        transceiver
            .write_packet(&mut conn, &mut with_header(b"a"), false)
            .unwrap();
        transceiver
            .write_packet(&mut conn, &mut with_header(b"b"), false)
            .unwrap();

        assert_eq!(conn.transport().probes.get(), 1);
        assert_eq!(*conn.transport().read_timeouts.borrow(), vec![None]);
        assert!(!conn.is_stale());
    }

    #[test]
    fn failed_probe_is_retryable() {
        let mut transport = MemoryTransport::new();
        transport.probe = Probe::PeerClosed;
        let mut conn = Connection::new(transport);
        conn.mark_stale();
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver
            .write_packet(&mut conn, &mut with_header(b"SELECT 1"), false)
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(conn.is_closed());
        assert!(conn.transport().output.is_empty());
    }

    #[test]
    fn liveness_check_can_be_disabled() {
        let mut transport = MemoryTransport::new();
        transport.probe = Probe::UnexpectedRead;
        let config = WireConfig {
            check_liveness: false,
            ..WireConfig::default()
        };
        let mut conn = Connection::with_config(transport, config);
        conn.mark_stale();
        let mut transceiver = PacketTransceiver::new();

        transceiver
            .write_packet(&mut conn, &mut with_header(b"x"), false)
            .unwrap();
        assert_eq!(conn.transport().probes.get(), 0);
    }

    #[test]
    fn first_write_failure_is_retryable() {
        let mut transport = MemoryTransport::new();
        transport.write_error = Some(ErrorKind::ConnectionReset);
        let mut conn = Connection::new(transport);
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver
            .write_packet(&mut conn, &mut with_header(b"SELECT 1"), false)
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(conn.sequence(), 0);
    }

    #[test]
    fn partial_write_failure_is_fatal() {
        let mut transport = MemoryTransport::new();
        transport.write_error = Some(ErrorKind::ConnectionReset);
        transport.fail_after = 6;
        let mut conn = Connection::new(transport);
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver
            .write_packet(&mut conn, &mut with_header(b"SELECT 1"), false)
            .unwrap_err();
        assert!(matches!(err, WireError::InvalidConnection));
        assert!(conn.is_closed());
    }

    #[test]
    fn short_write_closes_connection() {
        let mut transport = MemoryTransport::new();
        transport.accept_limit = Some(6);
        let mut conn = Connection::new(transport);
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver
            .write_packet(&mut conn, &mut with_header(b"SELECT 1"), false)
            .unwrap_err();
        assert!(matches!(
            err,
            WireError::ShortWrite {
                written: 6,
                expected: 12
            }
        ));
        assert!(conn.is_closed());
    }

    #[test]
    fn cancellation_cause_surfaces_on_write() {
        let mut transport = MemoryTransport::new();
        transport.write_error = Some(ErrorKind::TimedOut);
        let mut conn = Connection::new(transport);
        conn.cancel_token().cancel("query cancelled");
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver
            .write_packet(&mut conn, &mut with_header(b"x"), false)
            .unwrap_err();
        assert!(matches!(err, WireError::Cancelled(ref cause) if cause == "query cancelled"));
    }

    #[test]
    fn compressed_round_trip() {
        let mut writer = Connection::new(MemoryTransport::new());
        let mut transceiver = PacketTransceiver::new();
        let small = b"COM_PING".to_vec();
        let large: Vec<u8> = (0..50_000).map(|i| (i % 7) as u8).collect();

        transceiver
            .write_packet(&mut writer, &mut with_header(&small), true)
            .unwrap();
        transceiver
            .write_packet(&mut writer, &mut with_header(&large), true)
            .unwrap();
        assert_eq!((writer.sequence(), writer.compression_sequence()), (2, 2));

        let mut conn = reader(writer.into_inner().output);
        let mut receiver = PacketTransceiver::new();
        assert_eq!(receiver.read_packet(&mut conn, true).unwrap().as_ref(), small.as_slice());
        assert_eq!(receiver.read_packet(&mut conn, true).unwrap().as_ref(), large.as_slice());
        assert_eq!((conn.sequence(), conn.compression_sequence()), (2, 2));
        assert_eq!(receiver.decompressor().arena().pending(), 0);
    }

    #[test]
    fn compressed_read_reports_compression_sequence() {
        let mut wire = crate::header::CompressedHeader::literal(5, 3).encode().to_vec();
        wire.extend(plain_frame(0, b"x"));
        let mut conn = reader(wire);
        let mut transceiver = PacketTransceiver::new();

        let err = transceiver.read_packet(&mut conn, true).unwrap_err();
        assert!(matches!(
            err,
            WireError::SequenceMismatchAhead {
                layer: SequenceLayer::Compression,
                ..
            }
        ));
        assert!(conn.is_closed());
    }

    #[test]
    fn reset_sequence_between_commands() {
        let mut conn = Connection::new(MemoryTransport::new());
        let mut transceiver = PacketTransceiver::new();

        transceiver
            .write_packet(&mut conn, &mut with_header(b"one"), true)
            .unwrap();
        conn.reset_sequence();
        transceiver
            .write_packet(&mut conn, &mut with_header(b"two"), true)
            .unwrap();

        let frames = crate::testing::split_compressed(&conn.into_inner().output);
        assert_eq!(frames[0].0.sequence, 0);
        assert_eq!(frames[1].0.sequence, 0);
        assert_eq!(frames[1].1[3], 0);
    }
}
