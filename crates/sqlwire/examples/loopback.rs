//! Compressed packet round trip over a local socket pair.
//!
//! Run with:
//!   cargo run --example loopback
//!
//! Set `SQLWIRE_LOG=trace` to see every frame, `SQLWIRE_LOG_FORMAT=json` for JSON.

#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::thread;

#[cfg(unix)]
use sqlwire::packet::{Connection, PacketTransceiver, PACKET_HEADER_SIZE};
#[cfg(unix)]
use sqlwire::transport::NetStream;

#[cfg(not(unix))]
fn main() {
    eprintln!("the loopback example needs Unix domain sockets");
}

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    sqlwire::logging::init_from_env();

    let (client, server) = UnixStream::pair()?;

    let server = thread::spawn(move || -> Result<(), sqlwire::packet::WireError> {
        let mut conn = Connection::new(NetStream::from(server));
        let mut transceiver = PacketTransceiver::new();
        loop {
            let query = match transceiver.read_packet(&mut conn, true) {
                Ok(packet) => packet.into_owned(),
                Err(_) => return Ok(()),
            };
            let mut reply = vec![0u8; PACKET_HEADER_SIZE];
            reply.extend_from_slice(&query);
            transceiver.write_packet(&mut conn, &mut reply, true)?;
            conn.reset_sequence();
        }
    });

    let mut conn = Connection::new(NetStream::from(client));
    let mut transceiver = PacketTransceiver::new();
    for size in [16usize, 4 * 1024, 1024 * 1024] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 61) as u8).collect();
        let mut packet = vec![0u8; PACKET_HEADER_SIZE];
        packet.extend_from_slice(&payload);

        conn.reset_sequence();
        transceiver.write_packet(&mut conn, &mut packet, true)?;
        let echoed = transceiver.read_packet(&mut conn, true)?;
        assert_eq!(echoed.as_ref(), payload.as_slice());
        eprintln!("echoed {size} bytes");
    }

    eprintln!(
        "sent {} bytes, received {} bytes on the wire",
        conn.bytes_sent(),
        conn.bytes_received()
    );
    conn.close();
    server.join().map_err(|_| "server thread panicked")??;
    Ok(())
}
