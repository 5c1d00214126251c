//! Packet framing and compression for a MySQL client connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: blocking byte-stream transports (TCP, Unix sockets)
//! - [`packet`]: packet splitting, sequencing and zlib compression
//! - [`logging`]: stderr tracing subscriber setup (behind `logging` feature)

/// Re-export transport types.
pub mod transport {
    pub use sqlwire_transport::*;
}

/// Re-export packet types.
pub mod packet {
    pub use sqlwire_packet::*;
}

#[cfg(feature = "logging")]
pub mod logging;
