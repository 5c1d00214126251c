//! Blocking socket transport for the MySQL client wire protocol.
//!
//! Provides a unified interface over the sockets a MySQL client talks through:
//! - TCP streams
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of sqlwire. The packet layer only sees the
//! [`Transport`] trait: blocking read/write, timeouts, a liveness probe.

pub mod connect;
pub mod error;
pub mod traits;

#[cfg(unix)]
mod probe;

#[cfg(unix)]
pub use connect::connect_unix;
pub use connect::connect_tcp;
pub use error::{Result, TransportError};
pub use traits::{NetStream, Transport};
