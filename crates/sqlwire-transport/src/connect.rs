use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::NetStream;

/// Connect to a TCP address (blocking).
///
/// Tries each resolved address in turn. With a `timeout`, each attempt is
/// bounded by it. `TCP_NODELAY` is enabled on the resulting stream.
pub fn connect_tcp(addr: &str, timeout: Option<Duration>) -> Result<NetStream> {
    let candidates = addr
        .to_socket_addrs()
        .map_err(|e| TransportError::ConnectTcp {
            addr: addr.to_string(),
            source: e,
        })?;

    let mut last_err = None;
    for candidate in candidates {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
            None => TcpStream::connect(candidate),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!(%candidate, "connected over tcp");
                return Ok(NetStream::from(stream));
            }
            Err(err) => {
                debug!(%candidate, error = %err, "tcp connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::ConnectTcp {
        addr: addr.to_string(),
        source: last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "address resolved to no candidates",
            )
        }),
    })
}

/// Connect to a listening Unix domain socket (blocking).
#[cfg(unix)]
pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<NetStream> {
    let path = path.as_ref();
    let stream =
        std::os::unix::net::UnixStream::connect(path).map_err(|e| TransportError::ConnectUnix {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!(?path, "connected to unix domain socket");
    Ok(NetStream::from(stream))
}
