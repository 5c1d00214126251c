use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// The raw byte transport underneath the packet layer.
///
/// Reads and writes block. Deadlines are expressed as per-operation timeouts
/// that the caller re-arms before each blocking call.
pub trait Transport: Read + Write {
    /// Set (or clear, with `None`) the timeout for blocking reads.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Set (or clear, with `None`) the timeout for blocking writes.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Non-blocking check that an idle connection is still usable.
    ///
    /// Must not consume any bytes. Returns `Ok(())` when nothing is pending
    /// and the peer has not hung up.
    fn check_liveness(&self) -> Result<()>;

    /// Shut down both directions of the connection.
    fn shutdown(&self) -> Result<()>;
}

/// A connected socket stream implementing [`Transport`].
///
/// Wraps either a TCP stream or, on Unix, a Unix domain socket stream.
pub struct NetStream {
    inner: NetStreamInner,
}

enum NetStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl From<TcpStream> for NetStream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: NetStreamInner::Tcp(stream),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for NetStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: NetStreamInner::Unix(stream),
        }
    }
}

impl NetStream {
    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => Ok(Self::from(stream.try_clone()?)),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => Ok(Self::from(stream.try_clone()?)),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            NetStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            NetStreamInner::Unix(_) => "unix-domain-socket",
        }
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;

        match &self.inner {
            NetStreamInner::Tcp(stream) => stream.as_raw_fd(),
            NetStreamInner::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

impl Transport for NetStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    #[cfg(unix)]
    fn check_liveness(&self) -> Result<()> {
        crate::probe::peek_idle(self.raw_fd())
    }

    #[cfg(not(unix))]
    fn check_liveness(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            NetStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            // Already torn down by the peer.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
