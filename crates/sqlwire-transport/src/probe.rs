use std::io::ErrorKind;
use std::os::fd::RawFd;

use crate::error::{Result, TransportError};

/// Peek at an idle socket without blocking or consuming data.
///
/// Would-block means the connection is idle and healthy. A zero-length peek
/// means the peer hung up; any pending byte means the protocol is out of step.
pub(crate) fn peek_idle(fd: RawFd) -> Result<()> {
    let mut byte = 0u8;
    loop {
        // SAFETY: `byte` is a valid writable buffer of length 1, and `fd` is an
        // open socket descriptor owned by the calling stream for this call.
        let rc = unsafe {
            libc::recv(
                fd,
                (&mut byte as *mut u8).cast::<libc::c_void>(),
                1,
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };

        match rc {
            0 => return Err(TransportError::PeerClosed),
            n if n > 0 => return Err(TransportError::UnexpectedRead),
            _ => {
                let err = std::io::Error::last_os_error();
                match err.kind() {
                    ErrorKind::WouldBlock => return Ok(()),
                    ErrorKind::Interrupted => continue,
                    _ => return Err(TransportError::Io(err)),
                }
            }
        }
    }
}
