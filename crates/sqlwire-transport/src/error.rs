use std::path::PathBuf;

/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to a TCP address.
    #[error("failed to connect to {addr}: {source}")]
    ConnectTcp {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to a Unix domain socket path.
    #[error("failed to connect to {path}: {source}")]
    ConnectUnix {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The liveness probe found unread bytes on an idle connection.
    #[error("unexpected read from idle connection")]
    UnexpectedRead,

    /// The liveness probe found the peer had closed the connection.
    #[error("connection closed by peer")]
    PeerClosed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
