use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Failed to open a serial device node.
    #[error("failed to open serial device {path}: {source}")]
    OpenDevice {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The address did not resolve to anything usable.
    #[error("address {0} did not resolve")]
    Unresolved(String),

    /// Local address lookup failed after bind.
    #[error("bound listener has no local address: {0}")]
    NoLocalAddr(std::io::Error),
}

impl TransportError {
    /// Address helper for bind/connect errors.
    pub(crate) fn addr_string(addr: &[SocketAddr]) -> String {
        addr.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
