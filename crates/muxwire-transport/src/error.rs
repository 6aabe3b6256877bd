/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind {network} {addr}: {source}")]
    Bind {
        network: String,
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {network} {addr}: {source}")]
    Connect {
        network: String,
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The network name is not one of the known transports.
    #[error("network '{0}' is not supported")]
    UnknownNetwork(String),

    /// The network is known but cannot be served by this build.
    #[error("network '{0}' is recognised but not available")]
    Unavailable(String),

    /// The operation does not apply to this kind of transport.
    #[error("network '{network}' is a {kind} transport")]
    WrongKind {
        network: String,
        kind: &'static str,
    },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong { path: String, len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;
