use std::path::PathBuf;

/// Errors that can occur while opening or serving a device transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to or open the specified device.
    #[error("failed to open {target}: {source}")]
    Connect {
        target: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The target string could not be parsed.
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The target kind is known but this build cannot open it.
    #[error("{0} targets are not supported by this build")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;
