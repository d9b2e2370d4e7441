use std::io::ErrorKind;
use std::time::Duration;

/// Errors surfaced by the response framing engine.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    /// No byte arrived within the overall timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The byte pump has shut down.
    ///
    /// `received` is the number of bytes handled by the call before the end
    /// was observed: copied into the caller's buffer for a read, discarded
    /// for a flush.
    #[error("response stream ended after {received} bytes")]
    EndOfStream { received: usize },

    /// A zero-length buffer was passed to a read.
    #[error("read buffer must not be empty")]
    EmptyBuffer,

    /// The engine configuration is unusable.
    #[error("invalid response config: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while setting up the engine.
    #[error("response engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ResponseError>;

impl From<ResponseError> for std::io::Error {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Io(io) => io,
            ResponseError::Timeout(_) => std::io::Error::new(ErrorKind::TimedOut, err),
            ResponseError::EndOfStream { .. } => std::io::Error::new(ErrorKind::UnexpectedEof, err),
            ResponseError::EmptyBuffer | ResponseError::InvalidConfig(_) => {
                std::io::Error::new(ErrorKind::InvalidInput, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_mapping_preserves_kind() {
        let timeout: std::io::Error = ResponseError::Timeout(Duration::from_millis(30)).into();
        assert_eq!(timeout.kind(), ErrorKind::TimedOut);

        let eof: std::io::Error = ResponseError::EndOfStream { received: 0 }.into();
        assert_eq!(eof.kind(), ErrorKind::UnexpectedEof);

        let empty: std::io::Error = ResponseError::EmptyBuffer.into();
        assert_eq!(empty.kind(), ErrorKind::InvalidInput);

        let raw = std::io::Error::new(ErrorKind::PermissionDenied, "tty");
        let passthrough: std::io::Error = ResponseError::Io(raw).into();
        assert_eq!(passthrough.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            ResponseError::EndOfStream { received: 4 }.to_string(),
            "response stream ended after 4 bytes"
        );
        assert_eq!(
            ResponseError::Timeout(Duration::from_millis(100)).to_string(),
            "no response within 100ms"
        );
    }
}
