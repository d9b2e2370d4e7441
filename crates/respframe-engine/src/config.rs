use std::time::Duration;

use crate::error::{ResponseError, Result};

/// Default time to wait for the first byte of a reply.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default silence gap that ends a reply once it has started.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_millis(50);

/// Default capacity of the pump's scratch buffer, and so the largest chunk.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 128;

/// Default pause after a zero-byte or failed read of the underlying stream.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// Timing and sizing for a response engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseConfig {
    /// Maximum wait for the first byte of a reply.
    pub overall_timeout: Duration,
    /// Maximum silence between chunks once a reply has started. Its expiry
    /// completes the reply.
    pub chunk_timeout: Duration,
    /// Bytes requested from the underlying stream per pump read.
    pub read_chunk_size: usize,
    /// Sleep after a read that produced nothing, so a misbehaving stream
    /// cannot spin the pump.
    pub idle_backoff: Duration,
}

impl ResponseConfig {
    /// Config with explicit timeouts and default sizing.
    pub fn new(overall_timeout: Duration, chunk_timeout: Duration) -> Self {
        Self {
            overall_timeout,
            chunk_timeout,
            ..Self::default()
        }
    }

    /// Check that the config can drive an engine.
    pub fn validate(&self) -> Result<()> {
        if self.overall_timeout.is_zero() {
            return Err(ResponseError::InvalidConfig(
                "overall_timeout must be greater than zero".to_string(),
            ));
        }
        if self.chunk_timeout.is_zero() {
            return Err(ResponseError::InvalidConfig(
                "chunk_timeout must be greater than zero".to_string(),
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(ResponseError::InvalidConfig(
                "read_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_timeout >= self.overall_timeout {
            tracing::warn!(
                overall_timeout = ?self.overall_timeout,
                chunk_timeout = ?self.chunk_timeout,
                "chunk timeout is not shorter than overall timeout"
            );
        }
        Ok(())
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}
