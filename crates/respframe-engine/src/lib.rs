//! Dual-timeout response framing for prompt/response byte streams.
//!
//! Devices that answer a prompt with an unframed burst of bytes (modems,
//! serial instruments, line-oriented test rigs) give no length prefix and
//! no terminator the host can rely on. The engine frames a reply by time:
//! - an overall timeout bounds the wait for the first byte
//! - a chunk timeout ends the reply once the device goes quiet
//!
//! A background pump does the blocking reads so the timeouts hold no matter
//! how the underlying stream blocks.

pub mod config;
pub mod duplex;
pub mod error;
pub mod pump;
pub mod reader;

#[cfg(feature = "async")]
pub mod async_reader;

#[cfg(test)]
mod test_support;

pub use config::{
    ResponseConfig, DEFAULT_CHUNK_TIMEOUT, DEFAULT_IDLE_BACKOFF, DEFAULT_OVERALL_TIMEOUT,
    DEFAULT_READ_CHUNK_SIZE,
};
pub use duplex::{ResponseReadCloser, ResponseReadWriteCloser, ResponseReadWriter};
pub use error::{ResponseError, Result};
pub use pump::ShutdownSignal;
pub use reader::ResponseReader;

#[cfg(feature = "async")]
pub use async_reader::{AsyncResponseReader, AsyncResponseStream};
