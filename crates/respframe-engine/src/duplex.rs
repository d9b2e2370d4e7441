//! Duplex adapters.
//!
//! Each adapter pairs a [`ResponseReader`] with the write and/or close half
//! of the same device:
//! - [`ResponseReadCloser`]: framed reads plus close
//! - [`ResponseReadWriter`]: framed reads plus prompt writes
//! - [`ResponseReadWriteCloser`]: both
//!
//! Writes flush stale input first, so at most one reply is in flight: bytes
//! left over from an earlier exchange are dropped before the next prompt goes
//! out and cannot be taken for its reply.

use std::io::{Read, Write};

use respframe_transport::{Close, DeviceStream};
use tracing::debug;

use crate::config::ResponseConfig;
use crate::error::{ResponseError, Result};
use crate::reader::ResponseReader;

/// Framed read for the `std::io::Read` impls.
///
/// A reply cut short by end of stream still returns its bytes; the following
/// read then reports EOF as `Ok(0)`.
fn io_read(reader: &mut ResponseReader, buf: &mut [u8]) -> std::io::Result<usize> {
    match reader.read(buf) {
        Ok(n) => Ok(n),
        Err(ResponseError::EndOfStream { received }) => Ok(received),
        Err(err) => Err(err.into()),
    }
}

/// Flush stale input ahead of a prompt. Only an error stops the write.
fn flush_before_prompt(reader: &mut ResponseReader) -> Result<()> {
    let discarded = reader.flush()?;
    if discarded > 0 {
        debug!(discarded, "dropped stale response bytes before prompt");
    }
    Ok(())
}

/// Signal the pump, then close the device. Only the first call closes.
fn close_once<C: Close>(
    reader: &ResponseReader,
    closer: &mut C,
    closed: &mut bool,
) -> std::io::Result<()> {
    if *closed {
        return Ok(());
    }
    *closed = true;
    reader.shutdown_signal().trigger();
    debug!("closing response stream");
    closer.close()
}

/// Framed reads plus pass-through close.
pub struct ResponseReadCloser<C> {
    reader: ResponseReader,
    closer: C,
    closed: bool,
}

impl<C: Close> ResponseReadCloser<C> {
    pub fn new(reader: ResponseReader, closer: C) -> Self {
        Self {
            reader,
            closer,
            closed: false,
        }
    }

    /// Read one framed reply. See [`ResponseReader::read`].
    pub fn read_response(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read(buf)
    }

    /// Discard pending input. See [`ResponseReader::flush`].
    pub fn discard_input(&mut self) -> Result<usize> {
        self.reader.flush()
    }

    /// Stop the pump and close the device.
    ///
    /// The first call returns the device's close result unmodified; later
    /// calls do nothing.
    pub fn close(&mut self) -> std::io::Result<()> {
        close_once(&self.reader, &mut self.closer, &mut self.closed)
    }

    pub fn reader(&self) -> &ResponseReader {
        &self.reader
    }
}

impl<C: Close> Read for ResponseReadCloser<C> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        io_read(&mut self.reader, buf)
    }
}

/// Framed reads plus prompt writes.
pub struct ResponseReadWriter<W> {
    reader: ResponseReader,
    writer: W,
}

impl<W: Write> ResponseReadWriter<W> {
    pub fn new(reader: ResponseReader, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read one framed reply. See [`ResponseReader::read`].
    pub fn read_response(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read(buf)
    }

    /// Discard pending input. See [`ResponseReader::flush`].
    pub fn discard_input(&mut self) -> Result<usize> {
        self.reader.flush()
    }

    /// Flush stale input once, then write the whole prompt.
    pub fn send_prompt(&mut self, prompt: &[u8]) -> Result<()> {
        flush_before_prompt(&mut self.reader)?;
        self.writer.write_all(prompt)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn reader(&self) -> &ResponseReader {
        &self.reader
    }
}

impl<W: Write> Read for ResponseReadWriter<W> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        io_read(&mut self.reader, buf)
    }
}

impl<W: Write> Write for ResponseReadWriter<W> {
    /// Flushes stale input, then passes the write through.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        flush_before_prompt(&mut self.reader)?;
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Framed reads, prompt writes and close over one device.
pub struct ResponseReadWriteCloser<S> {
    reader: ResponseReader,
    stream: S,
    closed: bool,
}

impl<S: Write + Close> ResponseReadWriteCloser<S> {
    pub fn new(reader: ResponseReader, stream: S) -> Self {
        Self {
            reader,
            stream,
            closed: false,
        }
    }

    /// Read one framed reply. See [`ResponseReader::read`].
    pub fn read_response(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read(buf)
    }

    /// Discard pending input. See [`ResponseReader::flush`].
    pub fn discard_input(&mut self) -> Result<usize> {
        self.reader.flush()
    }

    /// Flush stale input once, then write the whole prompt.
    pub fn send_prompt(&mut self, prompt: &[u8]) -> Result<()> {
        flush_before_prompt(&mut self.reader)?;
        self.stream.write_all(prompt)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Send a prompt and read its reply into `buf`.
    pub fn query(&mut self, prompt: &[u8], buf: &mut [u8]) -> Result<usize> {
        self.send_prompt(prompt)?;
        self.reader.read(buf)
    }

    /// Stop the pump and close the device.
    ///
    /// The first call returns the device's close result unmodified; later
    /// calls do nothing.
    pub fn close(&mut self) -> std::io::Result<()> {
        close_once(&self.reader, &mut self.stream, &mut self.closed)
    }

    pub fn reader(&self) -> &ResponseReader {
        &self.reader
    }
}

impl ResponseReadWriteCloser<DeviceStream> {
    /// Build an engine over a clone of `stream` and keep the original for
    /// writes and close.
    pub fn from_device_stream(stream: DeviceStream, config: ResponseConfig) -> Result<Self> {
        let read_half = stream.try_clone().map_err(|err| match err {
            respframe_transport::TransportError::Io(io) => ResponseError::Io(io),
            other => ResponseError::Io(std::io::Error::other(other.to_string())),
        })?;
        let reader = ResponseReader::with_config(read_half, config)?;
        Ok(Self::new(reader, stream))
    }
}

impl<S: Write + Close> Read for ResponseReadWriteCloser<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        io_read(&mut self.reader, buf)
    }
}

impl<S: Write + Close> Write for ResponseReadWriteCloser<S> {
    /// Flushes stale input, then passes the write through.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        flush_before_prompt(&mut self.reader)?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
