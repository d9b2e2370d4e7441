use std::io::Read;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::config::ResponseConfig;
use crate::error::{ResponseError, Result};
use crate::pump::{self, ShutdownSignal};

/// Frames replies from a prompt/response byte stream.
///
/// A device takes a variable time to answer a prompt and then streams the
/// reply out. Two timeouts bound a read: `overall_timeout` for the first
/// byte, then `chunk_timeout` for each gap between chunks. Once a reply has
/// started, a gap of `chunk_timeout` with no data ends it, so the payload
/// never has to be parsed to find where it stops.
///
/// A background pump thread owns the read half of the stream for the whole
/// life of the engine. Dropping the engine asks the pump to stop; it exits
/// once its current blocking read returns.
pub struct ResponseReader {
    chunks: Receiver<Bytes>,
    config: ResponseConfig,
    signal: ShutdownSignal,
    pump: JoinHandle<()>,
}

impl ResponseReader {
    /// Create an engine over `reader` with explicit timeouts.
    ///
    /// `overall_timeout` bounds the wait for the first byte; if it passes with
    /// nothing received, reads fail with [`ResponseError::Timeout`].
    /// `chunk_timeout` is the silence between chunks that completes a reply.
    pub fn new<R>(reader: R, overall_timeout: Duration, chunk_timeout: Duration) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::with_config(reader, ResponseConfig::new(overall_timeout, chunk_timeout))
    }

    /// Create an engine over `reader` with explicit configuration.
    pub fn with_config<R>(reader: R, config: ResponseConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        config.validate()?;
        let signal = ShutdownSignal::new();
        let pump = pump::spawn(reader, &config, signal.clone())?;
        Ok(Self {
            chunks: pump.chunks,
            config,
            signal,
            pump: pump.handle,
        })
    }

    /// Read one framed reply into `buf`.
    ///
    /// Returns the number of bytes copied once the reply is complete, that
    /// is after a gap of `chunk_timeout`. Bytes that do not fit in `buf` are
    /// dropped: the rest of an oversized chunk, and any chunk arriving after
    /// `buf` is full but before the gap. They are not returned by the next
    /// read.
    ///
    /// Fails with [`ResponseError::Timeout`] if nothing arrives within
    /// `overall_timeout`, and with [`ResponseError::EndOfStream`] once the
    /// pump has stopped (bytes copied before that are already in `buf`).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(ResponseError::EmptyBuffer);
        }

        let mut deadline = deadline_after(self.config.overall_timeout);
        let mut copied = 0usize;

        loop {
            match self.recv_until(deadline) {
                Ok(chunk) => {
                    let take = chunk.len().min(buf.len() - copied);
                    buf[copied..copied + take].copy_from_slice(&chunk[..take]);
                    copied += take;
                    if take < chunk.len() {
                        trace!(
                            dropped = chunk.len() - take,
                            "reply overflows buffer; bytes dropped"
                        );
                    }
                    deadline = deadline_after(self.config.chunk_timeout);
                }
                Err(RecvTimeoutError::Timeout) if copied > 0 => return Ok(copied),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ResponseError::Timeout(self.config.overall_timeout))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ResponseError::EndOfStream { received: copied })
                }
            }
        }
    }

    /// Discard input until the stream has been quiet for `chunk_timeout`.
    ///
    /// Used before sending a prompt so that a late reply to an earlier prompt
    /// is not mistaken for the answer to the new one. Returns the number of
    /// bytes discarded.
    pub fn flush(&mut self) -> Result<usize> {
        let mut deadline = deadline_after(self.config.chunk_timeout);
        let mut discarded = 0usize;

        loop {
            match self.recv_until(deadline) {
                Ok(chunk) => {
                    discarded += chunk.len();
                    deadline = deadline_after(self.config.chunk_timeout);
                }
                Err(RecvTimeoutError::Timeout) => return Ok(discarded),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ResponseError::EndOfStream {
                        received: discarded,
                    })
                }
            }
        }
    }

    /// Next chunk, waiting until `deadline`. `None` waits without limit.
    fn recv_until(
        &self,
        deadline: Option<Instant>,
    ) -> std::result::Result<Bytes, RecvTimeoutError> {
        match deadline {
            Some(deadline) => self
                .chunks
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => self.chunks.recv().map_err(|_| RecvTimeoutError::Disconnected),
        }
    }

    /// A handle that asks the pump to stop.
    ///
    /// Triggering it only takes effect once the pump's current read of the
    /// underlying stream returns, so it is normally followed by closing the
    /// stream (which the duplex adapters do).
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Whether the pump thread has exited.
    pub fn is_pump_finished(&self) -> bool {
        self.pump.is_finished()
    }

    /// Current engine configuration.
    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }
}

/// `None` when `timeout` is too long to express as an `Instant`.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

impl Drop for ResponseReader {
    fn drop(&mut self) {
        if self.signal.trigger() {
            debug!("response reader dropped; signalling byte pump");
        }
    }
}

impl std::fmt::Debug for ResponseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseReader")
            .field("config", &self.config)
            .field("closed", &self.signal.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::Shutdown;
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;
    use crate::test_support::{wait_until, ScriptedReader};

    fn engine(reader: ScriptedReader, overall_ms: u64, chunk_ms: u64) -> ResponseReader {
        ResponseReader::new(
            reader,
            Duration::from_millis(overall_ms),
            Duration::from_millis(chunk_ms),
        )
        .unwrap()
    }

    fn engine_with(reader: ScriptedReader, overall: Duration, chunk: Duration) -> ResponseReader {
        ResponseReader::new(reader, overall, chunk).unwrap()
    }

    #[test]
    fn gap_completes_reply() {
        // "OK" at t=0, "\r\n" at t=5ms, then silence.
        let (reader, script) = ScriptedReader::new();
        let mut rr = engine(reader, 100, 20);

        let start = Instant::now();
        script.send_after(Duration::ZERO, b"OK");
        script.send_after(Duration::from_millis(5), b"\r\n");

        let mut buf = [0u8; 16];
        let n = rr.read(&mut buf).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(&buf[..n], b"OK\r\n");
        assert!(elapsed >= Duration::from_millis(20), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(90), "waited for overall timeout: {elapsed:?}");
    }

    #[test]
    fn silence_times_out() {
        let (reader, _script) = ScriptedReader::new();
        let mut rr = engine(reader, 30, 10);

        let start = Instant::now();
        let mut buf = [0u8; 16];
        let err = rr.read(&mut buf).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ResponseError::Timeout(d) if d == Duration::from_millis(30)));
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn oversized_chunk_is_truncated_not_carried() {
        let (reader, script) = ScriptedReader::new();
        let mut rr = ResponseReader::with_config(
            reader,
            ResponseConfig {
                read_chunk_size: 512,
                ..ResponseConfig::new(Duration::from_millis(100), Duration::from_millis(10))
            },
        )
        .unwrap();

        let payload: Vec<u8> = (0..200u8).collect();
        script.send_after(Duration::ZERO, &payload);

        let mut buf = [0u8; 16];
        let n = rr.read(&mut buf).unwrap();
        assert_eq!(n, 16);
        assert_eq!(&buf[..], &payload[..16]);

        let err = rr.read(&mut buf).unwrap_err();
        assert!(matches!(err, ResponseError::Timeout(_)));
    }

    #[test]
    fn oversized_reply_across_chunks_is_not_carried() {
        // With the default read size, 200 bytes reach the engine as 128 + 72.
        let (device, host) = UnixStream::pair().unwrap();
        let mut rr =
            ResponseReader::new(host, Duration::from_millis(100), Duration::from_millis(20))
                .unwrap();

        let payload: Vec<u8> = (0..200u8).collect();
        (&device).write_all(&payload).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(rr.read(&mut buf).unwrap(), 16);
        assert_eq!(&buf[..], &payload[..16]);

        let err = rr.read(&mut buf).unwrap_err();
        assert!(matches!(err, ResponseError::Timeout(_)), "overflow carried over: {buf:?}");
    }

    #[test]
    fn full_buffer_waits_for_gap_and_drops_the_rest() {
        let (reader, script) = ScriptedReader::new();
        let mut rr = engine(reader, 300, 40);

        script.send_after(Duration::ZERO, b"ABCD");
        script.send_after(Duration::from_millis(10), b"EF");
        let start = Instant::now();
        let mut buf = [0u8; 4];
        assert_eq!(rr.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ABCD");
        assert!(start.elapsed() >= Duration::from_millis(40));

        assert!(matches!(rr.read(&mut buf), Err(ResponseError::Timeout(_))));
    }

    #[test]
    fn unrepresentable_timeouts_wait_without_deadline() {
        let (reader, script) = ScriptedReader::new();
        let mut rr = engine_with(reader, Duration::MAX, Duration::from_millis(20));

        script.send_after(Duration::from_millis(10), b"OK");
        let mut buf = [0u8; 8];
        let n = rr.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"OK");

        let (reader, script) = ScriptedReader::new();
        let mut rr = engine_with(reader, Duration::from_secs(1), Duration::MAX);
        let signal = rr.shutdown_signal();
        script.send_after(Duration::ZERO, b"stale");
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signal.trigger();
        });
        assert!(matches!(rr.flush(), Err(ResponseError::EndOfStream { received: 5 })));
    }

    #[test]
    fn chunks_accumulate_across_short_gaps() {
        let (reader, script) = ScriptedReader::new();
        let mut rr = engine(reader, 200, 40);

        script.send_after(Duration::ZERO, b"+CSQ: ");
        script.send_after(Duration::from_millis(10), b"17,");
        script.send_after(Duration::from_millis(10), b"99\r\n");

        let mut buf = [0u8; 64];
        let n = rr.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"+CSQ: 17,99\r\n");
    }

    #[test]
    fn slow_first_byte_within_overall_timeout() {
        let (reader, script) = ScriptedReader::new();
        let mut rr = engine(reader, 300, 20);

        script.send_after(Duration::from_millis(60), b"READY");

        let mut buf = [0u8; 16];
        let n = rr.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"READY");
    }

    #[test]
    fn long_gap_splits_replies() {
        let (reader, script) = ScriptedReader::new();
        let mut rr = engine(reader, 300, 20);

        script.send_after(Duration::ZERO, b"first");
        script.send_after(Duration::from_millis(80), b"second");

        let mut buf = [0u8; 32];
        let n = rr.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"first");
        let n = rr.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"second");
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let (reader, _script) = ScriptedReader::new();
        let mut rr = engine(reader, 30, 10);
        let mut buf = [0u8; 0];
        assert!(matches!(rr.read(&mut buf), Err(ResponseError::EmptyBuffer)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (reader, _script) = ScriptedReader::new();
        let result = ResponseReader::new(reader, Duration::ZERO, Duration::from_millis(1));
        assert!(matches!(result, Err(ResponseError::InvalidConfig(_))));
    }

    #[test]
    fn flush_discards_pending_and_reports_count() {
        let (reader, script) = ScriptedReader::new();
        let mut rr = engine(reader, 100, 20);

        script.send_after(Duration::ZERO, b"stale");
        script.send_after(Duration::from_millis(5), b" reply");

        assert_eq!(rr.flush().unwrap(), 11);

        let mut buf = [0u8; 16];
        assert!(matches!(rr.read(&mut buf), Err(ResponseError::Timeout(_))));
    }

    #[test]
    fn flush_on_quiet_stream_uses_chunk_timeout_only() {
        let (reader, _script) = ScriptedReader::new();
        let mut rr = engine(reader, 2000, 15);

        let start = Instant::now();
        assert_eq!(rr.flush().unwrap(), 0);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn blocked_read_ends_after_close() {
        let (device, host) = UnixStream::pair().unwrap();
        let closer = host.try_clone().unwrap();
        let mut rr = ResponseReader::new(host, Duration::from_secs(5), Duration::from_millis(50))
            .unwrap();
        let signal = rr.shutdown_signal();

        let reader_thread = thread::spawn(move || {
            let mut buf = [0u8; 16];
            let result = rr.read(&mut buf);
            (result, rr)
        });

        thread::sleep(Duration::from_millis(30));
        signal.trigger();
        closer.shutdown(Shutdown::Both).unwrap();

        let (result, rr) = reader_thread.join().unwrap();
        assert!(matches!(result, Err(ResponseError::EndOfStream { received: 0 })));
        assert!(wait_until(Duration::from_secs(1), || rr.is_pump_finished()));
        drop(device);
    }

    #[test]
    fn end_of_stream_keeps_partial_reply() {
        let (mut device, host) = UnixStream::pair().unwrap();
        let closer = host.try_clone().unwrap();
        let mut rr = ResponseReader::new(host, Duration::from_secs(5), Duration::from_secs(2))
            .unwrap();
        let signal = rr.shutdown_signal();

        device.write_all(b"PART").unwrap();
        let reader_thread = thread::spawn(move || {
            let mut buf = [0u8; 16];
            let result = rr.read(&mut buf);
            (result, buf)
        });

        thread::sleep(Duration::from_millis(50));
        signal.trigger();
        closer.shutdown(Shutdown::Both).unwrap();

        let (result, buf) = reader_thread.join().unwrap();
        assert!(matches!(result, Err(ResponseError::EndOfStream { received: 4 })));
        assert_eq!(&buf[..4], b"PART");
    }

    #[test]
    fn reads_after_shutdown_report_end_of_stream() {
        let (_device, host) = UnixStream::pair().unwrap();
        let closer = host.try_clone().unwrap();
        let mut rr = ResponseReader::new(host, Duration::from_millis(50), Duration::from_millis(10))
            .unwrap();

        rr.shutdown_signal().trigger();
        closer.shutdown(Shutdown::Both).unwrap();
        assert!(wait_until(Duration::from_secs(1), || rr.is_pump_finished()));

        let mut buf = [0u8; 8];
        assert!(matches!(
            rr.read(&mut buf),
            Err(ResponseError::EndOfStream { received: 0 })
        ));
        assert!(matches!(
            rr.flush(),
            Err(ResponseError::EndOfStream { received: 0 })
        ));
    }

    #[test]
    fn debug_reports_closed_state() {
        let (reader, _script) = ScriptedReader::new();
        let rr = engine(reader, 30, 10);
        assert_eq!(rr.config().chunk_timeout, Duration::from_millis(10));
        assert!(format!("{rr:?}").contains("closed: false"));
        rr.shutdown_signal().trigger();
        assert!(format!("{rr:?}").contains("closed: true"));
    }
}
