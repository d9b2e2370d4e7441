//! Tokio rendition of the response engine.
//!
//! The pump is a task instead of a thread, and shutdown is a
//! [`CancellationToken`] raced against every read and hand-off, so closing
//! does not depend on the transport waking a blocked read.

use std::io::ErrorKind;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ResponseConfig;
use crate::error::{ResponseError, Result};

/// Async response framing engine. Same read/flush semantics as
/// [`ResponseReader`](crate::ResponseReader).
pub struct AsyncResponseReader {
    chunks: mpsc::Receiver<Bytes>,
    config: ResponseConfig,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

impl AsyncResponseReader {
    /// Spawn the pump task for `reader` on the current runtime.
    pub fn new<R>(reader: R, config: ResponseConfig) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        config.validate()?;
        // Single slot: the pump waits for the engine before reading more.
        let (tx, chunks) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(run_pump(reader, tx, cancel.clone(), config));
        Ok(Self {
            chunks,
            config,
            cancel,
            pump,
        })
    }

    /// Read one framed reply into `buf`.
    /// See [`ResponseReader::read`](crate::ResponseReader::read).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(ResponseError::EmptyBuffer);
        }

        let timer = sleep(self.config.overall_timeout);
        tokio::pin!(timer);
        let mut copied = 0usize;

        loop {
            tokio::select! {
                chunk = self.chunks.recv() => {
                    let Some(chunk) = chunk else {
                        return Err(ResponseError::EndOfStream { received: copied });
                    };
                    let take = chunk.len().min(buf.len() - copied);
                    buf[copied..copied + take].copy_from_slice(&chunk[..take]);
                    copied += take;
                    if take < chunk.len() {
                        trace!(
                            dropped = chunk.len() - take,
                            "reply overflows buffer; bytes dropped"
                        );
                    }
                    timer.as_mut().reset(deadline_after(self.config.chunk_timeout));
                }
                () = &mut timer => {
                    if copied > 0 {
                        return Ok(copied);
                    }
                    return Err(ResponseError::Timeout(self.config.overall_timeout));
                }
            }
        }
    }

    /// Discard input until quiet for `chunk_timeout`.
    /// See [`ResponseReader::flush`](crate::ResponseReader::flush).
    pub async fn flush(&mut self) -> Result<usize> {
        let timer = sleep(self.config.chunk_timeout);
        tokio::pin!(timer);
        let mut discarded = 0usize;

        loop {
            tokio::select! {
                chunk = self.chunks.recv() => {
                    let Some(chunk) = chunk else {
                        return Err(ResponseError::EndOfStream { received: discarded });
                    };
                    discarded += chunk.len();
                    timer.as_mut().reset(deadline_after(self.config.chunk_timeout));
                }
                () = &mut timer => return Ok(discarded),
            }
        }
    }

    /// Token that stops the pump when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the pump task has exited.
    pub fn is_pump_finished(&self) -> bool {
        self.pump.is_finished()
    }
}

/// Like `sleep`, saturates a timeout too long to add to `Instant::now()`.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

impl Drop for AsyncResponseReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_pump<R>(
    mut reader: R,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    config: ResponseConfig,
) where
    R: AsyncRead + Unpin,
{
    debug!(read_chunk_size = config.read_chunk_size, "async byte pump started");
    let mut scratch = vec![0u8; config.read_chunk_size];

    loop {
        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = reader.read(&mut scratch) => read,
        };

        match read {
            Ok(0) => {}
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&scratch[..n]);
                trace!(len = n, "chunk read");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = tx.send(chunk) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => trace!(error = %err, "stream read failed; backing off"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = sleep(config.idle_backoff) => {}
        }
    }

    debug!("async byte pump stopped");
}

/// Async duplex adapter: framed reads, prompt writes and close.
pub struct AsyncResponseStream<W> {
    reader: AsyncResponseReader,
    writer: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> AsyncResponseStream<W> {
    pub fn new(reader: AsyncResponseReader, writer: W) -> Self {
        Self {
            reader,
            writer,
            closed: false,
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read(buf).await
    }

    pub async fn flush(&mut self) -> Result<usize> {
        self.reader.flush().await
    }

    /// Flush stale input, then pass the write through.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.discard_stale().await?;
        Ok(self.writer.write(buf).await?)
    }

    /// Flush stale input once, then write the whole prompt.
    pub async fn send_prompt(&mut self, prompt: &[u8]) -> Result<()> {
        self.discard_stale().await?;
        self.writer.write_all(prompt).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a prompt and read its reply into `buf`.
    pub async fn query(&mut self, prompt: &[u8], buf: &mut [u8]) -> Result<usize> {
        self.send_prompt(prompt).await?;
        self.reader.read(buf).await
    }

    /// Cancel the pump and shut the writer down. Only the first call acts.
    pub async fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader.cancel.cancel();
        debug!("closing async response stream");
        self.writer.shutdown().await
    }

    pub fn reader(&self) -> &AsyncResponseReader {
        &self.reader
    }

    async fn discard_stale(&mut self) -> Result<()> {
        let discarded = self.reader.flush().await?;
        if discarded > 0 {
            debug!(discarded, "dropped stale response bytes before prompt");
        }
        Ok(())
    }
}

impl<S> AsyncResponseStream<WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Split `stream`, pump its read half and keep the write half.
    pub fn from_stream(stream: S, config: ResponseConfig) -> Result<Self> {
        let (read_half, write_half): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        let reader = AsyncResponseReader::new(read_half, config)?;
        Ok(Self::new(reader, write_half))
    }
}
