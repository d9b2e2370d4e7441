//! Background byte pump.
//!
//! One pump thread per engine performs blocking reads against the underlying
//! stream and hands each non-empty result to the engine as a chunk over a
//! rendezvous channel. The pump closes the channel (by dropping its sender)
//! when it stops; that is the only end-of-stream signal the engine sees.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::config::ResponseConfig;

/// Set-once request for a pump to stop.
///
/// Cloning shares the same flag, so another thread can ask the pump to stop
/// while the owner is blocked in a read.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns `true` only for the call that set the flag.
    pub fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle to a running pump thread.
pub(crate) struct Pump {
    pub(crate) chunks: Receiver<Bytes>,
    pub(crate) handle: JoinHandle<()>,
}

/// Spawn the pump for `reader`.
pub(crate) fn spawn<R>(
    reader: R,
    config: &ResponseConfig,
    signal: ShutdownSignal,
) -> std::io::Result<Pump>
where
    R: Read + Send + 'static,
{
    let (tx, chunks) = sync_channel(0);
    let read_chunk_size = config.read_chunk_size;
    let idle_backoff = config.idle_backoff;

    let handle = thread::Builder::new()
        .name("respframe-pump".to_string())
        .spawn(move || run(reader, tx, signal, read_chunk_size, idle_backoff))?;

    Ok(Pump { chunks, handle })
}

fn run<R: Read>(
    mut reader: R,
    tx: SyncSender<Bytes>,
    signal: ShutdownSignal,
    read_chunk_size: usize,
    idle_backoff: Duration,
) {
    debug!(read_chunk_size, "byte pump started");
    let mut scratch = vec![0u8; read_chunk_size];
    let mut idle = false;

    loop {
        if signal.is_triggered() {
            break;
        }

        match reader.read(&mut scratch) {
            Ok(0) => {
                if !idle {
                    trace!("stream returned no data; backing off");
                    idle = true;
                }
                thread::sleep(idle_backoff);
            }
            Ok(n) => {
                idle = false;
                // Data read after a shutdown request is dropped, not delivered.
                if signal.is_triggered() {
                    break;
                }
                trace!(len = n, "chunk read");
                if tx.send(Bytes::copy_from_slice(&scratch[..n])).is_err() {
                    debug!("engine dropped; stopping byte pump");
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                if !idle {
                    trace!(error = %err, "stream read failed; backing off");
                    idle = true;
                }
                thread::sleep(idle_backoff);
            }
        }
    }

    debug!("byte pump stopped");
}
