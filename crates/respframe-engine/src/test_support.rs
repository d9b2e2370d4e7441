//! Test doubles for driving the engine with timed byte deliveries.

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// A `Read` that yields whatever its [`Script`] hands it, one delivery per read.
pub(crate) struct ScriptedReader {
    deliveries: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

/// Schedules deliveries to a [`ScriptedReader`]. Each delay is measured from
/// the previous delivery.
pub(crate) struct Script {
    steps: Sender<(Duration, Vec<u8>)>,
}

impl ScriptedReader {
    pub(crate) fn new() -> (Self, Script) {
        let (steps, step_rx) = channel::<(Duration, Vec<u8>)>();
        let (delivery_tx, deliveries) = channel();

        thread::spawn(move || {
            for (delay, bytes) in step_rx {
                thread::sleep(delay);
                if delivery_tx.send(bytes).is_err() {
                    break;
                }
            }
        });

        (
            Self {
                deliveries,
                pending: Vec::new(),
            },
            Script { steps },
        )
    }
}

impl Script {
    pub(crate) fn send_after(&self, delay: Duration, bytes: &[u8]) {
        let _ = self.steps.send((delay, bytes.to_vec()));
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            // Short wait so a pump blocked here still notices shutdown requests.
            match self.deliveries.recv_timeout(Duration::from_millis(10)) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => return Err(ErrorKind::WouldBlock.into()),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Poll `condition` until it holds or `limit` passes.
pub(crate) fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > limit {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}
