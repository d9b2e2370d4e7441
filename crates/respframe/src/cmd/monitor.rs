use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use respframe_engine::{ResponseError, ResponseReadCloser, ResponseReader};
use respframe_transport::DeviceTarget;

use crate::cmd::MonitorArgs;
use crate::exit::{response_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_response, OutputFormat, Response};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let target: DeviceTarget = args
        .target
        .parse()
        .map_err(|err| transport_error("invalid target", err))?;
    let config = args.timing.response_config()?;
    let mut buf = args.timing.buffer()?;

    let stream = target
        .connect(None)
        .map_err(|err| transport_error("connect failed", err))?;
    let read_half = stream
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;
    let reader = ResponseReader::with_config(read_half, config)
        .map_err(|err| response_error("engine start failed", err))?;
    super::query::log_connected(&target, &reader);
    let mut port = ResponseReadCloser::new(reader, stream);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let label = target.to_string();
    let mut printed = 0u32;
    let mut start = Instant::now();

    // Each read is bounded by the overall timeout, so Ctrl-C is seen promptly.
    while running.load(Ordering::SeqCst) {
        match port.read_response(&mut buf) {
            Ok(n) => {
                printed = printed.saturating_add(1);
                print_response(
                    &Response {
                        target: &label,
                        sequence: printed,
                        payload: &buf[..n],
                        elapsed: start.elapsed(),
                    },
                    format,
                );
                start = Instant::now();

                if args.count.is_some_and(|count| printed as usize >= count) {
                    break;
                }
            }
            Err(ResponseError::Timeout(_)) => continue,
            Err(ResponseError::EndOfStream { .. }) => break,
            Err(err) => return Err(response_error("read failed", err)),
        }
    }

    if let Err(err) = port.close() {
        tracing::debug!(error = %err, "device close failed");
    }
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
