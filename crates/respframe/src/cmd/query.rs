use std::thread;
use std::time::Instant;

use respframe_engine::{ResponseReadWriteCloser, ResponseReader};
use respframe_transport::DeviceTarget;

use crate::cmd::{decode_escapes, parse_duration, QueryArgs};
use crate::exit::{response_error, transport_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_response, OutputFormat, Response};

pub fn run(args: QueryArgs, format: OutputFormat) -> CliResult<i32> {
    let target: DeviceTarget = args
        .target
        .parse()
        .map_err(|err| transport_error("invalid target", err))?;
    let prompt = resolve_prompt(&args)?;
    let config = args.timing.response_config()?;
    let interval = parse_duration(&args.interval)?;
    let mut buf = args.timing.buffer()?;

    let stream = target
        .connect(None)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut port = ResponseReadWriteCloser::from_device_stream(stream, config)
        .map_err(|err| response_error("engine start failed", err))?;
    log_connected(&target, port.reader());

    let label = target.to_string();
    let mut outcome = Ok(SUCCESS);

    for sequence in 1..=args.repeat {
        if sequence > 1 {
            thread::sleep(interval);
        }

        let start = Instant::now();
        match port.query(&prompt, &mut buf) {
            Ok(n) => print_response(
                &Response {
                    target: &label,
                    sequence,
                    payload: &buf[..n],
                    elapsed: start.elapsed(),
                },
                format,
            ),
            Err(err) => {
                outcome = Err(response_error("query failed", err));
                break;
            }
        }
    }

    if let Err(err) = port.close() {
        tracing::debug!(error = %err, "device close failed");
    }
    outcome
}

pub(crate) fn log_connected(target: &DeviceTarget, reader: &ResponseReader) {
    let config = reader.config();
    tracing::debug!(
        kind = target.kind(),
        target = %target,
        overall_ms = config.overall_timeout.as_millis() as u64,
        chunk_ms = config.chunk_timeout.as_millis() as u64,
        "device connected"
    );
}

fn resolve_prompt(args: &QueryArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        let compact: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        return hex::decode(compact)
            .map_err(|err| CliError::new(DATA_INVALID, format!("--hex is not valid hex: {err}")));
    }

    let mut prompt = decode_escapes(args.prompt.as_deref().unwrap_or_default())?;
    prompt.extend_from_slice(args.line_ending.as_bytes());
    Ok(prompt)
}
