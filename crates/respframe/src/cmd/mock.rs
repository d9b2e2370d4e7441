use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use respframe_transport::{DeviceStream, UnixDomainSocket};

use crate::cmd::{decode_escapes, parse_duration, MockArgs};
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};

/// What the emulated device sends and when.
#[derive(Debug)]
struct Behavior {
    reply: Vec<u8>,
    banner: Option<Vec<u8>>,
    delay: Duration,
    gap: Duration,
    split: usize,
}

pub fn run(args: MockArgs) -> CliResult<i32> {
    let behavior = Arc::new(Behavior {
        reply: decode_escapes(&args.reply)?,
        banner: args.banner.as_deref().map(decode_escapes).transpose()?,
        delay: parse_duration(&args.delay)?,
        gap: parse_duration(&args.gap)?,
        split: args.split as usize,
    });

    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    install_ctrlc_handler(args.path.clone())?;
    tracing::info!(path = %listener.path().display(), "mock device listening");

    loop {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let behavior = Arc::clone(&behavior);
        thread::Builder::new()
            .name("respframe-mock".to_string())
            .spawn(move || {
                if let Err(err) = serve(stream, &behavior) {
                    tracing::debug!(error = %err, "mock session ended");
                }
            })
            .map_err(|err| CliError::new(INTERNAL, format!("session spawn failed: {err}")))?;
    }
}

fn serve(mut stream: DeviceStream, behavior: &Behavior) -> std::io::Result<()> {
    tracing::debug!("client connected");
    if let Some(banner) = &behavior.banner {
        stream.write_all(banner)?;
        stream.flush()?;
    }

    let mut prompt = [0u8; 256];
    loop {
        let n = match stream.read(&mut prompt) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        tracing::debug!(len = n, "prompt received");

        thread::sleep(behavior.delay);
        for (index, fragment) in fragments(&behavior.reply, behavior.split).enumerate() {
            if index > 0 {
                thread::sleep(behavior.gap);
            }
            stream.write_all(fragment)?;
            stream.flush()?;
        }
    }
}

/// Split `reply` into at most `count` near-equal fragments.
fn fragments(reply: &[u8], count: usize) -> std::slice::Chunks<'_, u8> {
    let size = reply.len().div_ceil(count.max(1)).max(1);
    reply.chunks(size)
}

// accept() blocks, so the handler removes the socket and exits directly.
fn install_ctrlc_handler(path: PathBuf) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = std::fs::remove_file(&path);
        std::process::exit(SUCCESS);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
