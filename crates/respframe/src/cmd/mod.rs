use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use respframe_engine::{ResponseConfig, DEFAULT_READ_CHUNK_SIZE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod mock;
pub mod monitor;
pub mod query;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a prompt and print the framed reply.
    Query(QueryArgs),
    /// Print unsolicited replies as they arrive.
    Monitor(MonitorArgs),
    /// Emulate a device on a Unix socket.
    Mock(MockArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Query(args) => query::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Mock(args) => mock::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Reply timing shared by commands that read from a device.
#[derive(Args, Debug)]
pub struct TimingArgs {
    /// Maximum wait for the first byte of a reply (e.g. 1s, 500ms).
    #[arg(long, env = "RESPFRAME_TIMEOUT", default_value = "1s")]
    pub timeout: String,
    /// Silence that ends a reply once it has started.
    #[arg(long, env = "RESPFRAME_CHUNK_TIMEOUT", default_value = "50ms")]
    pub chunk_timeout: String,
    /// Largest reply kept, in bytes. Longer replies are truncated.
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE)]
    pub buffer: usize,
}

impl TimingArgs {
    pub fn response_config(&self) -> CliResult<ResponseConfig> {
        Ok(ResponseConfig::new(
            parse_duration(&self.timeout)?,
            parse_duration(&self.chunk_timeout)?,
        ))
    }

    pub fn buffer(&self) -> CliResult<Vec<u8>> {
        if self.buffer == 0 {
            return Err(CliError::new(USAGE, "--buffer must be greater than zero"));
        }
        Ok(vec![0u8; self.buffer])
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum LineEnding {
    None,
    #[default]
    Cr,
    Lf,
    Crlf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::None => b"",
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
            LineEnding::Crlf => b"\r\n",
        }
    }
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Device to query: unix:PATH, tcp:HOST:PORT, serial:PATH[?baud=N] or a socket path.
    pub target: String,
    /// Prompt text. Accepts \r, \n, \t, \\ and \xNN escapes.
    #[arg(long, required_unless_present = "hex", conflicts_with = "hex")]
    pub prompt: Option<String>,
    /// Prompt as hex bytes, sent without a line ending.
    #[arg(long)]
    pub hex: Option<String>,
    /// Line ending appended to --prompt.
    #[arg(long, value_enum, default_value_t = LineEnding::Cr)]
    pub line_ending: LineEnding,
    #[command(flatten)]
    pub timing: TimingArgs,
    /// Number of times to send the prompt.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,
    /// Pause between repeated prompts.
    #[arg(long, default_value = "1s")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Device to listen to (same forms as `query`).
    pub target: String,
    #[command(flatten)]
    pub timing: TimingArgs,
    /// Exit after printing N replies.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MockArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Reply sent for every prompt. Accepts the same escapes as --prompt.
    #[arg(long, default_value = "OK\\r\\n")]
    pub reply: String,
    /// Unsolicited text sent once when a client connects.
    #[arg(long)]
    pub banner: Option<String>,
    /// Pause between receiving a prompt and replying.
    #[arg(long, default_value = "20ms")]
    pub delay: String,
    /// Pause between reply fragments. Keep it below the client's chunk timeout.
    #[arg(long, default_value = "5ms")]
    pub gap: String,
    /// Number of fragments the reply is written in.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub split: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `2s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

/// Decode `\r`, `\n`, `\t`, `\0`, `\\` and `\xNN` in a command-line string.
pub fn decode_escapes(input: &str) -> CliResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();

    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        match bytes.next() {
            Some(b'r') => out.push(b'\r'),
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'x') => {
                let digits = [bytes.next(), bytes.next()];
                let [Some(hi), Some(lo)] = digits else {
                    return Err(CliError::new(USAGE, format!("truncated \\x escape in {input:?}")));
                };
                let decoded = hex::decode([hi, lo]).map_err(|err| {
                    CliError::new(USAGE, format!("bad \\x escape in {input:?}: {err}"))
                })?;
                out.extend_from_slice(&decoded);
            }
            Some(other) => {
                return Err(CliError::new(
                    USAGE,
                    format!("unknown escape \\{} in {input:?}", other as char),
                ))
            }
            None => return Err(CliError::new(USAGE, format!("trailing backslash in {input:?}"))),
        }
    }

    Ok(out)
}
