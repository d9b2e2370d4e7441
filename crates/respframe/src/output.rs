use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One framed reply as read from a device.
pub struct Response<'a> {
    pub target: &'a str,
    pub sequence: u32,
    pub payload: &'a [u8],
    pub elapsed: Duration,
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    target: &'a str,
    sequence: u32,
    size: usize,
    payload: String,
    hex: String,
    elapsed_ms: u64,
    timestamp: String,
}

impl<'a> ResponseOutput<'a> {
    fn new(response: &Response<'a>) -> Self {
        Self {
            target: response.target,
            sequence: response.sequence,
            size: response.payload.len(),
            payload: payload_preview(response.payload),
            hex: hex::encode(response.payload),
            elapsed_ms: u64::try_from(response.elapsed.as_millis()).unwrap_or(u64::MAX),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_response(response: &Response<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput::new(response);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let out = ResponseOutput::new(response);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "ELAPSED", "PAYLOAD", "HEX"])
                .add_row(vec![
                    out.sequence.to_string(),
                    out.size.to_string(),
                    format!("{}ms", out.elapsed_ms),
                    out.payload,
                    out.hex,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{} {} size={} elapsed={}ms payload={}",
                response.sequence,
                response.target,
                response.payload.len(),
                response.elapsed.as_millis(),
                payload_preview(response.payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(response.payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Printable rendering of a reply: text with control characters escaped, or
/// a size marker for binary data.
pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.escape_debug().to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
