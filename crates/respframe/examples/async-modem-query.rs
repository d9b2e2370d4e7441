//! Async variant of `modem-query`.
//!
//! Run with:
//!   cargo run --example async-modem-query --features async

use std::time::Duration;

use respframe::engine::{AsyncResponseStream, ResponseConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, mut modem) = UnixStream::pair()?;

    tokio::spawn(async move {
        let mut prompt = [0u8; 64];
        while let Ok(n) = modem.read(&mut prompt).await {
            if n == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            if modem.write_all(b"\r\n+CSQ: 21,99\r\n").await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            if modem.write_all(b"\r\nOK\r\n").await.is_err() {
                break;
            }
        }
    });

    let config = ResponseConfig::new(Duration::from_secs(1), Duration::from_millis(50));
    let mut port = AsyncResponseStream::from_stream(host, config)?;

    let mut buf = [0u8; 128];
    let n = port.query(b"AT+CSQ\r", &mut buf).await?;
    println!("signal quality reply: {:?}", String::from_utf8_lossy(&buf[..n]));

    port.close().await?;
    Ok(())
}
