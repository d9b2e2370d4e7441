//! Query an emulated modem that answers in fragments.
//!
//! Run with:
//!   cargo run --example modem-query
//!
//! Against a real device or the CLI mock:
//!   cargo run --features cli -- mock /tmp/modem.sock --reply '\r\nOK\r\n' --split 3
//!   cargo run --features cli -- query /tmp/modem.sock --prompt AT

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use respframe::engine::{ResponseConfig, ResponseReadWriteCloser};
use respframe::transport::DeviceStream;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, mut modem) = UnixStream::pair()?;

    // The modem greets on power-up, then answers every prompt in two pieces.
    thread::spawn(move || -> std::io::Result<()> {
        modem.write_all(b"\r\nRDY\r\n")?;
        let mut prompt = [0u8; 64];
        loop {
            let n = modem.read(&mut prompt)?;
            if n == 0 {
                return Ok(());
            }
            eprintln!("modem got {:?}", String::from_utf8_lossy(&prompt[..n]));
            thread::sleep(Duration::from_millis(30));
            modem.write_all(b"\r\nOK")?;
            thread::sleep(Duration::from_millis(5));
            modem.write_all(b"\r\n")?;
        }
    });

    let config = ResponseConfig::new(Duration::from_secs(1), Duration::from_millis(50));
    let mut port =
        ResponseReadWriteCloser::from_device_stream(DeviceStream::from_unix(host), config)?;

    let mut buf = [0u8; 128];
    for prompt in [b"AT\r".as_slice(), b"ATI\r".as_slice()] {
        let n = port.query(prompt, &mut buf)?;
        let reply = String::from_utf8_lossy(&buf[..n]);
        println!("{:?} -> {reply:?}", String::from_utf8_lossy(prompt));
    }

    port.close()?;
    Ok(())
}
