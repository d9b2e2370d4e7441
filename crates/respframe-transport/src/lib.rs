//! Byte-stream transports for prompt/response devices.
//!
//! Devices are reached over:
//! - Unix domain sockets (local bridges and emulators)
//! - TCP (serial-to-ethernet gateways, networked modems)
//! - Serial ports (behind the `serial` feature)
//!
//! This is the lowest layer of respframe. The framing engine only needs the
//! `Read` half of a stream, plus `Write` and [`Close`] for duplex use.

pub mod error;
pub mod target;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use target::{DeviceTarget, DEFAULT_BAUD_RATE};
pub use traits::{Close, DeviceStream};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
