//! Device target addresses.
//!
//! Targets are written as `KIND:ADDRESS`:
//! - `unix:/run/modem.sock` (a bare path is also accepted)
//! - `tcp:10.0.0.7:4001` or `tcp://10.0.0.7:4001`
//! - `serial:/dev/ttyUSB0?baud=9600` (requires the `serial` feature)

use std::fmt;
use std::net::TcpStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::DeviceStream;

/// Baud rate used when a serial target does not name one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Where a prompt/response device can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
    /// Serial port device path and baud rate.
    Serial { path: String, baud_rate: u32 },
}

impl DeviceTarget {
    /// Transport kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceTarget::Unix(_) => "unix",
            DeviceTarget::Tcp(_) => "tcp",
            DeviceTarget::Serial { .. } => "serial",
        }
    }

    /// Open the target.
    ///
    /// `read_timeout` is applied to the opened stream; a background reader can
    /// only notice a shutdown request when its blocking read returns, so
    /// serial ports in particular should be given one.
    pub fn connect(&self, read_timeout: Option<Duration>) -> Result<DeviceStream> {
        let mut stream = match self {
            #[cfg(unix)]
            DeviceTarget::Unix(path) => crate::uds::UnixDomainSocket::connect(path)?,
            #[cfg(not(unix))]
            DeviceTarget::Unix(_) => return Err(TransportError::Unsupported("unix")),
            DeviceTarget::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).map_err(|source| {
                    TransportError::Connect {
                        target: self.to_string(),
                        source,
                    }
                })?;
                // Prompts are small; send them immediately.
                stream.set_nodelay(true)?;
                debug!(%addr, "connected to tcp device");
                DeviceStream::from_tcp(stream)
            }
            // The port is opened with its timeout already set.
            DeviceTarget::Serial { path, baud_rate } => {
                return open_serial(path, *baud_rate, read_timeout)
            }
        };
        stream.set_read_timeout(read_timeout)?;
        Ok(stream)
    }
}

/// Read timeout for serial ports opened without one. A pump reading a cloned
/// port only notices a close between reads.
#[cfg(feature = "serial")]
const SERIAL_POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[cfg(feature = "serial")]
fn open_serial(path: &str, baud_rate: u32, read_timeout: Option<Duration>) -> Result<DeviceStream> {
    let port = serialport::new(path, baud_rate)
        .timeout(read_timeout.unwrap_or(SERIAL_POLL_TIMEOUT))
        .open()
        .map_err(|err| TransportError::Connect {
            target: format!("serial:{path}"),
            source: err.into(),
        })?;
    debug!(path, baud_rate, "opened serial port");
    Ok(DeviceStream::from_serial(port))
}

#[cfg(not(feature = "serial"))]
fn open_serial(
    _path: &str,
    _baud_rate: u32,
    _read_timeout: Option<Duration>,
) -> Result<DeviceStream> {
    Err(TransportError::Unsupported("serial"))
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTarget::Unix(path) => write!(f, "unix:{}", path.display()),
            DeviceTarget::Tcp(addr) => write!(f, "tcp:{addr}"),
            DeviceTarget::Serial { path, baud_rate } => write!(f, "serial:{path}?baud={baud_rate}"),
        }
    }
}

impl FromStr for DeviceTarget {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason: &str| TransportError::InvalidTarget {
            target: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("target must not be empty"));
        }

        if let Some(rest) = input.strip_prefix("tcp:") {
            let addr = rest.strip_prefix("//").unwrap_or(rest);
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(DeviceTarget::Tcp(addr.to_string()))
                }
                _ => Err(invalid("expected tcp:HOST:PORT")),
            }
        } else if let Some(rest) = input.strip_prefix("serial:") {
            let (path, query) = match rest.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (rest, None),
            };
            if path.is_empty() {
                return Err(invalid("missing serial device path"));
            }
            let mut baud_rate = DEFAULT_BAUD_RATE;
            if let Some(query) = query {
                for pair in query.split('&').filter(|pair| !pair.is_empty()) {
                    match pair.split_once('=') {
                        Some(("baud", value)) => {
                            baud_rate = value
                                .parse::<u32>()
                                .ok()
                                .filter(|rate| *rate > 0)
                                .ok_or_else(|| invalid("baud must be a positive integer"))?;
                        }
                        _ => return Err(invalid("unknown serial option")),
                    }
                }
            }
            Ok(DeviceTarget::Serial {
                path: path.to_string(),
                baud_rate,
            })
        } else {
            let path = input.strip_prefix("unix:").unwrap_or(input);
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            Ok(DeviceTarget::Unix(PathBuf::from(path)))
        }
    }
}
