use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// The close capability of a device stream.
///
/// Closing must make any read blocked on another handle of the same resource
/// return (with data, zero bytes or an error), so a background reader can
/// notice that it should stop.
pub trait Close {
    /// Release the underlying resource.
    fn close(&mut self) -> std::io::Result<()>;
}

#[cfg(unix)]
impl Close for std::os::unix::net::UnixStream {
    fn close(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl Close for TcpStream {
    fn close(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl<T: Close + ?Sized> Close for Box<T> {
    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}

impl<T: Close + ?Sized> Close for &mut T {
    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}

/// A connected device stream: implements Read + Write + Close.
///
/// Wraps whichever transport the device is reachable over. Serial ports are
/// only available with the `serial` feature.
pub struct DeviceStream {
    inner: DeviceStreamInner,
}

enum DeviceStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
    #[cfg(feature = "serial")]
    Serial(Box<dyn serialport::SerialPort>),
    Closed,
}

/// Upper bound used for serial reads when no read timeout is requested.
#[cfg(feature = "serial")]
const SERIAL_BLOCKING_TIMEOUT: Duration = Duration::from_secs(3600);

fn not_connected() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "device stream closed")
}

impl Read for DeviceStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.read(buf),
            DeviceStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(port) => port.read(buf),
            DeviceStreamInner::Closed => Err(not_connected()),
        }
    }
}

impl Write for DeviceStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.write(buf),
            DeviceStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(port) => port.write(buf),
            DeviceStreamInner::Closed => Err(not_connected()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.flush(),
            DeviceStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(port) => port.flush(),
            DeviceStreamInner::Closed => Err(not_connected()),
        }
    }
}

impl Close for DeviceStream {
    /// Sockets are shut down in both directions, which also wakes readers on
    /// cloned handles. Serial ports cannot be shut down; this handle is
    /// dropped and cloned handles rely on their read timeout instead.
    fn close(&mut self) -> std::io::Result<()> {
        match std::mem::replace(&mut self.inner, DeviceStreamInner::Closed) {
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            DeviceStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(port) => {
                drop(port);
                Ok(())
            }
            DeviceStreamInner::Closed => Ok(()),
        }
    }
}

impl DeviceStream {
    /// Create a DeviceStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: DeviceStreamInner::Unix(stream),
        }
    }

    /// Create a DeviceStream from a TCP stream (serial-to-ethernet gateways, modems).
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: DeviceStreamInner::Tcp(stream),
        }
    }

    /// Create a DeviceStream from an opened serial port.
    #[cfg(feature = "serial")]
    pub fn from_serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: DeviceStreamInner::Serial(port),
        }
    }

    /// Short transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            DeviceStreamInner::Unix(_) => "unix",
            DeviceStreamInner::Tcp(_) => "tcp",
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(_) => "serial",
            DeviceStreamInner::Closed => "closed",
        }
    }

    /// Whether `close` has been called on this handle.
    pub fn is_closed(&self) -> bool {
        matches!(self.inner, DeviceStreamInner::Closed)
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            DeviceStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(port) => port
                .set_timeout(timeout.unwrap_or(SERIAL_BLOCKING_TIMEOUT))
                .map_err(|err| std::io::Error::from(err).into()),
            DeviceStreamInner::Closed => Err(not_connected().into()),
        }
    }

    /// Set write timeout on the underlying stream.
    ///
    /// Serial ports share one timeout for both directions, so this is a no-op
    /// for them.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
            DeviceStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(_) => Ok(()),
            DeviceStreamInner::Closed => Err(not_connected().into()),
        }
    }

    /// Try to clone this stream (creates a new handle to the same device).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => DeviceStreamInner::Unix(stream.try_clone()?),
            DeviceStreamInner::Tcp(stream) => DeviceStreamInner::Tcp(stream.try_clone()?),
            #[cfg(feature = "serial")]
            DeviceStreamInner::Serial(port) => {
                DeviceStreamInner::Serial(port.try_clone().map_err(std::io::Error::from)?)
            }
            DeviceStreamInner::Closed => return Err(not_connected().into()),
        };
        Ok(Self { inner })
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("type", &self.kind())
            .finish()
    }
}
