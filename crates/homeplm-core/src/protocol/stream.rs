//! Transport abstraction
//!
//! The link driver talks to anything that can report how many bytes are
//! waiting: a local serial port, or a modem exposed over TCP by a
//! serial-to-network bridge.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::info;

use super::{clear_buffers, configure_port, open_port, LinkConfig, ProtocolError};

/// Port names with this prefix are reached over TCP
pub const TCP_PREFIX: &str = "tcp://";

/// A read that gave up waiting rather than failed
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Byte transport to the modem
pub trait PlmChannel: Read + Write + Send {
    /// Set timeout for read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard anything waiting in the input buffer
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Number of bytes that can be read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial port wrapper implementing PlmChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an open, configured port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl PlmChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }
}

/// TCP stream wrapper implementing PlmChannel
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connect to a serial-to-TCP bridge, e.g. "192.168.1.20:9761"
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl PlmChannel for TcpChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // No kernel call for this on a socket; read until it would block.
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 256];
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.stream.set_nonblocking(true)?;
        // peek() reports min(available, buffer size); frames are tiny.
        let mut buf = [0u8; 1024];
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;

        match result {
            // A non-blocking peek only returns 0 at end of stream
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "modem bridge closed the connection",
            )),
            Ok(n) => Ok(n as u32),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// Open the transport named by `config.port_name`: `tcp://host:port` for a
/// network bridge, anything else is a local serial port.
pub fn open_channel(config: &LinkConfig) -> Result<Box<dyn PlmChannel>, ProtocolError> {
    let mut channel: Box<dyn PlmChannel> = match config.port_name.strip_prefix(TCP_PREFIX) {
        Some(addr) => {
            let channel = TcpChannel::connect(addr)?;
            info!("Connected to modem bridge at {}", addr);
            Box::new(channel)
        }
        None => {
            let mut port =
                open_port(&config.port_name, Some(config.baud_rate), config.read_timeout())?;
            configure_port(&mut *port)?;
            clear_buffers(&mut *port)?;
            info!("Opened modem on {} at {} baud", config.port_name, config.baud_rate);
            Box::new(SerialChannel::new(port))
        }
    };
    channel.set_timeout(config.read_timeout())?;
    Ok(channel)
}
