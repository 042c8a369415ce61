//! Protocol errors

use thiserror::Error;

/// Errors that can occur in the PLM protocol layer
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No serial port by that name
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Command-type or command-1 byte with no table entry
    #[error("Unknown command byte {0:#04x}")]
    UnknownCommand(u8),

    /// Frame shorter than its layout needs
    #[error("Frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes the layout needs
        expected: usize,
        /// Bytes present
        actual: usize,
    },

    /// Address text that is not three hex bytes
    #[error("Invalid device address: '{0}'")]
    InvalidAddress(String),

    /// The other end of a queue was dropped
    #[error("Queue closed: no receiver is attached")]
    QueueClosed,

    /// The driver thread panicked instead of returning its stats
    #[error("Link driver thread panicked")]
    DriverPanicked,

    /// Transport failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
