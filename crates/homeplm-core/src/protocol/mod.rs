//! PLM Protocol Engine
//!
//! Implements the power-line modem serial protocol: byte framing with
//! corruption repair, frame classification and decoding, outbound command
//! encoding, and the link driver that moves bytes between the wire and the
//! event/command queues.
//!
//! Frames start with `0x02` followed by a command-type byte that fixes the
//! frame length. A lone `0x15` is a NAK from the modem.

mod address;
pub mod channel;
pub mod command_types;
pub mod commands;
mod config;
pub mod decoder;
mod driver;
mod error;
pub mod frame;
pub mod serial;
pub mod stream;

pub use address::DeviceAddress;
pub use channel::{
    command_queue, event_channel, CommandReceiver, CommandSender, EventReceiver, EventSender,
};
pub use command_types::{CommandTypeDescriptor, FrameKind};
pub use commands::{DeviceAction, OutboundCommand};
pub use config::LinkConfig;
pub use decoder::{
    DecodedEvent, DeviceState, FrameClass, MessageClass, MessageDecoder, MessageFlags, MessageType,
    StateKind,
};
pub use driver::{LinkDriver, LinkHandle, LinkState, LinkStats};
pub use error::ProtocolError;
pub use frame::ByteFramer;
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use stream::{is_timeout, open_channel, PlmChannel, SerialChannel, TcpChannel};

/// Default baud rate of the PLM serial interface
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default polling interval of the link driver loop in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5;

/// Largest frame the modem ever produces (extended receive)
pub const MAX_FRAME_SIZE: usize = 25;

/// First byte of every non-NAK frame
pub const FRAME_START: u8 = 0x02;

/// Single-byte negative acknowledgement
pub const NAK: u8 = 0x15;

/// Positive acknowledgement trailer on echoed sends
pub const ACK: u8 = 0x06;

/// Colon-separated upper-case hex dump of a frame, e.g. `02:62:18:8F`
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
