//! Frame decoding
//!
//! Classifies complete frames and turns standard-receive frames into
//! device state-change events.
//!
//! Standard-receive layout (11 bytes):
//! - 0: `0x02`
//! - 1: `0x50`
//! - 2..5: sender address
//! - 5..8: target address (or group info for broadcasts)
//! - 8: message flags
//! - 9: command 1
//! - 10: command 2

use serde::{Deserialize, Serialize};
use std::fmt;

use super::command_types::{self, FrameKind};
use super::{DeviceAddress, ProtocolError, ACK, NAK};

const SENDER_OFFSET: usize = 2;
const FLAGS_OFFSET: usize = 8;
const CMD1_OFFSET: usize = 9;
const CMD2_OFFSET: usize = 10;

/// On/off part of a device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// Lit at some level
    On,
    /// Dark
    Off,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::On => write!(f, "On"),
            StateKind::Off => write!(f, "Off"),
        }
    }
}

/// State of a light: on/off plus a level in percent (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceState {
    /// On or off
    pub kind: StateKind,
    /// Brightness in percent; 0 when off
    pub level: u8,
}

impl DeviceState {
    /// Create a state, clamping the level to 100
    pub fn new(kind: StateKind, level: u8) -> Self {
        Self {
            kind,
            level: level.min(100),
        }
    }

    /// On at `level` percent
    pub fn on(level: u8) -> Self {
        Self::new(StateKind::On, level)
    }

    /// Off, level 0
    pub fn off() -> Self {
        Self::new(StateKind::Off, 0)
    }

    /// True for any on state, whatever the level
    pub fn is_on(&self) -> bool {
        self.kind == StateKind::On
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::off()
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}%)", self.kind, self.level)
    }
}

/// Routing class of a decoded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageClass {
    /// Addressed to the modem, or an acknowledgement of our command
    Direct,
    /// Sent to a group or to everyone
    Broadcast,
    /// Echo of our own send with the modem's ACK
    EchoAck,
    /// Anything else
    Unknown,
}

/// The 3-bit message type in the top of the flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// 0b000
    DirectMessage,
    /// 0b001
    AckOfDirect,
    /// 0b010
    GroupCleanupDirect,
    /// 0b011
    AckOfGroupCleanup,
    /// 0b100
    Broadcast,
    /// 0b101
    NakOfDirect,
    /// 0b110
    GroupBroadcast,
    /// 0b111
    NakOfGroupCleanup,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => MessageType::DirectMessage,
            1 => MessageType::AckOfDirect,
            2 => MessageType::GroupCleanupDirect,
            3 => MessageType::AckOfGroupCleanup,
            4 => MessageType::Broadcast,
            5 => MessageType::NakOfDirect,
            6 => MessageType::GroupBroadcast,
            _ => MessageType::NakOfGroupCleanup,
        }
    }
}

/// Decoded message flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags(u8);

impl MessageFlags {
    /// Wrap the flag byte as received
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// The flag byte as received
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Bits 7-5
    pub fn message_type(&self) -> MessageType {
        MessageType::from_bits(self.0 >> 5)
    }

    /// Bit 7
    pub fn is_broadcast(&self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Bit 5: acknowledgement of a direct message, carries the resulting level
    pub fn is_ack_direct(&self) -> bool {
        self.0 & 0x20 != 0
    }

    /// Bit 4: extended (user data) message
    pub fn is_extended(&self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Bits 3-2
    pub fn hops_left(&self) -> u8 {
        (self.0 >> 2) & 0b11
    }

    /// Bits 1-0
    pub fn max_hops(&self) -> u8 {
        self.0 & 0b11
    }

    /// Routing class: bit 7 decides broadcast vs direct
    pub fn class(&self) -> MessageClass {
        if self.is_broadcast() {
            MessageClass::Broadcast
        } else {
            MessageClass::Direct
        }
    }
}

/// A device state change decoded from a standard-receive frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Device that sent the message
    pub sender: DeviceAddress,
    /// Routing class from the flag byte
    pub class: MessageClass,
    /// Raw flags, for callers that need hops or the message type
    pub flags: MessageFlags,
    /// State the sender reports
    pub state: DeviceState,
}

/// Classification of a complete frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameClass {
    /// Single byte NAK: the modem was not ready for our last send
    Nak,
    /// Device state change
    StandardReceive(DecodedEvent),
    /// Echo of a frame we sent; `accepted` reflects the ACK/NAK trailer
    Echo {
        /// Device the send was addressed to
        target: DeviceAddress,
        /// Trailer was ACK rather than NAK
        accepted: bool,
    },
    /// Valid frame of a type we do not act on
    Ignored {
        /// Command-type byte
        code: u8,
        /// Command-type name
        name: &'static str,
    },
}

/// Scaling applied to command byte 2 to recover a level in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelTransform {
    /// 0-255 scaled to 0-100, rounded
    Linear255,
    /// High nibble 0-15 scaled to 0-100, truncated
    Nibble15,
}

impl LevelTransform {
    /// Level in percent for a raw command-2 byte
    pub fn apply(&self, raw: u8) -> u8 {
        match self {
            LevelTransform::Linear255 => (raw as f64 / 2.55).round() as u8,
            LevelTransform::Nibble15 => ((raw >> 4) as f64 / 15.0 * 100.0) as u8,
        }
    }
}

/// What a command-1 byte does to the sending device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEffect {
    /// Command-1 byte
    pub code: u8,
    /// On or off after the command
    pub state: StateKind,
    /// Level when command 2 is not a level
    pub default_level: u8,
    /// Applied to command 2 when the message acknowledges a direct command
    pub level: Option<LevelTransform>,
}

impl CommandEffect {
    const fn on(code: u8, level: Option<LevelTransform>) -> Self {
        Self {
            code,
            state: StateKind::On,
            default_level: 100,
            level,
        }
    }

    const fn off(code: u8) -> Self {
        Self {
            code,
            state: StateKind::Off,
            default_level: 0,
            level: None,
        }
    }
}

static COMMAND_EFFECTS: [CommandEffect; 6] = [
    CommandEffect::on(0x11, Some(LevelTransform::Linear255)),
    CommandEffect::on(0x12, Some(LevelTransform::Linear255)),
    CommandEffect::off(0x13),
    CommandEffect::off(0x14),
    CommandEffect::on(0x2E, Some(LevelTransform::Nibble15)),
    CommandEffect::off(0x2F),
];

/// Look up the effect of a command-1 byte
pub fn command_effect(code: u8) -> Option<&'static CommandEffect> {
    COMMAND_EFFECTS.iter().find(|e| e.code == code)
}

/// Stateless decoder for complete frames
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageDecoder;

impl MessageDecoder {
    /// Create a decoder
    pub fn new() -> Self {
        Self
    }

    /// Classify a frame the framer reported complete
    pub fn classify(&self, frame: &[u8]) -> Result<FrameClass, ProtocolError> {
        if matches!(frame, [NAK]) {
            return Ok(FrameClass::Nak);
        }

        let code = *frame.get(1).ok_or(ProtocolError::FrameTooShort {
            expected: 2,
            actual: frame.len(),
        })?;
        let desc = command_types::lookup(code).ok_or(ProtocolError::UnknownCommand(code))?;

        match desc.kind {
            FrameKind::StandardReceive => {
                self.decode_standard(frame).map(FrameClass::StandardReceive)
            }
            FrameKind::Echo => {
                let target = DeviceAddress::from_slice(frame, SENDER_OFFSET)?;
                let accepted = frame.last() == Some(&ACK);
                Ok(FrameClass::Echo { target, accepted })
            }
            FrameKind::Ignored => Ok(FrameClass::Ignored {
                code,
                name: desc.name,
            }),
        }
    }

    /// Extract an event from a frame, if it carries one.
    ///
    /// Echoes, NAKs and housekeeping frames yield `Ok(None)`. An unrecognised
    /// command-1 byte in a standard-receive frame is an error; the caller
    /// drops the event and carries on.
    pub fn decode(&self, frame: &[u8]) -> Result<Option<DecodedEvent>, ProtocolError> {
        match self.classify(frame)? {
            FrameClass::StandardReceive(event) => Ok(Some(event)),
            _ => Ok(None),
        }
    }

    fn decode_standard(&self, frame: &[u8]) -> Result<DecodedEvent, ProtocolError> {
        if frame.len() <= CMD2_OFFSET {
            return Err(ProtocolError::FrameTooShort {
                expected: CMD2_OFFSET + 1,
                actual: frame.len(),
            });
        }

        let sender = DeviceAddress::from_slice(frame, SENDER_OFFSET)?;
        let flags = MessageFlags::new(frame[FLAGS_OFFSET]);
        let cmd1 = frame[CMD1_OFFSET];
        let cmd2 = frame[CMD2_OFFSET];

        let effect = command_effect(cmd1).ok_or(ProtocolError::UnknownCommand(cmd1))?;
        let level = match effect.level {
            Some(transform) if flags.is_ack_direct() => transform.apply(cmd2),
            _ => effect.default_level,
        };

        Ok(DecodedEvent {
            sender,
            class: flags.class(),
            flags,
            state: DeviceState::new(effect.state, level),
        })
    }
}
