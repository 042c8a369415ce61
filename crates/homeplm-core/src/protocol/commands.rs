//! Outbound commands
//!
//! Builds the 8-byte "send standard message" frames the modem relays onto
//! the power line:
//!
//! ```text
//! 02 62 AA BB CC 0F cmd1 cmd2
//! ```
//!
//! `0x0F` is the message flag byte for a direct message with three hops.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::command_types::{GET_IM_INFO, SEND_MESSAGE};
use super::{hex, DeviceAddress, FRAME_START};

/// Direct message, max hops 3, hops left 3
const DIRECT_FLAGS: u8 = 0x0F;

/// Ramp durations in seconds, indexed by rate code
pub const RAMP_RATES: [f64; 16] = [
    480.0, 360.0, 270.0, 210.0, 150.0, 90.0, 47.0, 38.5, 32.0, 28.0, 23.5, 19.0, 6.5, 2.0, 0.3, 0.1,
];

/// Shortest supported ramp time in seconds
pub const MIN_RAMP_TIME: f64 = 0.1;

/// Longest supported ramp time in seconds
pub const MAX_RAMP_TIME: f64 = 480.0;

/// Command-1 opcodes
pub mod opcode {
    /// On at the level in command 2
    pub const ON: u8 = 0x11;
    /// On without ramping
    pub const FAST_ON: u8 = 0x12;
    /// Off
    pub const OFF: u8 = 0x13;
    /// Off without ramping
    pub const FAST_OFF: u8 = 0x14;
    /// Report the current level
    pub const STATUS_REQUEST: u8 = 0x19;
    /// Ramp to level and rate packed in command 2
    pub const RAMP_ON: u8 = 0x2E;
    /// Ramp off at the rate in command 2
    pub const RAMP_OFF: u8 = 0x2F;
}

/// Actions a device can be asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DeviceAction {
    /// Turn on to `level` percent
    TurnOn {
        /// Percent, clamped to 0-100
        level: f64,
        /// Skip the device's default ramp
        fast: bool,
    },
    /// Turn off
    TurnOff {
        /// Skip the device's default ramp
        fast: bool,
    },
    /// Ramp to `level` percent over roughly `time` seconds
    RampOn {
        /// Seconds, snapped to the nearest supported rate
        time: f64,
        /// Percent, clamped to 0-100
        level: f64,
    },
    /// Ramp off over roughly `time` seconds
    RampOff {
        /// Seconds, snapped to the nearest supported rate
        time: f64,
    },
    /// Ask the device to report its level
    StatusRequest,
}

impl DeviceAction {
    /// Check whether the action needs a dimmable device
    pub fn is_ramp(&self) -> bool {
        matches!(self, DeviceAction::RampOn { .. } | DeviceAction::RampOff { .. })
    }

    /// Short action name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            DeviceAction::TurnOn { .. } => "turn_on",
            DeviceAction::TurnOff { .. } => "turn_off",
            DeviceAction::RampOn { .. } => "ramp_on",
            DeviceAction::RampOff { .. } => "ramp_off",
            DeviceAction::StatusRequest => "status_request",
        }
    }

    /// Encode the action for `address`
    pub fn encode(&self, address: DeviceAddress) -> OutboundCommand {
        match *self {
            DeviceAction::TurnOn { level, fast } => OutboundCommand::turn_on(address, level, fast),
            DeviceAction::TurnOff { fast } => OutboundCommand::turn_off(address, fast),
            DeviceAction::RampOn { time, level } => OutboundCommand::ramp_on(address, time, level),
            DeviceAction::RampOff { time } => OutboundCommand::ramp_off(address, time),
            DeviceAction::StatusRequest => OutboundCommand::status_request(address),
        }
    }
}

/// A frame ready to be written to the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Standard direct message to a device
    Standard {
        /// Receiving device
        target: DeviceAddress,
        /// Command 1 (see [`opcode`])
        cmd1: u8,
        /// Command 2, the argument
        cmd2: u8,
    },
    /// Query addressed to the modem itself
    Modem {
        /// Command-type byte
        code: u8,
    },
}

impl OutboundCommand {
    /// Direct message with explicit command bytes
    pub fn standard(target: DeviceAddress, cmd1: u8, cmd2: u8) -> Self {
        OutboundCommand::Standard { target, cmd1, cmd2 }
    }

    /// Turn on to `level` percent (clamped to 0-100)
    pub fn turn_on(target: DeviceAddress, level: f64, fast: bool) -> Self {
        let cmd1 = if fast { opcode::FAST_ON } else { opcode::ON };
        Self::standard(target, cmd1, level_to_byte(level))
    }

    /// Turn off
    pub fn turn_off(target: DeviceAddress, fast: bool) -> Self {
        let cmd1 = if fast { opcode::FAST_OFF } else { opcode::OFF };
        Self::standard(target, cmd1, 0xFF)
    }

    /// Ramp to `level` percent at the rate nearest `time` seconds.
    /// Command 2 packs the level (0-15) in the high nibble and the rate
    /// code in the low nibble.
    pub fn ramp_on(target: DeviceAddress, time: f64, level: f64) -> Self {
        let level = clamp(level, 0.0, 100.0);
        let nibble = (level / 100.0 * 15.0).round() as u8;
        let cmd2 = (nibble << 4) | nearest_rate_code(time);
        Self::standard(target, opcode::RAMP_ON, cmd2)
    }

    /// Ramp off at the rate nearest `time` seconds
    pub fn ramp_off(target: DeviceAddress, time: f64) -> Self {
        Self::standard(target, opcode::RAMP_OFF, nearest_rate_code(time))
    }

    /// Status request; the device answers with its level in command 2
    pub fn status_request(target: DeviceAddress) -> Self {
        Self::standard(target, opcode::STATUS_REQUEST, 0x00)
    }

    /// Modem info query, answered by a 9-byte `0x60` frame
    pub fn get_im_info() -> Self {
        OutboundCommand::Modem { code: GET_IM_INFO }
    }

    /// Device the command is addressed to, if any
    pub fn target(&self) -> Option<DeviceAddress> {
        match self {
            OutboundCommand::Standard { target, .. } => Some(*target),
            OutboundCommand::Modem { .. } => None,
        }
    }

    /// Wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            OutboundCommand::Standard { target, cmd1, cmd2 } => {
                let mut bytes = Vec::with_capacity(8);
                bytes.extend_from_slice(&[FRAME_START, SEND_MESSAGE]);
                bytes.extend_from_slice(&target.bytes());
                bytes.extend_from_slice(&[DIRECT_FLAGS, *cmd1, *cmd2]);
                bytes
            }
            OutboundCommand::Modem { code } => vec![FRAME_START, *code],
        }
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.to_bytes()))
    }
}

/// Index of the rate table entry nearest `time` seconds (clamped to
/// 0.1-480). Ties go to the lower index.
pub fn nearest_rate_code(time: f64) -> u8 {
    let time = clamp(time, MIN_RAMP_TIME, MAX_RAMP_TIME);
    let mut best = 0;
    let mut best_diff = f64::INFINITY;
    for (i, rate) in RAMP_RATES.iter().enumerate() {
        let diff = (time - rate).abs();
        if diff < best_diff {
            best = i;
            best_diff = diff;
        }
    }
    best as u8
}

/// Percent (clamped to 0-100) to the 0-255 on-level byte
fn level_to_byte(level: f64) -> u8 {
    (clamp(level, 0.0, 100.0) * 2.55).round() as u8
}

/// Clamp that maps NaN to the lower bound
fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
