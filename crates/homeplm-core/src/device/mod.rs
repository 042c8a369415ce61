//! Devices
//!
//! The device layer is the surface the rest of the system (GUI, rules,
//! remote clients) works against. Devices turn action calls into outbound
//! commands, and the [`Dispatcher`] applies decoded events to their state.

mod dispatcher;
mod registry;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use registry::{DeviceRegistry, DeviceSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

use crate::protocol::{CommandSender, DeviceAction, DeviceAddress, DeviceState, ProtocolError};

/// Errors raised by device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Action the device kind cannot perform, e.g. a ramp on a switch
    #[error("{device} does not support {action}")]
    UnsupportedAction {
        /// Device name
        device: String,
        /// Action name
        action: &'static str,
    },

    /// Another device already has this address
    #[error("Address {0} is already registered")]
    DuplicateAddress(DeviceAddress),

    /// No device under that room and name
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The command could not be queued
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// What kind of load a device controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// On/off only
    Switch,
    /// Dimmable, supports ramps
    Dimmer,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Switch => write!(f, "switch"),
            DeviceKind::Dimmer => write!(f, "dimmer"),
        }
    }
}

/// Last known state and when it changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateRecord {
    /// Last known state
    pub state: DeviceState,
    /// When it was applied; `None` until the first transition
    pub last_changed: Option<DateTime<Utc>>,
}

/// A device on the power-line network
#[derive(Debug)]
pub struct Device {
    name: String,
    room: String,
    address: DeviceAddress,
    kind: DeviceKind,
    /// Written by whichever side applies a transition
    state: Mutex<StateRecord>,
    commands: CommandSender,
}

impl Device {
    /// Create a device in the off state that sends through `commands`
    pub fn new(
        name: impl Into<String>,
        room: impl Into<String>,
        address: DeviceAddress,
        kind: DeviceKind,
        commands: CommandSender,
    ) -> Self {
        Self {
            name: name.into(),
            room: room.into(),
            address,
            kind,
            state: Mutex::new(StateRecord::default()),
            commands,
        }
    }

    /// Name, unique within the room
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Room the device is in
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Network address
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Switch or dimmer
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Current state
    pub fn state(&self) -> DeviceState {
        self.lock_state().state
    }

    /// Current state with its timestamp
    pub fn record(&self) -> StateRecord {
        *self.lock_state()
    }

    /// Apply a state transition. Returns the previous state.
    pub fn set_state(&self, state: DeviceState) -> DeviceState {
        let mut record = self.lock_state();
        let previous = record.state;
        record.state = state;
        record.last_changed = Some(Utc::now());
        previous
    }

    /// Turn on to `level` percent
    pub fn turn_on(&self, level: f64, fast: bool) -> Result<(), DeviceError> {
        self.perform(DeviceAction::TurnOn { level, fast })
    }

    /// Turn off; `fast` skips the ramp
    pub fn turn_off(&self, fast: bool) -> Result<(), DeviceError> {
        self.perform(DeviceAction::TurnOff { fast })
    }

    /// Ramp to `level` percent over about `time` seconds (dimmers only)
    pub fn ramp_on(&self, time: f64, level: f64) -> Result<(), DeviceError> {
        self.perform(DeviceAction::RampOn { time, level })
    }

    /// Ramp off over about `time` seconds (dimmers only)
    pub fn ramp_off(&self, time: f64) -> Result<(), DeviceError> {
        self.perform(DeviceAction::RampOff { time })
    }

    /// Turn off if on, otherwise on to `level`
    pub fn toggle(&self, level: f64, fast: bool) -> Result<(), DeviceError> {
        if self.state().is_on() {
            self.turn_off(fast)
        } else {
            self.turn_on(level, fast)
        }
    }

    /// Ask the device for its level. The answer arrives as an event.
    pub fn request_status(&self) -> Result<(), DeviceError> {
        self.perform(DeviceAction::StatusRequest)
    }

    /// Encode and enqueue one command. Returns as soon as it is queued.
    pub fn perform(&self, action: DeviceAction) -> Result<(), DeviceError> {
        if action.is_ramp() && self.kind != DeviceKind::Dimmer {
            return Err(DeviceError::UnsupportedAction {
                device: self.name.clone(),
                action: action.name(),
            });
        }

        let command = action.encode(self.address);
        debug!("{} ({}): {} -> {}", self.name, self.address, action.name(), command);
        self.commands.enqueue(command)?;
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, StateRecord> {
        // The record is plain data; a panic mid-update cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
