//! House file
//!
//! JSON description of the link and the devices in each room:
//!
//! ```json
//! {
//!   "link": { "port_name": "/dev/ttyUSB0" },
//!   "rooms": [
//!     { "name": "Den", "devices": [
//!       { "name": "Lamp", "kind": "dimmer", "address": "18:8F:00" }
//!     ] }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use homeplm_core::device::{Device, DeviceKind, DeviceRegistry};
use homeplm_core::protocol::{CommandSender, DeviceAddress, LinkConfig};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseConfig {
    pub link: LinkConfig,
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub kind: DeviceKind,
    pub address: DeviceAddress,
}

impl HouseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read house file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse house file {}", path.display()))
    }

    /// Register every room and device. Returns the number of devices added.
    pub fn populate(&self, registry: &DeviceRegistry, commands: &CommandSender) -> Result<usize> {
        let mut added = 0;
        for room in &self.rooms {
            registry.add_room(&room.name);
            for device in &room.devices {
                registry
                    .add_device(Device::new(
                        device.name.as_str(),
                        room.name.as_str(),
                        device.address,
                        device.kind,
                        commands.clone(),
                    ))
                    .with_context(|| format!("Cannot add {} / {}", room.name, device.name))?;
                added += 1;
            }
        }
        Ok(added)
    }
}
