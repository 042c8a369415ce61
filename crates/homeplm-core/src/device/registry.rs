//! Device registry
//!
//! Devices grouped by room, looked up by address when events arrive.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Device, DeviceError, DeviceKind};
use crate::protocol::DeviceAddress;

/// Row describing one device, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    /// Device name
    pub name: String,
    /// Room name
    pub room: String,
    /// Switch or dimmer
    pub kind: DeviceKind,
    /// Address as `AA:BB:CC`
    pub address: String,
    /// Current state, e.g. `On (75%)`
    pub state: String,
}

#[derive(Debug, Default)]
struct Inner {
    /// room -> device name -> device
    rooms: BTreeMap<String, BTreeMap<String, Arc<Device>>>,
    by_address: HashMap<DeviceAddress, Arc<Device>>,
}

/// Thread-safe collection of known devices
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty room (no-op if it exists)
    pub fn add_room(&self, room: &str) {
        self.write().rooms.entry(room.to_string()).or_default();
    }

    /// Register a device in its room, creating the room if needed.
    /// Two devices may not share an address.
    pub fn add_device(&self, device: Device) -> Result<Arc<Device>, DeviceError> {
        let mut inner = self.write();
        if inner.by_address.contains_key(&device.address()) {
            return Err(DeviceError::DuplicateAddress(device.address()));
        }

        let device = Arc::new(device);
        inner.by_address.insert(device.address(), Arc::clone(&device));
        let replaced = inner
            .rooms
            .entry(device.room().to_string())
            .or_default()
            .insert(device.name().to_string(), Arc::clone(&device));
        if let Some(replaced) = replaced {
            // Same name in the same room: the old entry goes away entirely
            inner.by_address.remove(&replaced.address());
        }
        Ok(device)
    }

    /// Remove a device by room and name
    pub fn remove_device(&self, room: &str, name: &str) -> Result<Arc<Device>, DeviceError> {
        let mut inner = self.write();
        let device = inner
            .rooms
            .get_mut(room)
            .and_then(|devices| devices.remove(name))
            .ok_or_else(|| DeviceError::NotFound(format!("{}/{}", room, name)))?;
        inner.by_address.remove(&device.address());
        Ok(device)
    }

    /// Device with this address, if registered
    pub fn find_by_address(&self, address: &DeviceAddress) -> Option<Arc<Device>> {
        self.read().by_address.get(address).cloned()
    }

    /// Device by room and name
    pub fn find_by_name(&self, room: &str, name: &str) -> Option<Arc<Device>> {
        self.read().rooms.get(room).and_then(|devices| devices.get(name)).cloned()
    }

    /// Room names in order
    pub fn rooms(&self) -> Vec<String> {
        self.read().rooms.keys().cloned().collect()
    }

    /// All devices, ordered by room then name
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.read()
            .rooms
            .values()
            .flat_map(|devices| devices.values().cloned())
            .collect()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.read().by_address.len()
    }

    /// True when no device is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One row per device, ordered by room then name
    pub fn snapshot(&self) -> Vec<DeviceSummary> {
        self.devices()
            .iter()
            .map(|d| DeviceSummary {
                name: d.name().to_string(),
                room: d.room().to_string(),
                kind: d.kind(),
                address: d.address().to_string(),
                state: d.state().to_string(),
            })
            .collect()
    }

    /// Snapshot as JSON, for remote clients
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{command_queue, DeviceState};
    use pretty_assertions::assert_eq;

    const LAMP: DeviceAddress = DeviceAddress::new([1, 2, 3]);
    const PORCH: DeviceAddress = DeviceAddress::new([4, 5, 6]);

    fn registry() -> DeviceRegistry {
        let (tx, _rx) = command_queue();
        let registry = DeviceRegistry::new();
        registry
            .add_device(Device::new("Lamp", "Den", LAMP, DeviceKind::Dimmer, tx.clone()))
            .unwrap();
        registry
            .add_device(Device::new("Porch", "Outside", PORCH, DeviceKind::Switch, tx))
            .unwrap();
        registry
    }

    #[test]
    fn test_find() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.find_by_address(&DeviceAddress::new([4, 5, 6])).unwrap().name(),
            "Porch"
        );
        assert!(registry.find_by_address(&DeviceAddress::new([9, 9, 9])).is_none());
        assert!(registry.find_by_name("Den", "Lamp").is_some());
        assert!(registry.find_by_name("Den", "Porch").is_none());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let registry = registry();
        let (tx, _rx) = command_queue();
        let dup = Device::new("Other", "Kitchen", LAMP, DeviceKind::Switch, tx);
        assert!(matches!(registry.add_device(dup), Err(DeviceError::DuplicateAddress(_))));
        assert_eq!(registry.len(), 2);
        assert!(!registry.rooms().contains(&"Kitchen".to_string()));
    }

    #[test]
    fn test_remove() {
        let registry = registry();
        registry.remove_device("Den", "Lamp").unwrap();
        assert!(registry.find_by_address(&DeviceAddress::new([1, 2, 3])).is_none());
        assert!(matches!(registry.remove_device("Den", "Lamp"), Err(DeviceError::NotFound(_))));
        // Room stays
        assert_eq!(registry.rooms(), vec!["Den".to_string(), "Outside".to_string()]);
    }

    #[test]
    fn test_snapshot() {
        let registry = registry();
        registry
            .find_by_name("Den", "Lamp")
            .unwrap()
            .set_state(DeviceState::on(75));

        assert_eq!(
            registry.snapshot(),
            vec![
                DeviceSummary {
                    name: "Lamp".into(),
                    room: "Den".into(),
                    kind: DeviceKind::Dimmer,
                    address: "01:02:03".into(),
                    state: "On (75%)".into(),
                },
                DeviceSummary {
                    name: "Porch".into(),
                    room: "Outside".into(),
                    kind: DeviceKind::Switch,
                    address: "04:05:06".into(),
                    state: "Off (0%)".into(),
                },
            ]
        );

        let json = registry.snapshot_json().unwrap();
        assert!(json.contains("\"kind\":\"dimmer\""));
    }
}
