//! Device addresses
//!
//! Every device on the power-line network has a fixed three byte address,
//! printed on the device as `AA.BB.CC`. We format it as `AA:BB:CC`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ProtocolError;

/// Three-byte device address, compared by exact byte equality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress([u8; 3]);

impl DeviceAddress {
    /// Create an address from its raw bytes
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// Read an address out of a frame starting at `offset`
    pub fn from_slice(data: &[u8], offset: usize) -> Result<Self, ProtocolError> {
        match data.get(offset..offset + 3) {
            Some(b) => Ok(Self([b[0], b[1], b[2]])),
            None => Err(ProtocolError::FrameTooShort {
                expected: offset + 3,
                actual: data.len(),
            }),
        }
    }

    /// Raw address bytes
    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }
}

impl From<[u8; 3]> for DeviceAddress {
    fn from(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for DeviceAddress {
    type Err = ProtocolError;

    /// Parse `AA:BB:CC` (also accepts `.` as separator, as printed on devices)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '.']).collect();
        if parts.len() != 3 {
            return Err(ProtocolError::InvalidAddress(s.to_string()));
        }

        let mut bytes = [0u8; 3];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(ProtocolError::InvalidAddress(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| ProtocolError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(addr: DeviceAddress) -> Self {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_upper_hex() {
        let addr = DeviceAddress::new([0x18, 0x8f, 0x00]);
        assert_eq!(addr.to_string(), "18:8F:00");
    }

    #[test]
    fn test_parse() {
        let addr: DeviceAddress = "18:8f:00".parse().unwrap();
        assert_eq!(addr.bytes(), [0x18, 0x8F, 0x00]);

        let dotted: DeviceAddress = "1A.2B.3C".parse().unwrap();
        assert_eq!(dotted.bytes(), [0x1A, 0x2B, 0x3C]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("18:8F".parse::<DeviceAddress>().is_err());
        assert!("18:8F:00:01".parse::<DeviceAddress>().is_err());
        assert!("18:XX:00".parse::<DeviceAddress>().is_err());
        assert!("18:100:00".parse::<DeviceAddress>().is_err());
        assert!("::".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_from_slice() {
        let frame = [0x02, 0x50, 0x11, 0x22, 0x33];
        let addr = DeviceAddress::from_slice(&frame, 2).unwrap();
        assert_eq!(addr, DeviceAddress::new([0x11, 0x22, 0x33]));
        assert!(DeviceAddress::from_slice(&frame, 3).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let addr = DeviceAddress::new([0x0A, 0x0B, 0x0C]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0A:0B:0C\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
