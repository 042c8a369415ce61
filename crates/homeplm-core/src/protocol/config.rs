//! Link configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL_MS};

/// Settings for the serial link to the modem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port name (e.g. "/dev/ttyUSB0" or "COM3")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Sleep between loop iterations in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on commands written per loop iteration, so a flood of
    /// outbound traffic cannot starve reads
    pub max_sends_per_cycle: usize,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl LinkConfig {
    /// Config for a named port with defaults for everything else
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Polling interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Read timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_sends_per_cycle: 16,
            read_timeout_ms: 10,
        }
    }
}
