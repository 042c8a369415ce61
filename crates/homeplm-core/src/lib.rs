//! # HomePLM Core Library
//!
//! Protocol engine for power-line home automation modems (PLM).

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Byte framing of the modem's serial stream, with corruption repair
//! - Decoding of standard receive frames into device state events
//! - Encoding of device actions into outbound send frames
//! - A link driver that moves bytes between the wire and two queues
//! - A device registry and dispatcher that apply events to device state
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use homeplm_core::prelude::*;
//!
//! let (commands, command_rx) = command_queue();
//! let (event_tx, events) = event_channel();
//!
//! let registry = Arc::new(DeviceRegistry::new());
//! let lamp = registry.add_device(Device::new(
//!     "Lamp",
//!     "Den",
//!     "18:8F:00".parse()?,
//!     DeviceKind::Dimmer,
//!     commands,
//! ))?;
//!
//! let link = LinkDriver::open(LinkConfig::for_port("/dev/ttyUSB0"), command_rx, event_tx)?
//!     .spawn()?;
//! lamp.turn_on(75.0, false)?;
//!
//! Dispatcher::new(registry, events).run().await;
//! ```

pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{
        Device, DeviceError, DeviceKind, DeviceRegistry, DispatchOutcome, Dispatcher,
    };
    pub use crate::protocol::{
        command_queue, event_channel, ByteFramer, CommandSender, DecodedEvent, DeviceAction,
        DeviceAddress, DeviceState, EventReceiver, LinkConfig, LinkDriver, LinkHandle,
        MessageDecoder, OutboundCommand, ProtocolError,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
