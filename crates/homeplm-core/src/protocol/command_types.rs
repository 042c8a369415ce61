//! Command-type table
//!
//! The second byte of every frame selects its command type, which fixes the
//! total frame length. The table is static data; nothing mutates it.

/// How a complete frame of a given type is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Standard message received from a device; decoded into an event
    StandardReceive,
    /// Echo of a frame the host sent, with the modem's ACK/NAK trailer
    Echo,
    /// Housekeeping traffic we recognise for framing only
    Ignored,
}

/// Alternate length for a command type whose size depends on a flag bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedLength {
    /// Byte index holding the flag
    pub flag_index: usize,
    /// Bit mask selecting the extended form
    pub mask: u8,
    /// Frame length when the bit is set
    pub length: usize,
}

/// Immutable description of one command type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTypeDescriptor {
    /// Command-type byte (frame byte 1)
    pub code: u8,
    /// Name used in logs
    pub name: &'static str,
    /// Expected total frame length, including the `0x02` start byte
    pub length: usize,
    /// How the frame is handled once complete
    pub kind: FrameKind,
    /// Extended-length rule for ambiguous codes
    pub extended: Option<ExtendedLength>,
}

impl CommandTypeDescriptor {
    const fn new(code: u8, name: &'static str, length: usize, kind: FrameKind) -> Self {
        Self {
            code,
            name,
            length,
            kind,
            extended: None,
        }
    }

    const fn with_extended(self, flag_index: usize, mask: u8, length: usize) -> Self {
        Self {
            extended: Some(ExtendedLength {
                flag_index,
                mask,
                length,
            }),
            ..self
        }
    }

    /// Target length of `frame`, or `None` while the flag byte that decides
    /// between standard and extended form has not arrived yet.
    pub fn target_length(&self, frame: &[u8]) -> Option<usize> {
        match self.extended {
            None => Some(self.length),
            Some(ext) => {
                let flag = *frame.get(ext.flag_index)?;
                if flag & ext.mask == ext.mask {
                    Some(ext.length)
                } else {
                    Some(self.length)
                }
            }
        }
    }
}

/// Standard message received
pub const STANDARD_RECEIVED: u8 = 0x50;

/// Send message (echoed back by the modem)
pub const SEND_MESSAGE: u8 = 0x62;

/// Get modem info
pub const GET_IM_INFO: u8 = 0x60;

use self::FrameKind::{Echo, Ignored, StandardReceive};

static COMMAND_TYPES: [CommandTypeDescriptor; 29] = [
    CommandTypeDescriptor::new(0x50, "Standard Message Received", 11, StandardReceive),
    CommandTypeDescriptor::new(0x51, "Extended Message Received", 25, Ignored),
    CommandTypeDescriptor::new(0x52, "X10 Received", 4, Ignored),
    CommandTypeDescriptor::new(0x53, "All-Link Complete", 10, Ignored),
    CommandTypeDescriptor::new(0x54, "Button Event Report", 3, Ignored),
    CommandTypeDescriptor::new(0x55, "User Reset Detected", 2, Ignored),
    CommandTypeDescriptor::new(0x56, "All-Link Cleanup Failure", 7, Ignored),
    CommandTypeDescriptor::new(0x57, "All-Link Record Response", 10, Ignored),
    CommandTypeDescriptor::new(0x58, "All-Link Cleanup Status", 3, Ignored),
    CommandTypeDescriptor::new(0x60, "Get IM Info", 9, Ignored),
    CommandTypeDescriptor::new(0x61, "Send All-Link Command", 6, Ignored),
    // Bit 4 of the message flags marks an extended (14 byte user data) send.
    CommandTypeDescriptor::new(0x62, "Send Message", 9, Echo).with_extended(5, 1 << 4, 23),
    CommandTypeDescriptor::new(0x63, "Send X10", 5, Ignored),
    CommandTypeDescriptor::new(0x64, "Start All-Linking", 5, Ignored),
    CommandTypeDescriptor::new(0x65, "Cancel All-Linking", 3, Ignored),
    CommandTypeDescriptor::new(0x66, "Set Host Device Category", 6, Ignored),
    CommandTypeDescriptor::new(0x67, "Reset IM", 3, Ignored),
    CommandTypeDescriptor::new(0x68, "Set ACK Message Byte", 4, Ignored),
    CommandTypeDescriptor::new(0x69, "Get First All-Link Record", 3, Ignored),
    CommandTypeDescriptor::new(0x6A, "Get Next All-Link Record", 3, Ignored),
    CommandTypeDescriptor::new(0x6B, "Set IM Configuration", 4, Ignored),
    CommandTypeDescriptor::new(0x6C, "Get All-Link Record for Sender", 3, Ignored),
    CommandTypeDescriptor::new(0x6D, "LED On", 3, Ignored),
    CommandTypeDescriptor::new(0x6E, "LED Off", 3, Ignored),
    CommandTypeDescriptor::new(0x6F, "Manage All-Link Record", 12, Ignored),
    CommandTypeDescriptor::new(0x70, "Set NAK Message Byte", 4, Ignored),
    CommandTypeDescriptor::new(0x71, "Set ACK Message Two Bytes", 5, Ignored),
    CommandTypeDescriptor::new(0x72, "RF Sleep", 3, Ignored),
    CommandTypeDescriptor::new(0x73, "Get IM Configuration", 6, Ignored),
];

/// Look up the descriptor for a command-type byte
pub fn lookup(code: u8) -> Option<&'static CommandTypeDescriptor> {
    // Codes are dense in 0x50..=0x58 and 0x60..=0x73
    let index = match code {
        0x50..=0x58 => (code - 0x50) as usize,
        0x60..=0x73 => (code - 0x60) as usize + 9,
        _ => return None,
    };
    COMMAND_TYPES.get(index)
}

/// Check whether `code` is a known command-type byte
pub fn is_known(code: u8) -> bool {
    lookup(code).is_some()
}

/// All known descriptors, in code order
pub fn all() -> &'static [CommandTypeDescriptor] {
    &COMMAND_TYPES
}
