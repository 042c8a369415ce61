//! Byte framing
//!
//! Reassembles frames from the serial byte stream one byte at a time.
//!
//! The modem gives no length prefix or checksum; a frame is recognised by its
//! `0x02` start byte and a known command-type byte, whose table entry fixes the
//! length. Anything that cannot be the start of a valid frame is dropped from
//! the front of the buffer until the buffer is empty or starts cleanly again.
//!
//! A `0x15` that arrives in the middle of garbage is dropped along with it, so
//! a genuine NAK can be lost while resynchronising. There is no way to tell the
//! two apart without more context than the stream provides.

use tracing::debug;

use super::{command_types, FRAME_START, MAX_FRAME_SIZE, NAK};

/// Accumulates one in-progress frame
#[derive(Debug, Clone)]
pub struct ByteFramer {
    /// Bytes of the frame being assembled
    buffer: Vec<u8>,
    /// Total bytes dropped by repairs since creation
    discarded: u64,
}

impl ByteFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            // One spare slot so an oversized frame can be observed before repair
            buffer: Vec::with_capacity(MAX_FRAME_SIZE + 1),
            discarded: 0,
        }
    }

    /// Append a byte read from the wire
    pub fn add_byte(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    /// Bytes currently held
    pub fn frame(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no bytes are held
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total number of bytes dropped by repairs
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Reset to an empty frame
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Check whether the held bytes form a complete frame.
    ///
    /// Corrupted content is repaired first, which may shrink the buffer all
    /// the way to empty. Every repair drops at least one byte, so this always
    /// terminates.
    pub fn is_complete(&mut self) -> bool {
        while self.is_corrupted() {
            self.repair();
        }

        match self.buffer.as_slice() {
            [] | [FRAME_START] => false,
            [NAK] => true,
            [_, code, ..] => match command_types::lookup(*code) {
                Some(desc) => desc.target_length(&self.buffer) == Some(self.buffer.len()),
                None => false,
            },
            [_] => false,
        }
    }

    /// Check whether the held bytes cannot be (the start of) a valid frame
    pub fn is_corrupted(&self) -> bool {
        match self.buffer.as_slice() {
            b if b.len() > MAX_FRAME_SIZE => true,
            [] => false,
            [first] => *first != FRAME_START && *first != NAK,
            [first, code, ..] => *first != FRAME_START || !command_types::is_known(*code),
        }
    }

    /// Drop bytes from the front until the buffer is empty or begins with
    /// `0x02` followed by a known command-type byte. Returns the number of
    /// bytes dropped.
    pub fn repair(&mut self) -> usize {
        let before = self.buffer.len();

        loop {
            let start = self
                .buffer
                .iter()
                .position(|&b| b == FRAME_START)
                .unwrap_or(self.buffer.len());
            self.buffer.drain(..start);

            if self.buffer.len() > 1 && !command_types::is_known(self.buffer[1]) {
                self.buffer.remove(0);
                continue;
            }
            break;
        }

        // A well-formed header on an oversized buffer: the length was missed,
        // so give up on this start byte too.
        if self.buffer.len() == before && self.is_corrupted() {
            self.buffer.remove(0);
        }

        let dropped = before - self.buffer.len();
        if dropped > 0 {
            debug!("Repaired frame: dropped {} byte(s), {} left", dropped, self.buffer.len());
        }
        self.discarded += dropped as u64;
        dropped
    }
}

impl Default for ByteFramer {
    fn default() -> Self {
        Self::new()
    }
}
