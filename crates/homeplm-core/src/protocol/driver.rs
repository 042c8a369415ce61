//! Link driver
//!
//! Owns the connection to the modem and runs the send/receive loop:
//!
//! 1. write queued outbound commands (FIFO, capped per iteration)
//! 2. read every available byte, frame it, decode complete frames and
//!    publish the resulting events in wire order
//! 3. sleep for the polling interval
//!
//! The loop stops when the shared stop flag is set or the event receiver is
//! dropped. A partially received frame is discarded on stop.

use serde::Serialize;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

use super::{
    hex, is_timeout, open_channel, ByteFramer, CommandReceiver, EventSender, FrameClass,
    LinkConfig, MessageDecoder, PlmChannel, ProtocolError,
};

/// Bytes read from the channel per call
const READ_CHUNK: usize = 64;

/// Lifecycle of the link driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    /// Created, loop not started
    Idle,
    /// Loop running
    Running,
    /// Loop exited; the driver will not run again
    Stopped,
}

/// Link traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Bytes written to the modem
    pub tx_bytes: u64,
    /// Bytes read from the modem
    pub rx_bytes: u64,
    /// Outbound commands written in full
    pub commands_sent: u64,
    /// Frames the framer completed, events or not
    pub frames_completed: u64,
    /// Device events published to the event queue
    pub events_emitted: u64,
    /// Complete frames the decoder rejected
    pub decode_failures: u64,
    /// Bytes thrown away while resynchronising
    pub bytes_discarded: u64,
    /// Failed reads, writes and polls
    pub io_errors: u64,
}

/// Drives one modem connection
pub struct LinkDriver {
    channel: Box<dyn PlmChannel>,
    framer: ByteFramer,
    decoder: MessageDecoder,
    commands: CommandReceiver,
    events: EventSender,
    stop: Arc<AtomicBool>,
    config: LinkConfig,
    state: LinkState,
    stats: LinkStats,
}

impl LinkDriver {
    /// Create a driver over an already open channel
    pub fn new(
        channel: Box<dyn PlmChannel>,
        commands: CommandReceiver,
        events: EventSender,
        config: LinkConfig,
    ) -> Self {
        Self {
            channel,
            framer: ByteFramer::new(),
            decoder: MessageDecoder::new(),
            commands,
            events,
            stop: Arc::new(AtomicBool::new(false)),
            config,
            state: LinkState::Idle,
            stats: LinkStats::default(),
        }
    }

    /// Open the port named in `config` (see [`open_channel`]) and create a
    /// driver for it
    pub fn open(
        config: LinkConfig,
        commands: CommandReceiver,
        events: EventSender,
    ) -> Result<Self, ProtocolError> {
        let channel = open_channel(&config)?;
        Ok(Self::new(channel, commands, events, config))
    }

    /// Flag that stops the loop when set; checked every iteration
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Where the driver is in its lifecycle
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Settings the driver was created with
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Counters so far
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            bytes_discarded: self.framer.discarded(),
            ..self.stats
        }
    }

    /// Run one loop iteration without sleeping.
    ///
    /// I/O failures are logged and counted; the only error returned is
    /// [`ProtocolError::QueueClosed`] once nobody is listening for events.
    pub fn step(&mut self) -> Result<(), ProtocolError> {
        self.send_pending();
        self.receive_available()
    }

    /// Run until the stop flag is set or the event receiver goes away.
    /// The connection closes when the driver is dropped.
    pub fn run(&mut self) -> LinkStats {
        if self.state == LinkState::Stopped {
            return self.stats();
        }

        self.state = LinkState::Running;
        info!("Link driver running (poll every {}ms)", self.config.poll_interval_ms);

        while !self.stop.load(Ordering::Acquire) {
            if let Err(e) = self.step() {
                warn!("Link driver stopping: {}", e);
                break;
            }
            thread::sleep(self.config.poll_interval());
        }

        self.shutdown();
        self.stats()
    }

    /// Move the driver onto its own thread
    pub fn spawn(mut self) -> Result<LinkHandle, ProtocolError> {
        let stop = self.stop_flag();
        let thread = thread::Builder::new()
            .name("plm-link".to_string())
            .spawn(move || self.run())?;
        Ok(LinkHandle { stop, thread })
    }

    fn shutdown(&mut self) {
        if !self.framer.is_empty() {
            debug!("Discarding partial frame of {} byte(s)", self.framer.len());
            self.framer.clear();
        }
        self.commands.close();
        if let Err(e) = self.channel.flush() {
            debug!("Flush on shutdown failed: {}", e);
        }
        self.state = LinkState::Stopped;
        info!("Link driver stopped: {:?}", self.stats());
    }

    fn send_pending(&mut self) {
        for _ in 0..self.config.max_sends_per_cycle.max(1) {
            let Some(command) = self.commands.try_next() else {
                break;
            };
            let bytes = command.to_bytes();

            // write_all hands the bytes to the kernel; flush() would block in
            // tcdrain until they are on the wire.
            match self.channel.write_all(&bytes) {
                Ok(()) => {
                    self.stats.tx_bytes += bytes.len() as u64;
                    self.stats.commands_sent += 1;
                    debug!("Sent {}", command);
                }
                Err(e) => {
                    self.stats.io_errors += 1;
                    warn!("Failed to send {}: {}", command, e);
                }
            }
        }
    }

    fn receive_available(&mut self) -> Result<(), ProtocolError> {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let available = match self.channel.bytes_to_read() {
                Ok(n) => n as usize,
                Err(e) => {
                    self.stats.io_errors += 1;
                    warn!("Serial poll failed: {}", e);
                    return Ok(());
                }
            };
            if available == 0 {
                return Ok(());
            }

            let want = available.min(READ_CHUNK);
            let read = match self.channel.read(&mut buf[..want]) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if is_timeout(&e) => return Ok(()),
                Err(e) => {
                    self.stats.io_errors += 1;
                    warn!("Serial read failed: {}", e);
                    return Ok(());
                }
            };

            self.stats.rx_bytes += read as u64;
            trace!("Read {}", hex(&buf[..read]));

            for &byte in &buf[..read] {
                self.framer.add_byte(byte);
                if self.framer.is_complete() {
                    self.handle_frame()?;
                }
            }
        }
    }

    fn handle_frame(&mut self) -> Result<(), ProtocolError> {
        let frame = self.framer.frame().to_vec();
        self.framer.clear();
        self.stats.frames_completed += 1;
        trace!("Frame {}", hex(&frame));

        match self.decoder.classify(&frame) {
            Ok(FrameClass::StandardReceive(event)) => {
                debug!("Event from {}: {:?} {}", event.sender, event.class, event.state);
                self.events.send(event)?;
                self.stats.events_emitted += 1;
            }
            Ok(FrameClass::Echo { target, accepted }) => {
                if accepted {
                    debug!("Modem accepted send to {}", target);
                } else {
                    debug!("Modem rejected send to {}", target);
                }
            }
            Ok(FrameClass::Nak) => debug!("Modem NAK"),
            Ok(FrameClass::Ignored { code, name }) => {
                debug!("Ignoring {} ({:#04x}) frame", name, code);
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!("Dropped frame {}: {}", hex(&frame), e);
            }
        }
        Ok(())
    }
}

/// Handle to a driver running on its own thread
pub struct LinkHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<LinkStats>,
}

impl LinkHandle {
    /// Ask the driver to stop; it exits within one polling interval
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop flag shared with the driver
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// False once the driver thread has exited
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Stop the driver and wait for it
    pub fn join(self) -> Result<LinkStats, ProtocolError> {
        self.stop();
        self.thread.join().map_err(|_| ProtocolError::DriverPanicked)
    }
}
