//! Event and command queues
//!
//! The link driver and the dispatcher share nothing but these two unbounded
//! FIFO queues. Senders never block, so device actions can be called from
//! any thread or task.

use tokio::sync::mpsc;

use super::{DecodedEvent, OutboundCommand, ProtocolError};

/// Create the outbound command queue
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Create the inbound event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer side of the outbound command queue
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<OutboundCommand>,
}

impl CommandSender {
    /// Queue a command for the link driver. Never blocks.
    pub fn enqueue(&self, command: OutboundCommand) -> Result<(), ProtocolError> {
        self.tx.send(command).map_err(|_| ProtocolError::QueueClosed)
    }

    /// Check if the link driver side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the outbound command queue, owned by the link driver
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<OutboundCommand>,
}

impl CommandReceiver {
    /// Take the next queued command without waiting
    pub fn try_next(&mut self) -> Option<OutboundCommand> {
        self.rx.try_recv().ok()
    }

    /// Drop everything still queued
    pub fn close(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

/// Producer side of the event channel, owned by the link driver
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<DecodedEvent>,
}

impl EventSender {
    /// Publish an event
    pub fn send(&self, event: DecodedEvent) -> Result<(), ProtocolError> {
        self.tx.send(event).map_err(|_| ProtocolError::QueueClosed)
    }

    /// Check if every event receiver has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the event channel; each event is received exactly once
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<DecodedEvent>,
}

impl EventReceiver {
    /// Next event if one is ready
    pub fn poll(&mut self) -> Option<DecodedEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<DecodedEvent> {
        self.rx.recv().await
    }

    /// Blocking wait for use outside an async runtime
    pub fn blocking_recv(&mut self) -> Option<DecodedEvent> {
        self.rx.blocking_recv()
    }
}
