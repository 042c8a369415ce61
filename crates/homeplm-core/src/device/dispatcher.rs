//! Event dispatcher
//!
//! Consumes decoded events in arrival order and applies them to the
//! matching device. Only direct messages change state: a broadcast (e.g. a
//! group "on" from a keypad) names the sender, not the loads it drives.

use std::sync::Arc;
use tracing::{debug, info};

use super::DeviceRegistry;
use crate::protocol::{DecodedEvent, DeviceAddress, DeviceState, EventReceiver, MessageClass};

/// What happened to one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// State applied to a known device
    Applied {
        /// Device name
        device: String,
        /// State before the event
        previous: DeviceState,
        /// State after the event
        state: DeviceState,
    },
    /// Not a direct message; no state change
    Ignored {
        /// Address that sent the message
        sender: DeviceAddress,
        /// Why it was not applied
        class: MessageClass,
    },
    /// Direct message from an address we do not know
    Unmatched {
        /// Address that sent the message
        sender: DeviceAddress,
    },
}

/// Applies events from the link driver to the device registry
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    events: EventReceiver,
}

impl Dispatcher {
    /// Dispatch events from `events` into `registry`
    pub fn new(registry: Arc<DeviceRegistry>, events: EventReceiver) -> Self {
        Self { registry, events }
    }

    /// Registry events are applied to
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Apply one event
    pub fn apply(&self, event: &DecodedEvent) -> DispatchOutcome {
        if event.class != MessageClass::Direct {
            debug!("Ignoring {:?} message from {}", event.class, event.sender);
            return DispatchOutcome::Ignored {
                sender: event.sender,
                class: event.class,
            };
        }

        match self.registry.find_by_address(&event.sender) {
            Some(device) => {
                let previous = device.set_state(event.state);
                info!(
                    "{} / {} ({}): {} -> {}",
                    device.room(),
                    device.name(),
                    device.address(),
                    previous,
                    event.state
                );
                DispatchOutcome::Applied {
                    device: device.name().to_string(),
                    previous,
                    state: event.state,
                }
            }
            None => {
                debug!("No device registered for {}", event.sender);
                DispatchOutcome::Unmatched { sender: event.sender }
            }
        }
    }

    /// Apply every event that is already queued, in order
    pub fn drain(&mut self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.events.poll() {
            outcomes.push(self.apply(&event));
        }
        outcomes
    }

    /// Apply events as they arrive until the link driver goes away.
    /// Returns the number of events handled.
    pub async fn run(mut self) -> u64 {
        let mut handled = 0;
        while let Some(event) = self.events.recv().await {
            self.apply(&event);
            handled += 1;
        }
        debug!("Event channel closed after {} event(s)", handled);
        handled
    }

    /// Blocking variant of [`Dispatcher::run`] for callers without a runtime
    pub fn run_blocking(mut self) -> u64 {
        let mut handled = 0;
        while let Some(event) = self.events.blocking_recv() {
            self.apply(&event);
            handled += 1;
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceKind};
    use crate::protocol::{command_queue, event_channel, MessageFlags};

    const LAMP: DeviceAddress = DeviceAddress::new([0x18, 0x8F, 0x00]);

    fn event(sender: DeviceAddress, flags: u8, state: DeviceState) -> DecodedEvent {
        let flags = MessageFlags::new(flags);
        DecodedEvent {
            sender,
            class: flags.class(),
            flags,
            state,
        }
    }

    fn setup() -> (Dispatcher, crate::protocol::EventSender) {
        let (cmd_tx, _cmd_rx) = command_queue();
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .add_device(Device::new("Lamp", "Den", LAMP, DeviceKind::Dimmer, cmd_tx))
            .unwrap();
        let (tx, rx) = event_channel();
        (Dispatcher::new(registry, rx), tx)
    }

    fn lamp_state(dispatcher: &Dispatcher) -> DeviceState {
        dispatcher.registry().find_by_address(&LAMP).unwrap().state()
    }

    #[test]
    fn test_direct_event_applied() {
        let (dispatcher, _tx) = setup();
        let outcome = dispatcher.apply(&event(LAMP, 0x20, DeviceState::on(60)));
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                device: "Lamp".into(),
                previous: DeviceState::off(),
                state: DeviceState::on(60),
            }
        );
        assert_eq!(lamp_state(&dispatcher), DeviceState::on(60));
    }

    #[test]
    fn test_broadcast_ignored() {
        let (dispatcher, _tx) = setup();
        let outcome = dispatcher.apply(&event(LAMP, 0xCF, DeviceState::on(100)));
        assert!(matches!(outcome, DispatchOutcome::Ignored { class: MessageClass::Broadcast, .. }));
        assert_eq!(lamp_state(&dispatcher), DeviceState::off());
    }

    #[test]
    fn test_unknown_sender() {
        let (dispatcher, _tx) = setup();
        let stranger = DeviceAddress::new([0xAA, 0xBB, 0xCC]);
        assert_eq!(
            dispatcher.apply(&event(stranger, 0x20, DeviceState::on(100))),
            DispatchOutcome::Unmatched { sender: stranger }
        );
    }

    #[test]
    fn test_drain_keeps_order() {
        let (mut dispatcher, tx) = setup();
        tx.send(event(LAMP, 0x20, DeviceState::on(30))).unwrap();
        tx.send(event(LAMP, 0x20, DeviceState::off())).unwrap();
        tx.send(event(LAMP, 0x20, DeviceState::on(90))).unwrap();

        let outcomes = dispatcher.drain();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            outcomes[1],
            DispatchOutcome::Applied { previous, state, .. }
                if previous == DeviceState::on(30) && state == DeviceState::off()
        ));
        assert_eq!(lamp_state(&dispatcher), DeviceState::on(90));
        assert!(dispatcher.drain().is_empty());
    }

    #[tokio::test]
    async fn test_run_ends_when_senders_drop() {
        let (dispatcher, tx) = setup();
        let registry = Arc::clone(dispatcher.registry());
        let task = tokio::spawn(dispatcher.run());

        tx.send(event(LAMP, 0x20, DeviceState::on(45))).unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap(), 1);
        assert_eq!(registry.find_by_address(&LAMP).unwrap().state(), DeviceState::on(45));
    }
}
