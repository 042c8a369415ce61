//! Link driver against an in-memory channel.

use homeplm_core::protocol::{
    command_queue, event_channel, DeviceAddress, DeviceState, LinkConfig, LinkDriver, LinkState,
    OutboundCommand, PlmChannel, ProtocolError,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Route driver logs through the test harness (shown with `--nocapture`)
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("homeplm_core=trace"))
        .with_test_writer()
        .try_init();
}

/// Log sink a test can read back
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// What the mock modem has to say and what it has heard
#[derive(Default)]
struct Wire {
    /// Chunks delivered one per read, as a UART would
    incoming: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    fail_writes: bool,
    fail_reads: usize,
}

#[derive(Clone, Default)]
struct MockChannel {
    wire: Arc<Mutex<Wire>>,
}

impl MockChannel {
    fn push(&self, bytes: &[u8]) {
        self.wire.lock().unwrap().incoming.push_back(bytes.to_vec());
    }

    fn written(&self) -> Vec<u8> {
        self.wire.lock().unwrap().written.clone()
    }
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        if wire.fail_reads > 0 {
            wire.fail_reads -= 1;
            return Err(io::Error::other("device unplugged"));
        }
        let Some(mut chunk) = wire.incoming.pop_front() else {
            return Err(io::ErrorKind::TimedOut.into());
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            wire.incoming.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        if wire.fail_writes {
            return Err(io::Error::other("write failed"));
        }
        wire.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl PlmChannel for MockChannel {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.wire.lock().unwrap().incoming.clear();
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let wire = self.wire.lock().unwrap();
        Ok(wire.incoming.front().map_or(0, |c| c.len() as u32))
    }
}

const LAMP: DeviceAddress = DeviceAddress::new([0x18, 0x8F, 0x00]);
const FAN: DeviceAddress = DeviceAddress::new([0x20, 0x1A, 0x3B]);

fn receive(sender: DeviceAddress, flags: u8, cmd1: u8, cmd2: u8) -> Vec<u8> {
    let mut frame = vec![0x02, 0x50];
    frame.extend_from_slice(&sender.bytes());
    frame.extend_from_slice(&[0x44, 0x55, 0x66, flags, cmd1, cmd2]);
    frame
}

fn config() -> LinkConfig {
    LinkConfig {
        poll_interval_ms: 2,
        ..LinkConfig::for_port("mock")
    }
}

#[test]
fn test_events_in_wire_order_across_split_reads() {
    init_logging();
    let channel = MockChannel::default();
    let (_commands, command_rx) = command_queue();
    let (event_tx, mut events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());

    let first = receive(LAMP, 0x20, 0x11, 0xFF);
    channel.push(&first[..4]);
    driver.step().unwrap();
    assert!(events.poll().is_none(), "half a frame must not produce an event");

    let mut rest = first[4..].to_vec();
    rest.extend_from_slice(&receive(FAN, 0x20, 0x13, 0x00));
    rest.extend_from_slice(&[0xDE, 0xAD]);
    channel.push(&rest);
    channel.push(&receive(LAMP, 0x20, 0x2E, 0x80));
    driver.step().unwrap();

    let received: Vec<_> = std::iter::from_fn(|| events.poll()).collect();
    assert_eq!(received.len(), 3);
    assert_eq!((received[0].sender, received[0].state), (LAMP, DeviceState::on(100)));
    assert_eq!((received[1].sender, received[1].state), (FAN, DeviceState::off()));
    // 0x80 >> 4 = 8, 8 / 15 * 100 = 53.3 truncated
    assert_eq!((received[2].sender, received[2].state), (LAMP, DeviceState::on(53)));

    let stats = driver.stats();
    assert_eq!(stats.events_emitted, 3);
    assert_eq!(stats.bytes_discarded, 2);
}

#[test]
fn test_send_drain_is_capped_per_iteration() {
    init_logging();
    let channel = MockChannel::default();
    let (commands, command_rx) = command_queue();
    let (event_tx, _events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());

    for i in 0..40u8 {
        commands.enqueue(OutboundCommand::standard(LAMP, 0x11, i)).unwrap();
    }

    driver.step().unwrap();
    assert_eq!(channel.written().len(), 16 * 8);
    driver.step().unwrap();
    assert_eq!(channel.written().len(), 32 * 8);
    driver.step().unwrap();
    assert_eq!(channel.written().len(), 40 * 8);

    // FIFO: cmd2 of each frame counts up
    let cmd2: Vec<u8> = channel.written().chunks(8).map(|f| f[7]).collect();
    assert_eq!(cmd2, (0..40).collect::<Vec<u8>>());
    assert_eq!(driver.stats().commands_sent, 40);
    assert_eq!(driver.stats().tx_bytes, 320);
}

#[test]
fn test_io_failures_do_not_stop_the_link() {
    let channel = MockChannel::default();
    let (commands, command_rx) = command_queue();
    let (event_tx, mut events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());

    let logs = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        channel.wire.lock().unwrap().fail_writes = true;
        commands.enqueue(OutboundCommand::turn_on(LAMP, 100.0, false)).unwrap();
        commands.enqueue(OutboundCommand::turn_off(LAMP, false)).unwrap();
        driver.step().unwrap();
        assert!(channel.written().is_empty());
        assert_eq!(driver.stats().io_errors, 2);
        assert_eq!(driver.stats().commands_sent, 0);

        channel.wire.lock().unwrap().fail_writes = false;
        channel.wire.lock().unwrap().fail_reads = 1;
        channel.push(&receive(LAMP, 0x20, 0x13, 0x00));
        driver.step().unwrap();
        assert!(events.poll().is_none());
        assert_eq!(driver.stats().io_errors, 3);
    });

    let logs = logs.contents();
    assert_eq!(logs.matches("Failed to send").count(), 2, "{}", logs);
    assert!(logs.contains("Serial read failed: device unplugged"), "{}", logs);

    // The bytes are still waiting on the next iteration
    driver.step().unwrap();
    assert_eq!(events.poll().map(|e| e.state), Some(DeviceState::off()));
}

#[test]
fn test_non_event_frames_emit_nothing() {
    init_logging();
    let channel = MockChannel::default();
    let (_commands, command_rx) = command_queue();
    let (event_tx, mut events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());

    // Echo of our send, a NAK, and a modem info reply
    channel.push(&[0x02, 0x62, 0x18, 0x8F, 0x00, 0x0F, 0x11, 0xFF, 0x06]);
    channel.push(&[0x15]);
    channel.push(&[0x02, 0x60, 0x11, 0x22, 0x33, 0x03, 0x15, 0x9B, 0x06]);
    driver.step().unwrap();

    assert!(events.poll().is_none());
    assert_eq!(driver.stats().frames_completed, 3);
    assert_eq!(driver.stats().events_emitted, 0);
}

#[test]
fn test_unknown_command_is_dropped_and_counted() {
    init_logging();
    let channel = MockChannel::default();
    let (_commands, command_rx) = command_queue();
    let (event_tx, mut events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());

    channel.push(&receive(LAMP, 0x20, 0x99, 0x00));
    channel.push(&receive(FAN, 0x20, 0x12, 0xFF));
    driver.step().unwrap();

    assert_eq!(events.poll().map(|e| e.sender), Some(FAN));
    assert!(events.poll().is_none());
    assert_eq!(driver.stats().decode_failures, 1);
}

#[test]
fn test_step_reports_dropped_event_receiver() {
    init_logging();
    let channel = MockChannel::default();
    let (_commands, command_rx) = command_queue();
    let (event_tx, events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());
    drop(events);

    channel.push(&receive(LAMP, 0x20, 0x11, 0xFF));
    assert!(matches!(driver.step(), Err(ProtocolError::QueueClosed)));
}

#[test]
fn test_run_exits_when_event_receiver_drops() {
    init_logging();
    let channel = MockChannel::default();
    let (_commands, command_rx) = command_queue();
    let (event_tx, events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());
    drop(events);
    channel.push(&receive(LAMP, 0x20, 0x11, 0xFF));

    // Without the receiver the loop ends on its own; no stop flag needed
    let stats = driver.run();
    assert_eq!(driver.state(), LinkState::Stopped);
    assert_eq!(stats.frames_completed, 1);
    assert_eq!(stats.events_emitted, 0);
}

#[test]
fn test_spawned_driver_stops_promptly() {
    init_logging();
    let channel = MockChannel::default();
    let (commands, command_rx) = command_queue();
    let (event_tx, mut events) = event_channel();
    let driver = LinkDriver::new(Box::new(channel.clone()), command_rx, event_tx, config());
    assert_eq!(driver.state(), LinkState::Idle);

    let handle = driver.spawn().unwrap();
    commands.enqueue(OutboundCommand::status_request(LAMP)).unwrap();
    channel.push(&receive(LAMP, 0x2B, 0x11, 0x7F));

    let deadline = Instant::now() + Duration::from_secs(2);
    let event = loop {
        if let Some(event) = events.poll() {
            break event;
        }
        assert!(Instant::now() < deadline, "no event from running driver");
        std::thread::sleep(Duration::from_millis(1));
    };
    assert_eq!(event.state, DeviceState::on(50));
    assert!(handle.is_running());

    let started = Instant::now();
    let stats = handle.join().unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(stats.commands_sent, 1);
    assert_eq!(channel.written(), OutboundCommand::status_request(LAMP).to_bytes());

    // Driver is gone; its queue no longer accepts work
    assert!(matches!(
        commands.enqueue(OutboundCommand::get_im_info()),
        Err(ProtocolError::QueueClosed)
    ));
}

#[test]
fn test_run_after_stop_is_a_no_op() {
    init_logging();
    let channel = MockChannel::default();
    let (_commands, command_rx) = command_queue();
    let (event_tx, _events) = event_channel();
    let mut driver = LinkDriver::new(Box::new(channel), command_rx, event_tx, config());

    driver.stop_flag().store(true, std::sync::atomic::Ordering::Release);
    driver.run();
    assert_eq!(driver.state(), LinkState::Stopped);
    driver.run();
    assert_eq!(driver.state(), LinkState::Stopped);
}
