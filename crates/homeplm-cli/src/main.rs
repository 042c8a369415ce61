//! HomePLM command line tool
//!
//! Talks to a power-line modem on a serial port (or a `tcp://host:port`
//! bridge): list ports, query the modem, monitor device traffic, or send a
//! single command.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use homeplm_core::device::{DeviceRegistry, Dispatcher};
use homeplm_core::protocol::{
    command_queue, event_channel, hex, is_timeout, list_ports, open_channel, ByteFramer,
    DeviceAction, DeviceAddress, FrameClass, LinkConfig, LinkDriver, MessageDecoder,
    OutboundCommand,
};

use config::HouseConfig;

#[derive(Parser, Debug)]
#[command(name = "homeplm", version, about = "Power-line modem bridge")]
struct Cli {
    /// More logging (-v debug, -vv trace); RUST_LOG applies otherwise
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Ask the modem for its info and print every frame it sends back
    Info {
        #[command(flatten)]
        link: LinkArgs,
        /// How long to listen, in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
    },
    /// Track device state until Ctrl-C
    Monitor {
        #[command(flatten)]
        link: LinkArgs,
        /// House file listing rooms and devices
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Ask every device for its status on start
        #[arg(long)]
        query: bool,
    },
    /// Send one command to a device
    Send {
        #[command(flatten)]
        link: LinkArgs,
        /// Device address, e.g. 18:8F:00
        #[arg(short, long)]
        address: DeviceAddress,
        /// How long to listen for replies, in milliseconds
        #[arg(long, default_value_t = 500)]
        wait_ms: u64,
        #[command(subcommand)]
        action: ActionArg,
    },
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Serial port or tcp://host:port (default: first port found)
    #[arg(short, long)]
    port: Option<String>,
    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,
}

impl LinkArgs {
    /// Command line values over house file values over defaults
    fn resolve(&self, base: LinkConfig) -> Result<LinkConfig> {
        let mut config = base;
        if let Some(port) = &self.port {
            config.port_name = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if config.port_name.is_empty() {
            let Some(first) = list_ports().into_iter().next() else {
                bail!("No serial ports found; pass --port");
            };
            info!("Using {}", first.name);
            config.port_name = first.name;
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ActionArg {
    /// Turn on
    On {
        /// Level in percent
        #[arg(default_value_t = 100.0)]
        level: f64,
        #[arg(long)]
        fast: bool,
    },
    /// Turn off
    Off {
        #[arg(long)]
        fast: bool,
    },
    /// Ramp to a level
    RampOn {
        /// Ramp time in seconds
        #[arg(long, default_value_t = 2.0)]
        time: f64,
        /// Level in percent
        #[arg(default_value_t = 100.0)]
        level: f64,
    },
    /// Ramp off
    RampOff {
        /// Ramp time in seconds
        #[arg(long, default_value_t = 2.0)]
        time: f64,
    },
    /// Ask for the current level
    Status,
}

impl From<ActionArg> for DeviceAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::On { level, fast } => DeviceAction::TurnOn { level, fast },
            ActionArg::Off { fast } => DeviceAction::TurnOff { fast },
            ActionArg::RampOn { time, level } => DeviceAction::RampOn { time, level },
            ActionArg::RampOff { time } => DeviceAction::RampOff { time },
            ActionArg::Status => DeviceAction::StatusRequest,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Ports => ports(),
        Command::Info { link, seconds } => info_query(&link, seconds),
        Command::Monitor { link, config, query } => monitor(&link, config, query),
        Command::Send {
            link,
            address,
            wait_ms,
            action,
        } => send(&link, address, action.into(), Duration::from_millis(wait_ms)),
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn ports() -> Result<()> {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  {:04x}:{:04x}  {} {}",
                port.name,
                vid,
                pid,
                port.manufacturer.unwrap_or_default(),
                port.product.unwrap_or_default()
            ),
            _ => println!("{}", port.name),
        }
    }
    Ok(())
}

/// Send Get IM Info and print what comes back. Runs without the link driver
/// so every frame, not just device events, is shown.
fn info_query(link: &LinkArgs, seconds: f64) -> Result<()> {
    let config = link.resolve(LinkConfig::default())?;
    let mut channel =
        open_channel(&config).with_context(|| format!("Cannot open {}", config.port_name))?;

    channel.write_all(&OutboundCommand::get_im_info().to_bytes())?;
    let decoder = MessageDecoder::new();
    let mut framer = ByteFramer::new();
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));

    while Instant::now() < deadline {
        let n = match channel.read(&mut buf) {
            Ok(n) => n,
            Err(e) if is_timeout(&e) => 0,
            Err(e) => return Err(e).context("Read from modem failed"),
        };
        for &byte in &buf[..n] {
            framer.add_byte(byte);
            if !framer.is_complete() {
                continue;
            }
            let frame = framer.frame().to_vec();
            framer.clear();
            println!("{}", hex(&frame));
            match decoder.classify(&frame) {
                // 02 60 id id id category subcategory firmware ack
                Ok(FrameClass::Ignored { code: 0x60, .. }) if frame.len() == 9 => println!(
                    "  Modem {} category {:02X}.{:02X} firmware {:02X}",
                    DeviceAddress::from_slice(&frame, 2)?,
                    frame[5],
                    frame[6],
                    frame[7]
                ),
                Ok(class) => println!("  {:?}", class),
                Err(e) => println!("  undecodable: {}", e),
            }
        }
    }

    if framer.discarded() > 0 {
        println!("{} byte(s) discarded while resynchronising", framer.discarded());
    }
    Ok(())
}

fn monitor(link: &LinkArgs, house_file: Option<PathBuf>, query: bool) -> Result<()> {
    let house = match &house_file {
        Some(path) => HouseConfig::load(path)?,
        None => HouseConfig::default(),
    };
    let config = link.resolve(house.link.clone())?;

    let (commands, command_rx) = command_queue();
    let (event_tx, events) = event_channel();
    let registry = Arc::new(DeviceRegistry::new());
    let count = house.populate(&registry, &commands)?;
    info!("Loaded {} device(s) in {} room(s)", count, registry.rooms().len());

    let driver = LinkDriver::open(config, command_rx, event_tx)
        .context("Cannot start link")?;
    let handle = driver.spawn()?;

    let stop = handle.stop_flag();
    ctrlc::set_handler(move || stop.store(true, Ordering::Release))
        .context("Cannot install Ctrl-C handler")?;

    if query {
        for device in registry.devices() {
            if let Err(e) = device.request_status() {
                warn!("Status request for {} failed: {}", device.name(), e);
            }
        }
    }
    drop(commands);

    // Ends when the driver stops and drops its event sender
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let handled = runtime.block_on(Dispatcher::new(Arc::clone(&registry), events).run());

    let stats = handle.join()?;
    info!("Handled {} event(s)", handled);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    for row in registry.snapshot() {
        println!(
            "{:<12} {:<16} {:<8} {}  {}",
            row.room,
            row.name,
            row.kind.to_string(),
            row.address,
            row.state
        );
    }
    Ok(())
}

fn send(
    link: &LinkArgs,
    address: DeviceAddress,
    action: DeviceAction,
    wait: Duration,
) -> Result<()> {
    let config = link.resolve(LinkConfig::default())?;
    let (commands, command_rx) = command_queue();
    let (event_tx, mut events) = event_channel();

    let command = action.encode(address);
    info!("{} {} -> {}", action.name(), address, command);
    commands.enqueue(command)?;

    let handle = LinkDriver::open(config, command_rx, event_tx)
        .context("Cannot start link")?
        .spawn()?;

    let deadline = Instant::now() + wait;
    while Instant::now() < deadline {
        while let Some(event) = events.poll() {
            println!("{} ({:?}): {}", event.sender, event.class, event.state);
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let stats = handle.join()?;
    if stats.commands_sent == 0 {
        bail!("Command was not written to the modem");
    }
    Ok(())
}
