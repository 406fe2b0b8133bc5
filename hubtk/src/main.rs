mod opts;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use joycon_hub::{
    Config, ControllerSnapshot, DeviceHandle, EventSink, HidTransport, InputUpdate, Manager,
    TransportEvent,
};
use opts::{Devices, Monitor, Opts, SubCommand};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// How often we re-enumerate for connects/disconnects.
const SCAN_INTERVAL: Duration = Duration::from_millis(500);
/// Upper bound on one blocking read; one full-report interval.
const READ_TIMEOUT: Duration = Duration::from_millis(15);

fn main() -> Result<()> {
    let opts = Opts::parse();
    init_logging();
    match opts.subcmd {
        SubCommand::Devices(devices) => list_devices(devices),
        SubCommand::Monitor(monitor) => run_monitor(monitor),
    }
}

fn init_logging() {
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    if std::env::var("LOG_PRETTY").is_ok() {
        fmt.pretty().init();
    } else {
        fmt.init();
    }
}

fn list_devices(opts: Devices) -> Result<()> {
    let mut transport = HidTransport::new()?;
    loop {
        let found: Vec<_> = transport
            .scan()?
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Matched { identity, .. } => Some(identity),
                _ => None,
            })
            .collect();
        if found.is_empty() && opts.wait {
            std::thread::sleep(SCAN_INTERVAL);
            continue;
        }
        if found.is_empty() {
            println!("{}", "no supported controller connected".yellow());
        }
        for identity in found {
            println!(
                "{:04x}:{:04x} {}",
                identity.vendor_id,
                identity.product_id,
                identity.display_name().green(),
            );
        }
        return Ok(());
    }
}

fn run_monitor(opts: Monitor) -> Result<()> {
    let mut config = if opts.tight {
        Config::tight()
    } else {
        Config::default()
    };
    config.deadzone = opts.deadzone;

    let transport = HidTransport::new()?;
    let mut manager = Manager::new(transport, PrintSink::default(), config);

    let mut last_scan: Option<Instant> = None;
    loop {
        let now = Instant::now();
        let scan_due = last_scan.map_or(true, |at| now.duration_since(at) >= SCAN_INTERVAL);
        if scan_due {
            last_scan = Some(now);
            for event in manager.transport_mut().scan()? {
                if let Err(e) = manager.handle_event(event, Instant::now()) {
                    warn!(error = %e, "controller skipped");
                }
            }
        }

        let wait = manager
            .next_deadline()
            .map_or(READ_TIMEOUT, |deadline| {
                deadline
                    .saturating_duration_since(Instant::now())
                    .min(READ_TIMEOUT)
            });
        for event in manager.transport_mut().read_pending(wait.as_millis() as i32) {
            if let Err(e) = manager.handle_event(event, Instant::now()) {
                warn!(error = %e, "controller skipped");
            }
        }
        manager.poll(Instant::now());
    }
}

#[derive(Default)]
struct PrintSink {
    last_buttons: HashMap<DeviceHandle, u32>,
}

impl EventSink for PrintSink {
    fn on_controller_ready(&mut self, snapshot: &ControllerSnapshot) {
        let battery = snapshot
            .battery
            .map(|level| level.to_string())
            .unwrap_or_else(|| "unknown".to_owned());
        println!(
            "{} {} (serial {}, battery {}{})",
            "connected:".green(),
            snapshot.kind,
            snapshot.serial.as_deref().unwrap_or("unknown"),
            battery,
            if snapshot.degraded {
                ", default calibration"
            } else {
                ""
            },
        );
    }

    fn on_controller_removed(&mut self, handle: DeviceHandle) {
        self.last_buttons.remove(&handle);
        println!("{} {}", "disconnected:".red(), handle);
    }

    fn on_input_update(&mut self, handle: DeviceHandle, update: &InputUpdate) {
        // Reports arrive at 60Hz; only print on button changes.
        let mask = update.buttons.bitmask();
        let previous = self.last_buttons.insert(handle, mask).unwrap_or(0);
        if mask != previous {
            println!(
                "{} [{}] L({:+.2}, {:+.2}) R({:+.2}, {:+.2})",
                handle,
                update.buttons,
                update.left_stick.x,
                update.left_stick.y,
                update.right_stick.x,
                update.right_stick.y,
            );
        }
    }
}
