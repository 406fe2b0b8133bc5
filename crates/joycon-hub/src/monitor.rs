//! The device monitor: routes transport events into the registry, the
//! scheduler and the subcommand engine, and fires the external callbacks.

use crate::calibration::normalize_stick;
use crate::engine::{ReplyTag, SubcommandPurpose};
use crate::registry::Registry;
use crate::scheduler::{InitQueueEntry, Scheduler};
use crate::{
    Controller, ControllerKind, ControllerSnapshot, DeviceHandle, DeviceIdentity, HubError,
    LifecycleState, Transport, TransportEvent,
};
use cgmath::Vector2;
use joycon_wire::input::{BatteryLevel, ButtonsStatus, InputReport, SubcommandReply};
use joycon_wire::spi::{SticksCalibration, RANGE_FACTORY_CALIBRATION_STICKS};
use joycon_wire::{InputReportId, SubcommandId, SubcommandRequest};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Tunable policy. The mechanism (settle delay, rate limit, timeout,
/// bounded retry) is fixed; the constants are not.
#[derive(Clone, Debug)]
pub struct Config {
    /// Wait after a match event before the first subcommand; the device
    /// does not answer reliably right away.
    pub settle_delay: Duration,
    /// Per-request reply timeout.
    pub subcmd_timeout: Duration,
    /// Total sends per request, first attempt included.
    pub max_attempts: u8,
    /// Minimum spacing between subcommand sends to one device.
    pub min_subcmd_interval: Duration,
    /// Send a no-op subcommand before the first real one.
    pub priming: bool,
    /// Radial stick deadzone applied to input updates.
    pub deadzone: f64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            settle_delay: Duration::from_millis(250),
            subcmd_timeout: Duration::from_secs(3),
            max_attempts: 3,
            min_subcmd_interval: Duration::ZERO,
            priming: false,
            deadzone: 0.1,
        }
    }
}

impl Config {
    /// The values derived from comparison with a known-good reference
    /// driver: tighter timing, one retry, an explicit priming command.
    pub fn tight() -> Config {
        Config {
            settle_delay: Duration::from_millis(250),
            subcmd_timeout: Duration::from_secs(1),
            max_attempts: 2,
            min_subcmd_interval: Duration::from_millis(25),
            priming: true,
            deadzone: 0.1,
        }
    }
}

/// One decoded periodic report, calibration and deadzone already applied.
/// Emitted for every decoded report; consumers do their own rate limiting.
#[derive(Clone, Debug)]
pub struct InputUpdate {
    pub buttons: ButtonsStatus,
    pub left_stick: Vector2<f64>,
    pub right_stick: Vector2<f64>,
    pub battery: BatteryLevel,
    pub charging: bool,
}

/// The consumer side: the input-simulation/UI layer.
pub trait EventSink {
    fn on_controller_ready(&mut self, snapshot: &ControllerSnapshot);
    fn on_controller_removed(&mut self, handle: DeviceHandle);
    fn on_input_update(&mut self, handle: DeviceHandle, update: &InputUpdate);
}

/// Owns the live controller set and drives the whole connection lifecycle.
///
/// Not a singleton: construct as many independent managers as needed. All
/// calls must come from the single transport delivery thread; the manager
/// itself never spawns threads or blocks.
pub struct Manager<T: Transport, S: EventSink> {
    transport: T,
    sink: S,
    config: Config,
    registry: Registry,
    scheduler: Scheduler,
}

impl<T: Transport, S: EventSink> Manager<T, S> {
    pub fn new(transport: T, sink: S, config: Config) -> Manager<T, S> {
        Manager {
            transport,
            sink,
            config,
            registry: Registry::new(),
            scheduler: Scheduler::new(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn controller(&self, handle: DeviceHandle) -> Option<&Controller> {
        self.registry.get(handle)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.registry.iter()
    }

    /// Dispatches one transport event. Only an open failure surfaces as an
    /// error; everything else degrades with logging and never affects other
    /// controllers.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) -> Result<(), HubError> {
        match event {
            TransportEvent::Matched { handle, identity } => self.on_matched(handle, identity, now),
            TransportEvent::Removed { handle } => {
                self.on_removed(handle, now);
                Ok(())
            }
            TransportEvent::Input { handle, read } => {
                self.on_input(handle, read, now);
                Ok(())
            }
        }
    }

    /// Fires every due timer (settle waits, deferred sends, reply timeouts)
    /// and returns the next instant `poll` should run again, if any.
    pub fn poll(&mut self, now: Instant) -> Option<Instant> {
        if let Some(handle) = self.scheduler.take_due_settle(now) {
            let live = self
                .registry
                .get(handle)
                .map(|c| c.state() == LifecycleState::Initializing)
                .unwrap_or(false);
            if live {
                self.start_init_requests(handle, now);
            } else {
                // Disconnected while settling: vacate the slot.
                debug!(%handle, "gone after settle wait");
                self.scheduler.finish(handle);
                self.process_queue(now);
            }
        }

        if let Some(handle) = self.scheduler.current() {
            let outcome = match self.registry.get_mut(handle) {
                Some(ctrl) => ctrl.poll_engine(&mut self.transport, now, &self.config),
                None => Ok(None),
            };
            match outcome {
                Ok(Some(exhausted)) => {
                    let err = HubError::SubcommandTimeout {
                        handle,
                        opcode: exhausted.opcode,
                        attempts: exhausted.attempts,
                    };
                    warn!(%handle, error = %err, "init step degraded");
                    self.advance_init(handle, exhausted.purpose, None, now);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%handle, error = %e, "transport write failed during init");
                    self.complete_init(handle, now);
                }
            }
        }

        self.next_deadline()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let settle = self.scheduler.settle_deadline();
        let engine = self
            .scheduler
            .current()
            .and_then(|handle| self.registry.get(handle))
            .and_then(|ctrl| ctrl.engine_deadline(&self.config));
        match (settle, engine) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_matched(
        &mut self,
        handle: DeviceHandle,
        identity: DeviceIdentity,
        now: Instant,
    ) -> Result<(), HubError> {
        if self.registry.contains(handle) {
            debug!(%handle, "duplicate match ignored");
            return Ok(());
        }
        let kind = match ControllerKind::from_ids(identity.vendor_id, identity.product_id) {
            Some(kind) => kind,
            None => {
                let err = HubError::UnknownDeviceIdentity {
                    vendor_id: identity.vendor_id,
                    product_id: identity.product_id,
                };
                warn!(%handle, error = %err, "device ignored");
                return Ok(());
            }
        };
        if let Err(source) = self.transport.open(handle, true) {
            let err = HubError::TransportOpenFailure { handle, source };
            error!(%handle, error = %err, "device unusable");
            return Err(err);
        }

        let display_name = identity.display_name();
        info!(%handle, kind = %kind, name = %display_name,
              connected = self.registry.len() + 1, "controller matched");
        let mut controller = Controller::new(handle, kind, identity);
        controller.advance(LifecycleState::Queued);
        self.registry.register(controller);
        self.scheduler.enqueue(InitQueueEntry {
            handle,
            display_name,
        });
        self.process_queue(now);
        Ok(())
    }

    fn on_removed(&mut self, handle: DeviceHandle, now: Instant) {
        self.scheduler.remove_queued(handle);
        let was_in_service = self.scheduler.finish(handle);
        match self.registry.unregister(handle) {
            None => {
                // May have been removed mid-match before registration
                // completed; not an error.
                debug!(%handle, "removal for unknown handle");
            }
            Some(mut controller) => {
                controller.disconnect();
                info!(%handle, kind = %controller.kind, in_service = was_in_service,
                      "controller removed");
                self.transport.close(handle);
                self.sink.on_controller_removed(handle);
            }
        }
        if was_in_service {
            self.process_queue(now);
        }
    }

    fn on_input(&mut self, handle: DeviceHandle, read: anyhow::Result<Vec<u8>>, now: Instant) {
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) => {
                // A single failed read does not tear the controller down.
                warn!(%handle, error = %e, "input read failed");
                return;
            }
        };
        trace!(%handle, in_report = %hex::encode(&bytes));
        let report = match InputReport::parse(&bytes) {
            Ok(report) => report,
            Err(e) => {
                debug!(%handle, error = %e, "undecodable report dropped");
                return;
            }
        };

        let (update, completed) = {
            let deadzone = self.config.deadzone;
            let ctrl = match self.registry.get_mut(handle) {
                Some(ctrl) => ctrl,
                None => {
                    debug!(%handle, "input for unknown handle");
                    return;
                }
            };
            match &report {
                InputReport::Standard(std) => {
                    ctrl.battery = Some(std.status.battery_level());
                    ctrl.charging = std.status.charging();
                    let update = InputUpdate {
                        buttons: std.buttons,
                        left_stick: normalize_stick(
                            &ctrl.calibration.left,
                            std.left_stick.x(),
                            std.left_stick.y(),
                            deadzone,
                        ),
                        right_stick: normalize_stick(
                            &ctrl.calibration.right,
                            std.right_stick.x(),
                            std.right_stick.y(),
                            deadzone,
                        ),
                        battery: std.status.battery_level(),
                        charging: std.status.charging(),
                    };
                    // A reply never pauses normal decoding; both happen.
                    let completed = std
                        .reply
                        .as_ref()
                        .and_then(|reply| ctrl.handle_subcmd_reply(reply));
                    (Some(update), completed)
                }
                InputReport::Simple(_) => {
                    trace!(%handle, "simple report before mode switch");
                    (None, None)
                }
            }
        };

        if let Some(update) = update {
            self.sink.on_input_update(handle, &update);
        }
        if let Some((purpose, reply)) = completed {
            self.advance_init(handle, purpose, Some(reply), now);
        }
    }

    /// Starts serving the next queue entry unless one is already in
    /// service. Entries disconnected while queued are skipped.
    fn process_queue(&mut self, now: Instant) {
        loop {
            if self.scheduler.is_busy() {
                return;
            }
            let entry = match self.scheduler.pop() {
                Some(entry) => entry,
                None => return,
            };
            let live = self
                .registry
                .get(entry.handle)
                .map(|c| c.state() != LifecycleState::Disconnected)
                .unwrap_or(false);
            if !live {
                debug!(handle = %entry.handle, name = %entry.display_name,
                       "skipping removed queue entry");
                continue;
            }
            info!(handle = %entry.handle, name = %entry.display_name,
                  settle = ?self.config.settle_delay, queued = self.scheduler.queued(),
                  "initialization started");
            if let Some(ctrl) = self.registry.get_mut(entry.handle) {
                ctrl.advance(LifecycleState::Initializing);
            }
            self.scheduler.begin(entry.handle, now + self.config.settle_delay);
            return;
        }
    }

    fn start_init_requests(&mut self, handle: DeviceHandle, now: Instant) {
        let first = if self.config.priming {
            SubcommandPurpose::Prime
        } else {
            SubcommandPurpose::QueryDeviceInfo
        };
        self.send_init_step(handle, first, now);
    }

    fn send_init_step(&mut self, handle: DeviceHandle, purpose: SubcommandPurpose, now: Instant) {
        let (request, tag) = match purpose {
            SubcommandPurpose::Prime => (
                SubcommandRequest::controller_state(),
                ReplyTag::Opcode(SubcommandId::GetOnlyControllerState),
            ),
            SubcommandPurpose::QueryDeviceInfo => (
                SubcommandRequest::request_device_info(),
                ReplyTag::Opcode(SubcommandId::RequestDeviceInfo),
            ),
            SubcommandPurpose::ReadStickCalibration => (
                SubcommandRequest::spi_read(RANGE_FACTORY_CALIBRATION_STICKS),
                ReplyTag::SpiRead {
                    addr: RANGE_FACTORY_CALIBRATION_STICKS.addr(),
                    len: RANGE_FACTORY_CALIBRATION_STICKS.len(),
                },
            ),
            SubcommandPurpose::SetReportMode => (
                SubcommandRequest::set_input_report_mode(InputReportId::StandardFull),
                ReplyTag::Opcode(SubcommandId::SetInputReportMode),
            ),
        };
        let result = match self.registry.get_mut(handle) {
            Some(ctrl) => {
                ctrl.submit_subcommand(&mut self.transport, now, request, tag, purpose, &self.config)
            }
            // Disconnected under us; the removal path vacated the slot.
            None => return,
        };
        if let Err(e) = result {
            warn!(%handle, step = ?purpose, error = %e, "init subcommand not sent");
            self.complete_init(handle, now);
        }
    }

    /// Resumes the init sequence after a step completed (`reply`) or
    /// exhausted its retries (`None`). Every failure degrades; the sequence
    /// always reaches `Ready` or the controller is gone.
    fn advance_init(
        &mut self,
        handle: DeviceHandle,
        purpose: SubcommandPurpose,
        reply: Option<SubcommandReply>,
        now: Instant,
    ) {
        match purpose {
            SubcommandPurpose::Prime => {
                self.send_init_step(handle, SubcommandPurpose::QueryDeviceInfo, now)
            }
            SubcommandPurpose::QueryDeviceInfo => {
                if let (Some(reply), Some(ctrl)) = (&reply, self.registry.get_mut(handle)) {
                    match reply.device_info() {
                        Some(Ok(info)) => {
                            if let Some(which) = info.which.try_into() {
                                ctrl.refine_kind(which);
                            }
                            ctrl.serial = Some(info.mac_address.to_string());
                            info!(%handle, kind = %ctrl.kind, firmware = %info.firmware,
                                  serial = %info.mac_address, "device info");
                        }
                        _ => debug!(%handle, "malformed device info reply"),
                    }
                }
                self.send_init_step(handle, SubcommandPurpose::ReadStickCalibration, now)
            }
            SubcommandPurpose::ReadStickCalibration => {
                if let (Some(reply), Some(ctrl)) = (&reply, self.registry.get_mut(handle)) {
                    match reply.spi_result() {
                        Some(Ok(spi)) => match SticksCalibration::parse(&spi.data) {
                            Ok(calib) => {
                                ctrl.calibration = calib;
                                ctrl.calibrated = true;
                                info!(%handle, left = %calib.left, right = %calib.right,
                                      "stick calibration loaded");
                            }
                            Err(e) => {
                                warn!(%handle, error = %e, "calibration rejected, using fallback")
                            }
                        },
                        _ => warn!(%handle, "calibration reply unusable, using fallback"),
                    }
                }
                self.send_init_step(handle, SubcommandPurpose::SetReportMode, now)
            }
            SubcommandPurpose::SetReportMode => self.complete_init(handle, now),
        }
    }

    /// Marks the controller usable, fires the ready callback, vacates the
    /// single-flight slot and serves the next entry.
    fn complete_init(&mut self, handle: DeviceHandle, now: Instant) {
        let snapshot: Option<ControllerSnapshot> = match self.registry.get_mut(handle) {
            Some(ctrl) => {
                ctrl.advance(LifecycleState::Ready);
                Some(ctrl.snapshot())
            }
            None => None,
        };
        if let Some(snapshot) = snapshot {
            info!(%handle, kind = %snapshot.kind, degraded = snapshot.degraded,
                  "controller ready");
            self.sink.on_controller_ready(&snapshot);
        }
        self.scheduler.finish(handle);
        self.process_queue(now);
    }
}
