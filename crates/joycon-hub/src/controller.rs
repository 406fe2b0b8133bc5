use crate::engine::SubcommandSlot;
use crate::{DeviceHandle, DeviceIdentity};
use joycon_wire::input::BatteryLevel;
use joycon_wire::spi::SticksCalibration;
use joycon_wire::{self as wire, WhichController};
use std::fmt;
use std::time::Instant;
use tracing::debug;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerKind {
    JoyConL,
    JoyConR,
    ProController,
    Snes,
    Famicom1,
    Famicom2,
}

impl ControllerKind {
    /// The supported (vendor, product) set. Anything else is an unknown
    /// identity and is ignored at match time.
    pub fn from_ids(vendor_id: u16, product_id: u16) -> Option<ControllerKind> {
        if vendor_id != wire::NINTENDO_VENDOR_ID {
            return None;
        }
        match product_id {
            wire::JOYCON_L_BT => Some(ControllerKind::JoyConL),
            wire::JOYCON_R_BT => Some(ControllerKind::JoyConR),
            wire::PRO_CONTROLLER => Some(ControllerKind::ProController),
            wire::SNES_CONTROLLER => Some(ControllerKind::Snes),
            wire::FAMICOM_CONTROLLER_1 => Some(ControllerKind::Famicom1),
            wire::FAMICOM_CONTROLLER_2 => Some(ControllerKind::Famicom2),
            _ => None,
        }
    }

    pub fn from_device_info(which: WhichController) -> ControllerKind {
        match which {
            WhichController::LeftJoyCon => ControllerKind::JoyConL,
            WhichController::RightJoyCon => ControllerKind::JoyConR,
            WhichController::ProController => ControllerKind::ProController,
        }
    }

    /// Retro controllers identify as a Pro Controller in their device-info
    /// reply; their product id is the more specific source.
    fn trust_device_info(self) -> bool {
        matches!(
            self,
            ControllerKind::JoyConL | ControllerKind::JoyConR | ControllerKind::ProController
        )
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerKind::JoyConL => "JoyCon (L)",
            ControllerKind::JoyConR => "JoyCon (R)",
            ControllerKind::ProController => "Pro Controller",
            ControllerKind::Snes => "SNES Controller",
            ControllerKind::Famicom1 => "Famicom Controller 1",
            ControllerKind::Famicom2 => "Famicom Controller 2",
        };
        write!(f, "{}", s)
    }
}

/// Forward-only, except the terminal transition to `Disconnected` which is
/// reachable from anywhere.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum LifecycleState {
    Matched,
    Queued,
    Initializing,
    Ready,
    Disconnected,
}

/// One physically connected device.
pub struct Controller {
    pub handle: DeviceHandle,
    pub kind: ControllerKind,
    pub identity: DeviceIdentity,
    state: LifecycleState,
    pub serial: Option<String>,
    pub calibration: SticksCalibration,
    /// False while `calibration` is the conservative fallback.
    pub calibrated: bool,
    pub battery: Option<BatteryLevel>,
    pub charging: bool,
    pub last_subcmd_sent_at: Option<Instant>,
    packet_counter: u8,
    pub(crate) slot: SubcommandSlot,
}

impl Controller {
    pub(crate) fn new(handle: DeviceHandle, kind: ControllerKind, identity: DeviceIdentity) -> Controller {
        let serial = identity.serial.clone();
        Controller {
            handle,
            kind,
            identity,
            state: LifecycleState::Matched,
            serial,
            calibration: SticksCalibration {
                left: joycon_wire::spi::StickCalibration::fallback(),
                right: joycon_wire::spi::StickCalibration::fallback(),
            },
            calibrated: false,
            battery: None,
            charging: false,
            last_subcmd_sent_at: None,
            packet_counter: 0,
            slot: SubcommandSlot::default(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn advance(&mut self, to: LifecycleState) {
        debug_assert!(
            to >= self.state,
            "lifecycle moved backwards: {:?} -> {:?}",
            self.state,
            to
        );
        if to != self.state {
            debug!(handle = %self.handle, from = ?self.state, to = ?to, "lifecycle");
            self.state = to;
        }
    }

    pub(crate) fn disconnect(&mut self) {
        debug!(handle = %self.handle, from = ?self.state, "lifecycle -> Disconnected");
        self.state = LifecycleState::Disconnected;
    }

    pub(crate) fn refine_kind(&mut self, which: WhichController) {
        let refined = ControllerKind::from_device_info(which);
        if self.kind.trust_device_info() && refined != self.kind {
            debug!(handle = %self.handle, from = %self.kind, to = %refined, "kind refined from device info");
            self.kind = refined;
        }
    }

    pub(crate) fn next_counter(&mut self) -> u8 {
        let counter = self.packet_counter;
        self.packet_counter = (self.packet_counter + 1) & 0xf;
        counter
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            handle: self.handle,
            kind: self.kind,
            serial: self.serial.clone(),
            calibration: self.calibration,
            degraded: !self.calibrated,
            battery: self.battery,
            charging: self.charging,
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("serial", &self.serial)
            .finish()
    }
}

/// What external consumers get when a controller becomes usable.
#[derive(Clone, Debug)]
pub struct ControllerSnapshot {
    pub handle: DeviceHandle,
    pub kind: ControllerKind,
    pub serial: Option<String>,
    pub calibration: SticksCalibration,
    /// True when initialization fell back to default calibration.
    pub degraded: bool,
    pub battery: Option<BatteryLevel>,
    pub charging: bool,
}
