use anyhow::Result;
use std::fmt;

/// Identity of one connected device, stable while it stays connected. The
/// transport never reuses a live handle.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u32);

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// What the transport can tell about a device before any protocol traffic.
#[derive(Clone, Debug)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_name: Option<String>,
    pub serial: Option<String>,
}

impl DeviceIdentity {
    pub fn display_name(&self) -> String {
        self.product_name
            .clone()
            .unwrap_or_else(|| format!("{:04x}:{:04x}", self.vendor_id, self.product_id))
    }
}

/// Match, removal and input delivery. All events for all devices arrive on
/// one thread.
#[derive(Debug)]
pub enum TransportEvent {
    Matched {
        handle: DeviceHandle,
        identity: DeviceIdentity,
    },
    Removed {
        handle: DeviceHandle,
    },
    Input {
        handle: DeviceHandle,
        read: Result<Vec<u8>>,
    },
}

/// The OS-facing side of the transport. Implemented by [`crate::HidTransport`]
/// for real hardware and by scripted mocks in tests.
pub trait Transport {
    fn open(&mut self, handle: DeviceHandle, exclusive: bool) -> Result<()>;
    /// Writes one fixed-size report.
    fn write(&mut self, handle: DeviceHandle, report: &[u8]) -> Result<()>;
    fn close(&mut self, handle: DeviceHandle);
}
