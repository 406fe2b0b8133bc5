//! hidapi-backed transport adapter.
//!
//! Owns the real device handles and turns hidapi enumeration diffs into
//! match/removal events. Built once per process and kept for its lifetime:
//! re-creating the adapter causes duplicate concurrent event delivery.
//! Reconnection is handled entirely through removal + match events.

use crate::{ControllerKind, DeviceHandle, DeviceIdentity, Transport, TransportEvent};
use anyhow::{anyhow, ensure, Context, Result};
use hidapi::{HidApi, HidDevice};
use std::collections::HashMap;
use std::ffi::CString;
use tracing::debug;

pub struct HidTransport {
    api: HidApi,
    next_handle: u32,
    /// Every matched device, opened or not.
    matched: HashMap<DeviceHandle, MatchedDevice>,
}

struct MatchedDevice {
    path: CString,
    open: Option<HidDevice>,
}

impl HidTransport {
    pub fn new() -> Result<HidTransport> {
        Ok(HidTransport {
            api: HidApi::new().context("hidapi init")?,
            next_handle: 0,
            matched: HashMap::new(),
        })
    }

    /// Re-enumerates and reports devices that appeared or disappeared since
    /// the last scan.
    pub fn scan(&mut self) -> Result<Vec<TransportEvent>> {
        self.api.refresh_devices().context("hid enumeration")?;

        let mut current: HashMap<CString, DeviceIdentity> = HashMap::new();
        for info in self.api.device_list() {
            if ControllerKind::from_ids(info.vendor_id(), info.product_id()).is_none() {
                continue;
            }
            current.insert(
                info.path().to_owned(),
                DeviceIdentity {
                    vendor_id: info.vendor_id(),
                    product_id: info.product_id(),
                    product_name: info.product_string().map(str::to_owned),
                    serial: info.serial_number().map(str::to_owned),
                },
            );
        }

        let mut events = vec![];
        let gone: Vec<DeviceHandle> = self
            .matched
            .iter()
            .filter(|(_, dev)| !current.contains_key(&dev.path))
            .map(|(&handle, _)| handle)
            .collect();
        for handle in gone {
            debug!(%handle, "device disappeared");
            self.matched.remove(&handle);
            events.push(TransportEvent::Removed { handle });
        }

        for (path, identity) in current {
            if self.matched.values().any(|dev| dev.path == path) {
                continue;
            }
            let handle = DeviceHandle(self.next_handle);
            self.next_handle += 1;
            debug!(%handle, path = ?path, "device appeared");
            self.matched.insert(handle, MatchedDevice { path, open: None });
            events.push(TransportEvent::Matched { handle, identity });
        }
        Ok(events)
    }

    /// Polls every open device once, waiting up to `timeout_ms` on the
    /// first one. Read failures are reported as events, not returned: the
    /// manager decides whether they matter.
    pub fn read_pending(&mut self, timeout_ms: i32) -> Vec<TransportEvent> {
        let mut events = vec![];
        let mut wait = timeout_ms;
        for (&handle, dev) in &self.matched {
            let device = match &dev.open {
                Some(device) => device,
                None => continue,
            };
            let mut buf = [0u8; 64];
            match device.read_timeout(&mut buf, wait) {
                Ok(0) => {}
                Ok(n) => events.push(TransportEvent::Input {
                    handle,
                    read: Ok(buf[..n].to_vec()),
                }),
                Err(e) => events.push(TransportEvent::Input {
                    handle,
                    read: Err(anyhow!(e)),
                }),
            }
            wait = 0;
        }
        events
    }

    fn device(&self, handle: DeviceHandle) -> Result<&HidDevice> {
        self.matched
            .get(&handle)
            .and_then(|dev| dev.open.as_ref())
            .ok_or_else(|| anyhow!("{} is not open", handle))
    }
}

impl Transport for HidTransport {
    fn open(&mut self, handle: DeviceHandle, _exclusive: bool) -> Result<()> {
        let dev = self
            .matched
            .get_mut(&handle)
            .ok_or_else(|| anyhow!("{} was never matched", handle))?;
        let device = self
            .api
            .open_path(&dev.path)
            .with_context(|| format!("open {}", handle))?;
        dev.open = Some(device);
        Ok(())
    }

    fn write(&mut self, handle: DeviceHandle, report: &[u8]) -> Result<()> {
        let written = self.device(handle)?.write(report)?;
        ensure!(
            written == report.len(),
            "short write: {} of {} bytes",
            written,
            report.len()
        );
        Ok(())
    }

    fn close(&mut self, handle: DeviceHandle) {
        if let Some(dev) = self.matched.get_mut(&handle) {
            dev.open = None;
        }
    }
}
