//! Encoder for the HID output reports
//!
//! https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_notes.md#output-reports

use crate::common::*;
use crate::spi::SpiRange;
use byteorder::{ByteOrder, LittleEndian};

pub const OUTPUT_RUMBLE_AND_SUBCMD: u8 = 0x01;

pub(crate) const OFFSET_PACKET_COUNTER: usize = 1;
pub(crate) const OFFSET_RUMBLE: usize = 2;
pub(crate) const OFFSET_OPCODE: usize = 10;
pub(crate) const OFFSET_ARGS: usize = 11;

/// Neutral rumble, one side: 320Hz/160Hz at zero amplitude. The transport
/// requires the rumble field to be present in every subcommand report.
const NEUTRAL_RUMBLE_SIDE: [u8; 4] = [0x00, 0x01, 0x40, 0x40];

/// A subcommand to send, before the packet counter is stamped in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubcommandRequest {
    pub opcode: SubcommandId,
    pub args: Vec<u8>,
}

impl SubcommandRequest {
    /// Subcommand 0x00. A no-op on every firmware, usable to prime the
    /// transport before the first real request.
    pub fn controller_state() -> Self {
        SubcommandRequest {
            opcode: SubcommandId::GetOnlyControllerState,
            args: vec![],
        }
    }

    pub fn request_device_info() -> Self {
        SubcommandRequest {
            opcode: SubcommandId::RequestDeviceInfo,
            args: vec![],
        }
    }

    pub fn set_input_report_mode(mode: InputReportId) -> Self {
        SubcommandRequest {
            opcode: SubcommandId::SetInputReportMode,
            args: vec![mode as u8],
        }
    }

    pub fn spi_read(range: SpiRange) -> Self {
        let mut args = vec![0; 5];
        LittleEndian::write_u32(&mut args[..4], range.addr());
        args[4] = range.len();
        SubcommandRequest {
            opcode: SubcommandId::SPIRead,
            args,
        }
    }

    /// Fills a full fixed-size output report. `counter` is the 4-bit packet
    /// counter maintained per device.
    pub fn encode(&self, counter: u8) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = OUTPUT_RUMBLE_AND_SUBCMD;
        buf[OFFSET_PACKET_COUNTER] = counter & 0xf;
        buf[OFFSET_RUMBLE..OFFSET_RUMBLE + 4].copy_from_slice(&NEUTRAL_RUMBLE_SIDE);
        buf[OFFSET_RUMBLE + 4..OFFSET_RUMBLE + 8].copy_from_slice(&NEUTRAL_RUMBLE_SIDE);
        buf[OFFSET_OPCODE] = self.opcode as u8;
        buf[OFFSET_ARGS..OFFSET_ARGS + self.args.len()].copy_from_slice(&self.args);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::RANGE_FACTORY_CALIBRATION_STICKS;

    #[test]
    fn encode_spi_read() {
        let report = SubcommandRequest::spi_read(RANGE_FACTORY_CALIBRATION_STICKS).encode(7);
        assert_eq!(report.len(), REPORT_LEN);
        assert_eq!(report[0], 0x01);
        assert_eq!(report[1], 7);
        assert_eq!(&report[2..10], &[0, 1, 0x40, 0x40, 0, 1, 0x40, 0x40]);
        assert_eq!(report[10], 0x10);
        assert_eq!(&report[11..15], &[0x3D, 0x60, 0, 0]);
        assert_eq!(report[15], 0x12);
        assert!(report[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn counter_is_masked() {
        let report = SubcommandRequest::request_device_info().encode(0x1f);
        assert_eq!(report[1], 0x0f);
        assert_eq!(report[10], 0x02);
    }
}
