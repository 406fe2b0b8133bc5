//! Decoders for the HID input reports
//!
//! https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_notes.md#input-reports

use crate::common::*;
use crate::WireError;
use byteorder::{ByteOrder, LittleEndian};
use num::FromPrimitive;
use std::fmt;

// Offsets inside a standard (0x21/0x30/0x31) report.
pub(crate) const OFFSET_TIMER: usize = 1;
pub(crate) const OFFSET_STATUS: usize = 2;
pub(crate) const OFFSET_BUTTONS: usize = 3;
pub(crate) const OFFSET_LEFT_STICK: usize = 6;
pub(crate) const OFFSET_RIGHT_STICK: usize = 9;
pub(crate) const OFFSET_ACK: usize = 13;
pub(crate) const OFFSET_REPLY_ID: usize = 14;
pub(crate) const OFFSET_REPLY_PAYLOAD: usize = 15;

/// An inbound report, decoded as far as its report id allows.
#[derive(Clone, Debug)]
pub enum InputReport {
    /// 0x21, 0x30 or 0x31: periodic state, possibly carrying a subcommand
    /// reply.
    Standard(StandardReport),
    /// 0x3F: the simple mode the controller uses before the report mode is
    /// switched. Carries no stick precision worth decoding.
    Simple(SimpleReport),
}

impl InputReport {
    pub fn parse(buf: &[u8]) -> Result<InputReport, WireError> {
        if buf.is_empty() {
            return Err(WireError::ReportTooShort { len: 0 });
        }
        let id = InputReportId::from_u8(buf[0]).ok_or(WireError::UnknownReportId(buf[0]))?;
        match id {
            InputReportId::Normal => {
                if buf.len() < 4 {
                    return Err(WireError::ReportTooShort { len: buf.len() });
                }
                Ok(InputReport::Simple(SimpleReport {
                    buttons: [buf[1], buf[2]],
                    hat: buf[3],
                }))
            }
            InputReportId::StandardAndSubcmd
            | InputReportId::StandardFull
            | InputReportId::StandardFullMCU => {
                if buf.len() < OFFSET_RIGHT_STICK + 3 {
                    return Err(WireError::ReportTooShort { len: buf.len() });
                }
                let reply = if id == InputReportId::StandardAndSubcmd {
                    Some(SubcommandReply::parse(buf)?)
                } else {
                    None
                };
                Ok(InputReport::Standard(StandardReport {
                    timer: buf[OFFSET_TIMER],
                    status: DeviceStatus(buf[OFFSET_STATUS]),
                    buttons: ButtonsStatus {
                        right: RightButtons(buf[OFFSET_BUTTONS]),
                        middle: MiddleButtons(buf[OFFSET_BUTTONS + 1]),
                        left: LeftButtons(buf[OFFSET_BUTTONS + 2]),
                    },
                    left_stick: Stick::from_bytes([
                        buf[OFFSET_LEFT_STICK],
                        buf[OFFSET_LEFT_STICK + 1],
                        buf[OFFSET_LEFT_STICK + 2],
                    ]),
                    right_stick: Stick::from_bytes([
                        buf[OFFSET_RIGHT_STICK],
                        buf[OFFSET_RIGHT_STICK + 1],
                        buf[OFFSET_RIGHT_STICK + 2],
                    ]),
                    reply,
                }))
            }
        }
    }

    pub fn standard(&self) -> Option<&StandardReport> {
        match self {
            InputReport::Standard(r) => Some(r),
            _ => None,
        }
    }

    pub fn subcmd_reply(&self) -> Option<&SubcommandReply> {
        self.standard().and_then(|r| r.reply.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct StandardReport {
    pub timer: u8,
    pub status: DeviceStatus,
    pub buttons: ButtonsStatus,
    pub left_stick: Stick,
    pub right_stick: Stick,
    pub reply: Option<SubcommandReply>,
}

#[derive(Copy, Clone, Debug)]
pub struct SimpleReport {
    pub buttons: [u8; 2],
    pub hat: u8,
}

bitfield::bitfield! {
    #[repr(transparent)]
    #[derive(Copy, Clone)]
    pub struct DeviceStatus(u8);
    impl Debug;

    pub connected, _: 0;
    pub charging, _: 4;
    pub u8, into BatteryLevel, battery_level, _: 7, 5;
}

#[derive(Debug, Copy, Clone, FromPrimitive, Eq, PartialEq, Ord, PartialOrd)]
pub enum BatteryLevel {
    Empty = 0,
    Critical = 1,
    Low = 2,
    Medium = 3,
    Full = 4,
}

impl From<u8> for BatteryLevel {
    fn from(v: u8) -> Self {
        // The top bit of the nibble flags "charging" on some firmwares and is
        // already masked off by the bitfield range.
        BatteryLevel::from_u8(v.min(4)).expect("masked to 3 bits")
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatteryLevel::Empty => "empty",
            BatteryLevel::Critical => "critical",
            BatteryLevel::Low => "low",
            BatteryLevel::Medium => "medium",
            BatteryLevel::Full => "full",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, Default)]
pub struct ButtonsStatus {
    pub right: RightButtons,
    pub middle: MiddleButtons,
    pub left: LeftButtons,
}

impl ButtonsStatus {
    /// The three wire bytes as one mask, right buttons in the low byte.
    pub fn bitmask(&self) -> u32 {
        u32::from(self.right.0) | u32::from(self.middle.0) << 8 | u32::from(self.left.0) << 16
    }

    pub fn any(&self) -> bool {
        self.bitmask() != 0
    }
}

impl fmt::Debug for ButtonsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ButtonsStatus")
            .field(&format_args!("{}", self))
            .finish()
    }
}

impl fmt::Display for ButtonsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.right.a() {
            write!(f, " A")?;
        }
        if self.right.b() {
            write!(f, " B")?;
        }
        if self.right.x() {
            write!(f, " X")?;
        }
        if self.right.y() {
            write!(f, " Y")?;
        }
        if self.left.up() {
            write!(f, " UP")?;
        }
        if self.left.down() {
            write!(f, " DOWN")?;
        }
        if self.left.left() {
            write!(f, " LEFT")?;
        }
        if self.left.right() {
            write!(f, " RIGHT")?;
        }
        if self.left.l() {
            write!(f, " L")?;
        }
        if self.left.zl() {
            write!(f, " ZL")?;
        }
        if self.right.r() {
            write!(f, " R")?;
        }
        if self.right.zr() {
            write!(f, " ZR")?;
        }
        if self.left.sl() || self.right.sl() {
            write!(f, " SL")?;
        }
        if self.left.sr() || self.right.sr() {
            write!(f, " SR")?;
        }
        if self.middle.lstick() {
            write!(f, " L3")?;
        }
        if self.middle.rstick() {
            write!(f, " R3")?;
        }
        if self.middle.minus() {
            write!(f, " -")?;
        }
        if self.middle.plus() {
            write!(f, " +")?;
        }
        if self.middle.capture() {
            write!(f, " CAPTURE")?;
        }
        if self.middle.home() {
            write!(f, " HOME")?;
        }
        Ok(())
    }
}

bitfield::bitfield! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Default)]
    pub struct RightButtons(u8);
    impl Debug;
    pub y, _: 0;
    pub x, _: 1;
    pub b, _: 2;
    pub a, _: 3;
    pub sr, _: 4;
    pub sl, _: 5;
    pub r, _: 6;
    pub zr, _: 7;
}
bitfield::bitfield! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Default)]
    pub struct MiddleButtons(u8);
    impl Debug;
    pub minus, _: 0;
    pub plus, _: 1;
    pub rstick, _: 2;
    pub lstick, _: 3;
    pub home, _: 4;
    pub capture, _: 5;
    pub _unused, _: 6;
    pub charging_grip, _: 7;
}
bitfield::bitfield! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Default)]
    pub struct LeftButtons(u8);
    impl Debug;
    pub down, _: 0;
    pub up, _: 1;
    pub right, _: 2;
    pub left, _: 3;
    pub sr, _: 4;
    pub sl, _: 5;
    pub l, _: 6;
    pub zl, _: 7;
}

/// One analog stick: two 12-bit axes packed over 3 bytes.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Stick {
    data: [u8; 3],
}

impl Stick {
    pub fn from_bytes(data: [u8; 3]) -> Stick {
        Stick { data }
    }

    /// Packs two raw 12-bit axis values. Values above 4095 are truncated.
    pub fn from_raw(x: u16, y: u16) -> Stick {
        Stick {
            data: [
                (x & 0xff) as u8,
                ((x >> 8) & 0xf) as u8 | ((y & 0xf) << 4) as u8,
                (y >> 4) as u8,
            ],
        }
    }

    pub fn x(self) -> u16 {
        u16::from(self.data[0]) | u16::from(self.data[1] & 0xf) << 8
    }

    pub fn y(self) -> u16 {
        u16::from(self.data[1]) >> 4 | u16::from(self.data[2]) << 4
    }

    pub fn bytes(self) -> [u8; 3] {
        self.data
    }
}

impl fmt::Debug for Stick {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Stick")
            .field(&self.x())
            .field(&self.y())
            .finish()
    }
}

#[derive(Copy, Clone)]
pub struct Ack(pub u8);

impl Ack {
    pub fn is_ok(self) -> bool {
        (self.0 & 0x80) != 0
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 == 0 {
            f.debug_tuple("NAck").finish()
        } else {
            let data = self.0 & 0x7f;
            let mut out = f.debug_tuple("Ack");
            if data != 0 {
                out.field(&data);
            }
            out.finish()
        }
    }
}

/// The subcommand-reply section of a 0x21 report.
#[derive(Clone)]
pub struct SubcommandReply {
    pub ack: Ack,
    pub opcode: RawId<SubcommandId>,
    payload: Vec<u8>,
}

impl SubcommandReply {
    fn parse(buf: &[u8]) -> Result<SubcommandReply, WireError> {
        if buf.len() < OFFSET_REPLY_PAYLOAD {
            return Err(WireError::ReportTooShort { len: buf.len() });
        }
        Ok(SubcommandReply {
            ack: Ack(buf[OFFSET_ACK]),
            opcode: RawId::from_byte(buf[OFFSET_REPLY_ID]),
            payload: buf[OFFSET_REPLY_PAYLOAD..].to_vec(),
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn spi_result(&self) -> Option<Result<SpiReadReply, WireError>> {
        if self.opcode == SubcommandId::SPIRead {
            Some(SpiReadReply::parse(&self.payload))
        } else {
            None
        }
    }

    pub fn device_info(&self) -> Option<Result<DeviceInfoReply, WireError>> {
        if self.opcode == SubcommandId::RequestDeviceInfo {
            Some(DeviceInfoReply::parse(&self.payload))
        } else {
            None
        }
    }
}

impl fmt::Debug for SubcommandReply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SubcommandReply")
            .field("ack", &self.ack)
            .field("opcode", &self.opcode)
            .finish()
    }
}

/// Echoed address + length, then the flash data.
#[derive(Clone, Debug)]
pub struct SpiReadReply {
    pub addr: u32,
    pub len: u8,
    pub data: Vec<u8>,
}

impl SpiReadReply {
    fn parse(payload: &[u8]) -> Result<SpiReadReply, WireError> {
        if payload.len() < 5 {
            return Err(WireError::ReportTooShort { len: payload.len() });
        }
        let addr = LittleEndian::read_u32(&payload[..4]);
        let len = payload[4];
        let data = payload
            .get(5..5 + len as usize)
            .ok_or(WireError::SpiPayloadTruncated { len })?;
        Ok(SpiReadReply {
            addr,
            len,
            data: data.to_vec(),
        })
    }
}

/// Reply to `RequestDeviceInfo`.
#[derive(Clone, Debug)]
pub struct DeviceInfoReply {
    pub firmware: FirmwareVersion,
    pub which: RawId<WhichController>,
    /// Big endian on the wire.
    pub mac_address: MacAddress,
}

impl DeviceInfoReply {
    fn parse(payload: &[u8]) -> Result<DeviceInfoReply, WireError> {
        if payload.len() < 10 {
            return Err(WireError::ReportTooShort { len: payload.len() });
        }
        let mut mac = [0; 6];
        mac.copy_from_slice(&payload[4..10]);
        Ok(DeviceInfoReply {
            firmware: FirmwareVersion([payload[0], payload[1]]),
            which: RawId::from_byte(payload[2]),
            mac_address: MacAddress(mac),
        })
    }
}
