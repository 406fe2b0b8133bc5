use num::{FromPrimitive, ToPrimitive};
use std::fmt;
use std::marker::PhantomData;

pub const NINTENDO_VENDOR_ID: u16 = 0x057E;

pub const JOYCON_L_BT: u16 = 0x2006;
pub const JOYCON_R_BT: u16 = 0x2007;
pub const PRO_CONTROLLER: u16 = 0x2009;
pub const JOYCON_CHARGING_GRIP: u16 = 0x200e;
pub const FAMICOM_CONTROLLER_1: u16 = 0x2016;
pub const SNES_CONTROLLER: u16 = 0x2017;
pub const FAMICOM_CONTROLLER_2: u16 = 0x2018;

/// Both directions use 49-byte reports over bluetooth.
pub const REPORT_LEN: usize = 49;

#[repr(u8)]
#[derive(Copy, Clone, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
pub enum InputReportId {
    Normal = 0x3F,
    StandardAndSubcmd = 0x21,
    StandardFull = 0x30,
    StandardFullMCU = 0x31,
}

// All unused values are a Nop
#[repr(u8)]
#[derive(Copy, Clone, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
pub enum SubcommandId {
    GetOnlyControllerState = 0x00,
    RequestDeviceInfo = 0x02,
    SetInputReportMode = 0x03,
    SPIRead = 0x10,
    SetPlayerLights = 0x30,
    EnableIMU = 0x40,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, FromPrimitive, ToPrimitive, Eq, PartialEq)]
pub enum WhichController {
    LeftJoyCon = 1,
    RightJoyCon = 2,
    ProController = 3,
}

impl fmt::Display for WhichController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                WhichController::LeftJoyCon => "JoyCon (L)",
                WhichController::RightJoyCon => "JoyCon (R)",
                WhichController::ProController => "Pro Controller",
            }
        )
    }
}

/// A one-byte id as found on the wire, which may not map to a known variant.
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct RawId<Id>(u8, PhantomData<Id>);

impl<Id> RawId<Id> {
    pub fn from_byte(byte: u8) -> Self {
        RawId(byte, PhantomData)
    }

    pub fn byte(self) -> u8 {
        self.0
    }
}

impl<Id: FromPrimitive> RawId<Id> {
    pub fn try_into(self) -> Option<Id> {
        Id::from_u8(self.0)
    }
}

impl<Id: ToPrimitive> From<Id> for RawId<Id> {
    fn from(id: Id) -> Self {
        RawId(id.to_u8().expect("always one byte"), PhantomData)
    }
}

impl<Id: fmt::Debug + FromPrimitive + Copy> fmt::Debug for RawId<Id> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(id) = self.try_into() {
            write!(f, "{:?}", id)
        } else {
            f.debug_tuple("RawId")
                .field(&format!("0x{:x}", self.0))
                .finish()
        }
    }
}

impl<Id: FromPrimitive + PartialEq + Copy> PartialEq<Id> for RawId<Id> {
    fn eq(&self, other: &Id) -> bool {
        self.try_into().map(|x| x == *other).unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FirmwareVersion(pub [u8; 2]);

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0[0], self.0[1])
    }
}
