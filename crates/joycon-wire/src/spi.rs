//! SPI flash ranges and the factory stick calibration block.

use crate::WireError;
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SpiRange(u32, u8);

impl SpiRange {
    pub fn addr(self) -> u32 {
        self.0
    }

    pub fn len(self) -> u8 {
        self.1
    }
}

pub const RANGE_FACTORY_CALIBRATION_STICKS: SpiRange = SpiRange(0x603D, 0x12);
pub const RANGE_USER_CALIBRATION_STICKS: SpiRange = SpiRange(0x8010, 0x16);

/// Unpacks two 12-bit values from 3 bytes, little-endian nibble order.
pub fn unpack_u12_pair(b: &[u8]) -> (u16, u16) {
    let x = u16::from(b[0]) | u16::from(b[1] & 0xf) << 8;
    let y = u16::from(b[1]) >> 4 | u16::from(b[2]) << 4;
    (x, y)
}

/// Inverse of [`unpack_u12_pair`]. Values above 4095 are truncated.
pub fn pack_u12_pair(x: u16, y: u16) -> [u8; 3] {
    [
        (x & 0xff) as u8,
        ((x >> 8) & 0xf) as u8 | ((y & 0xf) << 4) as u8,
        (y >> 4) as u8,
    ]
}

/// Raw per-axis calibration: the device stores the neutral point and the
/// usable travel on each side of it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AxisCalibration {
    pub min: u16,
    pub center: u16,
    pub max: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StickCalibration {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
}

impl StickCalibration {
    /// Conservative values when the flash read failed: neutral at mid-range
    /// with 1536 counts of travel each way.
    pub fn fallback() -> StickCalibration {
        let axis = AxisCalibration {
            min: 0x200,
            center: 0x800,
            max: 0xE00,
        };
        StickCalibration { x: axis, y: axis }
    }

    fn from_fields(center: (u16, u16), below: (u16, u16), above: (u16, u16)) -> StickCalibration {
        StickCalibration {
            x: AxisCalibration {
                min: center.0.saturating_sub(below.0),
                center: center.0,
                max: center.0.saturating_add(above.0),
            },
            y: AxisCalibration {
                min: center.1.saturating_sub(below.1),
                center: center.1,
                max: center.1.saturating_add(above.1),
            },
        }
    }
}

impl fmt::Display for StickCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x {}/{}/{} y {}/{}/{}",
            self.x.min, self.x.center, self.x.max, self.y.min, self.y.center, self.y.max
        )
    }
}

/// The 18-byte factory block at 0x603D: 9 bytes per stick, three 12-bit
/// pairs each. Field order differs between the sticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SticksCalibration {
    pub left: StickCalibration,
    pub right: StickCalibration,
}

impl SticksCalibration {
    pub fn parse(data: &[u8]) -> Result<SticksCalibration, WireError> {
        let expected = RANGE_FACTORY_CALIBRATION_STICKS.len() as usize;
        if data.len() != expected {
            return Err(WireError::CalibrationLength {
                len: data.len(),
                expected,
            });
        }
        // Left stick: max-above-center, center, min-below-center.
        let left = StickCalibration::from_fields(
            unpack_u12_pair(&data[3..6]),
            unpack_u12_pair(&data[6..9]),
            unpack_u12_pair(&data[0..3]),
        );
        // Right stick: center, min-below-center, max-above-center.
        let right = StickCalibration::from_fields(
            unpack_u12_pair(&data[9..12]),
            unpack_u12_pair(&data[12..15]),
            unpack_u12_pair(&data[15..18]),
        );
        Ok(SticksCalibration { left, right })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u12_pair_round_trip() {
        for &(x, y) in &[(0, 0), (0x800, 0x7ff), (4095, 0), (0x123, 0xabc)] {
            assert_eq!(unpack_u12_pair(&pack_u12_pair(x, y)), (x, y));
        }
    }

    #[test]
    fn parse_factory_block() {
        let mut data = vec![];
        // left: above (300, 310), center (2000, 2100), below (400, 410)
        data.extend_from_slice(&pack_u12_pair(300, 310));
        data.extend_from_slice(&pack_u12_pair(2000, 2100));
        data.extend_from_slice(&pack_u12_pair(400, 410));
        // right: center (2048, 2048), below (500, 510), above (600, 610)
        data.extend_from_slice(&pack_u12_pair(2048, 2048));
        data.extend_from_slice(&pack_u12_pair(500, 510));
        data.extend_from_slice(&pack_u12_pair(600, 610));

        let calib = SticksCalibration::parse(&data).unwrap();
        assert_eq!(
            calib.left.x,
            AxisCalibration {
                min: 1600,
                center: 2000,
                max: 2300
            }
        );
        assert_eq!(
            calib.left.y,
            AxisCalibration {
                min: 1690,
                center: 2100,
                max: 2410
            }
        );
        assert_eq!(
            calib.right.x,
            AxisCalibration {
                min: 1548,
                center: 2048,
                max: 2648
            }
        );
        assert_eq!(calib.right.y.max, 2658);
    }

    #[test]
    fn reject_bad_length() {
        assert!(matches!(
            SticksCalibration::parse(&[0; 17]),
            Err(WireError::CalibrationLength {
                len: 17,
                expected: 18
            })
        ));
    }
}
