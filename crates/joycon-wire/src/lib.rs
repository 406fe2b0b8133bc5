//! Encoding and decoding of the JoyCon HID report formats.
//!
//! Layouts follow the reverse-engineering notes at
//! https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_notes.md
//!
//! Everything here is a pure function over byte buffers. Multi-byte fields
//! are assembled from individually indexed bytes, never by reinterpreting
//! the buffer as a struct: input buffers come from the transport with no
//! alignment guarantee.

#[macro_use]
extern crate num_derive;

pub mod common;
pub mod input;
pub mod output;
pub mod spi;

pub use common::*;
pub use input::InputReport;
pub use output::SubcommandRequest;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("report too short: {len} bytes")]
    ReportTooShort { len: usize },
    #[error("unknown report id 0x{0:02x}")]
    UnknownReportId(u8),
    #[error("SPI payload shorter than its declared length {len}")]
    SpiPayloadTruncated { len: u8 },
    #[error("calibration block has wrong length {len}, expected {expected}")]
    CalibrationLength { len: usize, expected: usize },
}
